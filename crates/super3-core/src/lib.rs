// Library root for the Super3 tracker core: domain model, SQLite store,
// recommendations and statistics.

pub mod analysis;
pub mod config;
pub mod db;
pub mod lottery;
