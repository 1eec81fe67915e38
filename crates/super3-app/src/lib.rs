// Library root: the coordinator and its message protocol, exported so the
// binary and the integration tests share one API.

pub mod app;
pub mod protocol;
