extern crate chrono;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate futures;
extern crate lapin_futures_rustls;
#[macro_use]
extern crate log;
#[cfg(test)]
#[macro_use]
extern crate maplit;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate tokio;
extern crate uuid;

use lapin_futures_rustls::lapin;

pub mod bridge;
pub mod channel;
pub mod config;
pub mod container;
pub mod error;
pub mod model;
pub mod server;
mod util;
