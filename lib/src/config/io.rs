use super::{Config, DEFAULT_CONNECTION};
use error::BridgeError;
use failure::Error;
use std::env;
use util::{parse_flag, read_file};

pub fn from_str(json: &str) -> Result<Config, Error> {
  serde_json::from_str(json).map_err(Error::from)
}

pub fn from_file(path: &str) -> Result<Config, Error> {
  debug!("Reading configuration from {}", path);
  from_str(&read_file(path)?)
}

pub fn from_env() -> Result<Config, Error> {
  from_vars(|name| env::var(name).ok())
}

/// Build the configuration from `RABBITMQ_HOST`, `QUEUE`, `CONCURRENCY`,
/// `REQUIRE_SUBSCRIBER` and `REQUEUE_ON_FAILURE`.
pub fn from_vars<F>(lookup: F) -> Result<Config, Error>
where
  F: Fn(&str) -> Option<String>,
{
  let destination = lookup("QUEUE")
    .ok_or_else(|| BridgeError::Configuration("please set QUEUE".to_owned()))?;
  let concurrency = match lookup("CONCURRENCY") {
    Some(c) => c
      .trim()
      .parse::<u16>()
      .map_err(|e| BridgeError::Configuration(format!("CONCURRENCY: {}", e)))?,
    None => super::default_concurrency(),
  };
  let require_subscriber = match lookup("REQUIRE_SUBSCRIBER") {
    Some(v) => parse_flag("REQUIRE_SUBSCRIBER", &v)?,
    None => false,
  };
  let requeue_on_failure = match lookup("REQUEUE_ON_FAILURE") {
    Some(v) => parse_flag("REQUEUE_ON_FAILURE", &v)?,
    None => super::default_requeue(),
  };
  Ok(Config {
    connection: lookup("RABBITMQ_HOST").unwrap_or_else(|| DEFAULT_CONNECTION.to_owned()),
    destination,
    concurrency,
    require_subscriber,
    requeue_on_failure,
  })
}
