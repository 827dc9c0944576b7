pub mod message;

use error::BridgeError;
use failure::Error;
use std::fmt;
use std::str::FromStr;

pub type DestinationName = String;

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
  pub user: String,
  pub password: String,
  pub vhost: String,
  pub host: String,
  pub port: u16,
  pub tls: bool,
}

impl FromStr for ConnectionInfo {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    use lapin::uri::{AMQPScheme::*, AMQPUri};

    let uri = AMQPUri::from_str(s)
      .map_err(|e| BridgeError::Configuration(format!("invalid AMQP uri {}: {}", s, e)))?;
    Ok(ConnectionInfo {
      user: uri.authority.userinfo.username,
      password: uri.authority.userinfo.password,
      vhost: if uri.vhost == "" {
        "/".to_owned() // avoid the no-vhost bug
      } else {
        uri.vhost
      },
      host: uri.authority.host,
      port: uri.authority.port,
      tls: uri.scheme == AMQPS,
    })
  }
}

// never print the password
impl fmt::Display for ConnectionInfo {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "{}://{}:*****@{}:{}/{}",
      if self.tls { "amqps" } else { "amqp" },
      self.user,
      self.host,
      self.port,
      self.vhost
    )
  }
}
