use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

pub type Headers = HashMap<String, HeaderValue>;

#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
  Bool(bool),
  Int(i64),
  Real(f64),
  Str(String),
  Bytes(Vec<u8>),
}

impl HeaderValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      HeaderValue::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      HeaderValue::Int(i) => Some(*i),
      _ => None,
    }
  }
}

impl From<bool> for HeaderValue {
  fn from(b: bool) -> HeaderValue {
    HeaderValue::Bool(b)
  }
}

impl From<i64> for HeaderValue {
  fn from(i: i64) -> HeaderValue {
    HeaderValue::Int(i)
  }
}

impl From<f64> for HeaderValue {
  fn from(r: f64) -> HeaderValue {
    HeaderValue::Real(r)
  }
}

impl From<String> for HeaderValue {
  fn from(s: String) -> HeaderValue {
    HeaderValue::Str(s)
  }
}

impl<'a> From<&'a str> for HeaderValue {
  fn from(s: &'a str) -> HeaderValue {
    HeaderValue::Str(s.to_owned())
  }
}

impl From<Vec<u8>> for HeaderValue {
  fn from(b: Vec<u8>) -> HeaderValue {
    HeaderValue::Bytes(b)
  }
}

/// Immutable envelope handed to channel subscribers.
///
/// The identity (`id`, `timestamp`) is generated at creation and kept apart
/// from the headers, so that the headers stay exactly what the sender set.
#[derive(Clone, Debug)]
pub struct Message {
  id: Uuid,
  timestamp: DateTime<Utc>,
  payload: Vec<u8>,
  headers: Headers,
}

impl Message {
  pub fn new(payload: Vec<u8>, headers: Headers) -> Self {
    Message {
      id: Uuid::new_v4(),
      timestamp: Utc::now(),
      payload,
      headers,
    }
  }

  pub fn id(&self) -> &Uuid {
    &self.id
  }

  pub fn timestamp(&self) -> &DateTime<Utc> {
    &self.timestamp
  }

  pub fn payload(&self) -> &[u8] {
    &self.payload
  }

  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  pub fn header(&self, key: &str) -> Option<&HeaderValue> {
    self.headers.get(key)
  }
}
