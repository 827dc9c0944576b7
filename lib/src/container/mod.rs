//! Listener containers.
//!
//! A container connects to a destination, receives deliveries and calls a
//! [`MessageListener`] once per delivery. It owns the acknowledgement policy:
//! a delivery is acknowledged only when the listener returned `Ok`.

pub mod amqp;

use error::BridgeError;
use failure::Error;
use std::sync::Arc;

pub trait MessageListener<D>: Send + Sync {
  fn on_message(&self, delivery: D) -> Result<(), Error>;
}

pub trait ListenerContainer {
  type Delivery;

  fn destination(&self) -> &str;

  fn start(&mut self, listener: Arc<dyn MessageListener<Self::Delivery>>) -> Result<(), Error>;

  fn stop(&mut self) -> Result<(), Error>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outcome {
  Acked,
  Rejected,
}

/// Container pushing deliveries synchronously on the caller's thread.
///
/// Useful for tests and local pipelines: every delivery gets an [`Outcome`],
/// recorded in delivery order.
pub struct InMemoryContainer<D> {
  destination: String,
  listener: Option<Arc<dyn MessageListener<D>>>,
  outcomes: Vec<Outcome>,
}

impl<D> InMemoryContainer<D> {
  pub fn new(destination: &str) -> Self {
    InMemoryContainer {
      destination: destination.to_owned(),
      listener: None,
      outcomes: Vec::new(),
    }
  }

  pub fn is_running(&self) -> bool {
    self.listener.is_some()
  }

  pub fn deliver(&mut self, delivery: D) -> Result<(), Error> {
    let result = match self.listener {
      Some(ref listener) => listener.on_message(delivery),
      None => return Err(BridgeError::NotListening.into()),
    };
    match result {
      Ok(()) => self.outcomes.push(Outcome::Acked),
      Err(ref e) => {
        warn!("Delivery on {} rejected: {}", self.destination, e);
        self.outcomes.push(Outcome::Rejected)
      }
    }
    result
  }

  pub fn outcomes(&self) -> &[Outcome] {
    &self.outcomes
  }
}

impl<D> ListenerContainer for InMemoryContainer<D> {
  type Delivery = D;

  fn destination(&self) -> &str {
    &self.destination
  }

  fn start(&mut self, listener: Arc<dyn MessageListener<D>>) -> Result<(), Error> {
    self.listener = Some(listener);
    Ok(())
  }

  fn stop(&mut self) -> Result<(), Error> {
    self.listener = None;
    Ok(())
  }
}
