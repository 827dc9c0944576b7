pub mod handler;

use self::handler::MessageHandler;
use error::BridgeError;
use failure::Error;
use model::message::Message;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub const PRODUCING: &str = "producing";
pub const CONSUMING: &str = "consuming";

pub struct DirectChannel {
  name: String,
  require_subscriber: bool,
  handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl DirectChannel {
  pub fn new(name: &str) -> Self {
    DirectChannel {
      name: name.to_owned(),
      require_subscriber: false,
      handlers: RwLock::new(Vec::new()),
    }
  }

  /// When set, publishing with no subscriber fails instead of being a no-op.
  pub fn require_subscriber(mut self, required: bool) -> Self {
    self.require_subscriber = required;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn subscribe<H>(&self, handler: H)
  where
    H: MessageHandler + 'static,
  {
    self
      .handlers
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(Arc::new(handler));
  }

  pub fn subscriber_count(&self) -> usize {
    self
      .handlers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  /// Invoke every subscriber in order. The first failing subscriber stops
  /// the dispatch and its error is returned as is.
  pub fn send(&self, message: &Message) -> Result<(), Error> {
    // the lock is not held while the handlers run
    let handlers = self
      .handlers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    if handlers.is_empty() && self.require_subscriber {
      return Err(BridgeError::NoSubscriber(self.name.clone()).into());
    }
    for handler in handlers.iter() {
      handler.handle(message)?;
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct ChannelRegistry {
  channels: HashMap<String, Arc<DirectChannel>>,
}

impl ChannelRegistry {
  pub fn new() -> Self {
    ChannelRegistry::default()
  }

  /// The `producing` and `consuming` channels, ready to be subscribed to.
  pub fn with_default_channels(require_subscriber: bool) -> Result<Self, Error> {
    let mut registry = ChannelRegistry::new();
    registry.create_channel(PRODUCING, require_subscriber)?;
    registry.create_channel(CONSUMING, require_subscriber)?;
    Ok(registry)
  }

  pub fn create_channel(
    &mut self,
    name: &str,
    require_subscriber: bool,
  ) -> Result<Arc<DirectChannel>, Error> {
    if self.channels.contains_key(name) {
      return Err(BridgeError::Configuration(format!("channel {} already exists", name)).into());
    }
    debug!("Creating channel {}", name);
    let channel = Arc::new(DirectChannel::new(name).require_subscriber(require_subscriber));
    self.channels.insert(name.to_owned(), channel.clone());
    Ok(channel)
  }

  pub fn channel(&self, name: &str) -> Result<Arc<DirectChannel>, Error> {
    self
      .channels
      .get(name)
      .cloned()
      .ok_or_else(|| BridgeError::UnknownChannel(name.to_owned()).into())
  }

  pub fn subscribe<H>(&self, name: &str, handler: H) -> Result<(), Error>
  where
    H: MessageHandler + 'static,
  {
    self.channel(name)?.subscribe(handler);
    Ok(())
  }

  pub fn publish(&self, name: &str, message: &Message) -> Result<(), Error> {
    self.channel(name)?.send(message)
  }
}

#[cfg(test)]
mod tests {
  use super::handler::FnHandler;
  use super::*;
  use model::message::Headers;
  use std::sync::Mutex;

  #[derive(Debug, Fail)]
  #[fail(display = "subscriber exploded")]
  struct Boom;

  fn message(payload: &str) -> Message {
    Message::new(payload.as_bytes().to_vec(), Headers::new())
  }

  fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl MessageHandler {
    let log = log.clone();
    FnHandler::new(move |m: &Message| {
      log
        .lock()
        .unwrap()
        .push(format!("{}:{}", tag, String::from_utf8_lossy(m.payload())));
      Ok(())
    })
  }

  #[test]
  fn should_accept_a_publish_without_subscriber() {
    let channel = DirectChannel::new(CONSUMING);

    let result = channel.send(&message("lost"));

    assert!(result.is_ok());
  }

  #[test]
  fn should_fail_without_subscriber_when_one_is_required() {
    let channel = DirectChannel::new(CONSUMING).require_subscriber(true);

    let result = channel.send(&message("lost"));

    assert_eq!(
      result.unwrap_err().downcast::<BridgeError>().unwrap(),
      BridgeError::NoSubscriber(CONSUMING.to_owned())
    );
  }

  #[test]
  fn should_call_subscribers_in_subscription_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let channel = DirectChannel::new(CONSUMING);
    channel.subscribe(recorder(&log, "first"));
    channel.subscribe(recorder(&log, "second"));

    channel.send(&message("a")).unwrap();
    channel.send(&message("b")).unwrap();

    assert_eq!(
      *log.lock().unwrap(),
      vec!["first:a", "second:a", "first:b", "second:b"]
    );
  }

  #[test]
  fn should_stop_at_the_first_failing_subscriber() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let channel = DirectChannel::new(CONSUMING);
    channel.subscribe(FnHandler::new(|_: &Message| Err(Boom.into())));
    channel.subscribe(recorder(&log, "never"));

    let result = channel.send(&message("a"));

    assert!(result.unwrap_err().downcast_ref::<Boom>().is_some());
    assert!(log.lock().unwrap().is_empty());
  }

  #[test]
  fn should_create_the_default_channels() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();

    assert_eq!(registry.channel(PRODUCING).unwrap().name(), PRODUCING);
    assert_eq!(registry.channel(CONSUMING).unwrap().name(), CONSUMING);
  }

  #[test]
  fn should_refuse_a_duplicate_channel() {
    let mut registry = ChannelRegistry::with_default_channels(false).unwrap();

    let result = registry.create_channel(CONSUMING, false);

    assert!(result.is_err());
  }

  #[test]
  fn should_publish_through_the_registry() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    registry.subscribe(CONSUMING, recorder(&log, "c")).unwrap();

    registry.publish(CONSUMING, &message("hello")).unwrap();
    registry.publish(PRODUCING, &message("elsewhere")).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["c:hello"]);
  }

  #[test]
  fn should_fail_on_an_unknown_channel() {
    let registry = ChannelRegistry::new();

    let result = registry.publish("nowhere", &message("x"));

    assert_eq!(
      result.unwrap_err().downcast::<BridgeError>().unwrap(),
      BridgeError::UnknownChannel("nowhere".to_owned())
    );
  }
}
