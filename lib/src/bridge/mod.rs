use channel::{ChannelRegistry, DirectChannel};
use container::{ListenerContainer, MessageListener};
use error::BridgeError;
use failure::Error;
use model::message::Message;
use model::DestinationName;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub trait MessageConverter<D>: Send + Sync {
  fn to_message(&self, delivery: D) -> Result<Message, Error>;
}

/// A destination bound to a channel, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq)]
pub struct DestinationBinding {
  destination: DestinationName,
  channel: String,
}

impl DestinationBinding {
  pub fn new(destination: &str, channel: &str) -> Result<Self, Error> {
    if destination.trim().is_empty() {
      return Err(BridgeError::Configuration("the destination name must not be empty".to_owned()).into());
    }
    if channel.trim().is_empty() {
      return Err(BridgeError::Configuration("the channel name must not be empty".to_owned()).into());
    }
    Ok(DestinationBinding {
      destination: destination.to_owned(),
      channel: channel.to_owned(),
    })
  }

  pub fn destination(&self) -> &str {
    &self.destination
  }

  pub fn channel(&self) -> &str {
    &self.channel
  }
}

pub struct InboundBridge<C> {
  binding: DestinationBinding,
  channel: Arc<DirectChannel>,
  converter: C,
  received: AtomicUsize,
  published: AtomicUsize,
}

impl<C> InboundBridge<C> {
  pub fn new(binding: DestinationBinding, registry: &ChannelRegistry, converter: C) -> Result<Self, Error> {
    let channel = registry.channel(binding.channel())?;
    Ok(InboundBridge {
      binding,
      channel,
      converter,
      received: AtomicUsize::new(0),
      published: AtomicUsize::new(0),
    })
  }

  pub fn binding(&self) -> &DestinationBinding {
    &self.binding
  }

  pub fn received(&self) -> usize {
    self.received.load(Ordering::SeqCst)
  }

  pub fn published(&self) -> usize {
    self.published.load(Ordering::SeqCst)
  }
}

impl<C, D> MessageListener<D> for InboundBridge<C>
where
  C: MessageConverter<D>,
{
  fn on_message(&self, delivery: D) -> Result<(), Error> {
    self.received.fetch_add(1, Ordering::SeqCst);
    let message = self.converter.to_message(delivery)?;
    trace!(
      "Publishing message {} from {} to {}",
      message.id(),
      self.binding.destination(),
      self.channel.name()
    );
    self.channel.send(&message)?;
    self.published.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BridgeState {
  Stopped,
  Listening,
}

pub struct MessageDrivenEndpoint<L, C> {
  container: L,
  bridge: Arc<InboundBridge<C>>,
  state: BridgeState,
}

impl<L, C> MessageDrivenEndpoint<L, C>
where
  L: ListenerContainer,
  C: MessageConverter<L::Delivery> + 'static,
  L::Delivery: 'static,
{
  pub fn new(container: L, bridge: InboundBridge<C>) -> Result<Self, Error> {
    if container.destination() != bridge.binding().destination() {
      return Err(
        BridgeError::Configuration(format!(
          "container listens on {} but the bridge is bound to {}",
          container.destination(),
          bridge.binding().destination()
        ))
        .into(),
      );
    }
    Ok(MessageDrivenEndpoint {
      container,
      bridge: Arc::new(bridge),
      state: BridgeState::Stopped,
    })
  }

  pub fn start(&mut self) -> Result<(), Error> {
    if self.state == BridgeState::Listening {
      debug!("Endpoint on {} already listening", self.container.destination());
      return Ok(());
    }
    let listener: Arc<dyn MessageListener<L::Delivery>> = self.bridge.clone();
    self.container.start(listener)?;
    self.state = BridgeState::Listening;
    info!(
      "Listening on {}, publishing to {}",
      self.container.destination(),
      self.bridge.binding().channel()
    );
    Ok(())
  }

  pub fn stop(&mut self) -> Result<(), Error> {
    if self.state == BridgeState::Stopped {
      return Ok(());
    }
    self.container.stop()?;
    self.state = BridgeState::Stopped;
    info!(
      "Stopped listening on {}: {} received, {} published",
      self.container.destination(),
      self.bridge.received(),
      self.bridge.published()
    );
    Ok(())
  }

  pub fn state(&self) -> BridgeState {
    self.state
  }

  pub fn bridge(&self) -> &InboundBridge<C> {
    &self.bridge
  }

  pub fn container(&self) -> &L {
    &self.container
  }

  pub fn container_mut(&mut self) -> &mut L {
    &mut self.container
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use channel::handler::FnHandler;
  use channel::{CONSUMING, PRODUCING};
  use container::{InMemoryContainer, Outcome};
  use model::message::{HeaderValue, Headers};
  use std::sync::Mutex;

  struct Raw {
    body: &'static str,
    headers: Vec<(&'static str, &'static str)>,
  }

  fn raw(body: &'static str) -> Raw {
    Raw { body, headers: vec![] }
  }

  struct RawConverter;

  impl MessageConverter<Raw> for RawConverter {
    fn to_message(&self, delivery: Raw) -> Result<Message, Error> {
      if delivery.body.is_empty() {
        return Err(BridgeError::Conversion("empty body".to_owned()).into());
      }
      let headers = delivery
        .headers
        .into_iter()
        .map(|(k, v)| (k.to_owned(), HeaderValue::from(v)))
        .collect();
      Ok(Message::new(delivery.body.as_bytes().to_vec(), headers))
    }
  }

  #[derive(Debug, Fail)]
  #[fail(display = "business failure")]
  struct BusinessFailure;

  type Seen = Arc<Mutex<Vec<(String, Headers)>>>;

  fn endpoint(registry: &ChannelRegistry) -> MessageDrivenEndpoint<InMemoryContainer<Raw>, RawConverter> {
    let binding = DestinationBinding::new("orders", CONSUMING).unwrap();
    let bridge = InboundBridge::new(binding, registry, RawConverter).unwrap();
    MessageDrivenEndpoint::new(InMemoryContainer::new("orders"), bridge).unwrap()
  }

  fn recording(registry: &ChannelRegistry) -> Seen {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry
      .subscribe(
        CONSUMING,
        FnHandler::new(move |m: &Message| {
          let body = String::from_utf8(m.payload().to_vec())?;
          sink.lock().unwrap().push((body, m.headers().clone()));
          Ok(())
        }),
      )
      .unwrap();
    seen
  }

  #[test]
  fn should_refuse_an_empty_destination() {
    let result = DestinationBinding::new("", CONSUMING);

    assert_eq!(
      result.unwrap_err().downcast::<BridgeError>().unwrap(),
      BridgeError::Configuration("the destination name must not be empty".to_owned())
    );
  }

  #[test]
  fn should_refuse_a_binding_to_an_unknown_channel() {
    let registry = ChannelRegistry::new();
    let binding = DestinationBinding::new("orders", CONSUMING).unwrap();

    let result = InboundBridge::new(binding, &registry, RawConverter);

    assert!(result.is_err());
  }

  #[test]
  fn should_refuse_a_container_on_another_destination() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let binding = DestinationBinding::new("orders", CONSUMING).unwrap();
    let bridge = InboundBridge::new(binding, &registry, RawConverter).unwrap();

    let result = MessageDrivenEndpoint::new(InMemoryContainer::<Raw>::new("invoices"), bridge);

    assert!(result.is_err());
  }

  #[test]
  fn should_move_between_stopped_and_listening() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let mut endpoint = endpoint(&registry);
    assert_eq!(endpoint.state(), BridgeState::Stopped);

    endpoint.start().unwrap();
    assert_eq!(endpoint.state(), BridgeState::Listening);
    assert!(endpoint.container().is_running());

    endpoint.stop().unwrap();
    assert_eq!(endpoint.state(), BridgeState::Stopped);
    assert!(!endpoint.container().is_running());
  }

  #[test]
  fn should_forward_payload_and_headers_unchanged() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let seen = recording(&registry);
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    endpoint
      .container_mut()
      .deliver(Raw {
        body: "hello",
        headers: vec![("type", "greeting")],
      })
      .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "hello");
    assert_eq!(
      seen[0].1,
      hashmap! { "type".to_owned() => HeaderValue::from("greeting") }
    );
    assert_eq!(endpoint.container().outcomes(), &[Outcome::Acked]);
  }

  #[test]
  fn should_keep_the_delivery_order() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let seen = recording(&registry);
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    for body in vec!["a", "b", "c", "d"] {
      endpoint.container_mut().deliver(raw(body)).unwrap();
    }

    let bodies: Vec<String> = seen.lock().unwrap().iter().map(|s| s.0.clone()).collect();
    assert_eq!(bodies, vec!["a", "b", "c", "d"]);
    assert_eq!(endpoint.bridge().received(), 4);
    assert_eq!(endpoint.bridge().published(), 4);
  }

  #[test]
  fn should_give_the_subscriber_error_back_to_the_container() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    registry
      .subscribe(CONSUMING, FnHandler::new(|_: &Message| Err(BusinessFailure.into())))
      .unwrap();
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    let result = endpoint.container_mut().deliver(raw("a"));

    assert!(result.unwrap_err().downcast_ref::<BusinessFailure>().is_some());
    assert_eq!(endpoint.container().outcomes(), &[Outcome::Rejected]);
    assert_eq!(endpoint.bridge().received(), 1);
    assert_eq!(endpoint.bridge().published(), 0);
  }

  #[test]
  fn should_give_the_conversion_error_back_to_the_container() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let seen = recording(&registry);
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    let result = endpoint.container_mut().deliver(raw(""));

    assert_eq!(
      result.unwrap_err().downcast::<BridgeError>().unwrap(),
      BridgeError::Conversion("empty body".to_owned())
    );
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(endpoint.container().outcomes(), &[Outcome::Rejected]);
  }

  #[test]
  fn should_accept_deliveries_without_subscriber() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    let result = endpoint.container_mut().deliver(raw("nobody listens"));

    assert!(result.is_ok());
    assert_eq!(endpoint.container().outcomes(), &[Outcome::Acked]);
  }

  #[test]
  fn should_reject_without_subscriber_when_one_is_required() {
    let registry = ChannelRegistry::with_default_channels(true).unwrap();
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    let result = endpoint.container_mut().deliver(raw("nobody listens"));

    assert!(result.is_err());
    assert_eq!(endpoint.container().outcomes(), &[Outcome::Rejected]);
  }

  #[test]
  fn should_not_publish_on_the_producing_channel() {
    let registry = ChannelRegistry::with_default_channels(false).unwrap();
    let produced = Arc::new(Mutex::new(0));
    let counter = produced.clone();
    registry
      .subscribe(
        PRODUCING,
        FnHandler::new(move |_: &Message| {
          *counter.lock().unwrap() += 1;
          Ok(())
        }),
      )
      .unwrap();
    let mut endpoint = endpoint(&registry);
    endpoint.start().unwrap();

    endpoint.container_mut().deliver(raw("a")).unwrap();

    assert_eq!(*produced.lock().unwrap(), 0);
  }
}
