use bridge::{DestinationBinding, InboundBridge, MessageConverter, MessageDrivenEndpoint};
use channel::handler::create_logging_handler;
use channel::{ChannelRegistry, CONSUMING};
use config::{Config, Settings};
use container::amqp::{AmqpContainer, AmqpConverter};
use container::ListenerContainer;
use failure::Error;

pub struct Application<L, C> {
  registry: ChannelRegistry,
  endpoint: MessageDrivenEndpoint<L, C>,
}

impl<L, C> Application<L, C>
where
  L: ListenerContainer,
  C: MessageConverter<L::Delivery> + 'static,
  L::Delivery: 'static,
{
  /// Subscribers have to be registered before `start`.
  pub fn registry(&self) -> &ChannelRegistry {
    &self.registry
  }

  pub fn endpoint(&self) -> &MessageDrivenEndpoint<L, C> {
    &self.endpoint
  }

  pub fn endpoint_mut(&mut self) -> &mut MessageDrivenEndpoint<L, C> {
    &mut self.endpoint
  }

  pub fn start(&mut self) -> Result<(), Error> {
    self.endpoint.start()
  }

  pub fn stop(&mut self) -> Result<(), Error> {
    self.endpoint.stop()
  }
}

pub fn wire<L, C>(
  binding: DestinationBinding,
  require_subscriber: bool,
  container: L,
  converter: C,
) -> Result<Application<L, C>, Error>
where
  L: ListenerContainer,
  C: MessageConverter<L::Delivery> + 'static,
  L::Delivery: 'static,
{
  debug!("Creating the channels");
  let registry = ChannelRegistry::with_default_channels(require_subscriber)?;
  debug!("Binding {} to {}", binding.destination(), binding.channel());
  let bridge = InboundBridge::new(binding, &registry, converter)?;
  let endpoint = MessageDrivenEndpoint::new(container, bridge)?;
  Ok(Application { registry, endpoint })
}

pub fn bootstrap(settings: &Settings) -> Result<Application<AmqpContainer, AmqpConverter>, Error> {
  let container = AmqpContainer::new(
    settings.connection.clone(),
    settings.binding.destination(),
    settings.container.clone(),
  );
  wire(
    settings.binding.clone(),
    settings.require_subscriber,
    container,
    AmqpConverter,
  )
}

pub fn run(config: Config) -> Result<(), Error> {
  info!("running bridge");
  let settings = config.settings()?;
  debug!("{:?}", settings.binding);
  let mut app = bootstrap(&settings)?;
  app.registry().subscribe(CONSUMING, create_logging_handler())?;
  app.start()?;
  let result = app.endpoint_mut().container_mut().join();
  app.stop()?;
  result
}
