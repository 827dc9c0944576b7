use failure::Error;
use model::message::Message;

/// A channel subscriber.
///
/// Handlers run synchronously on the publishing thread. Any error is handed
/// back to the publisher untouched.
pub trait MessageHandler: Send + Sync {
  fn handle(&self, message: &Message) -> Result<(), Error>;
}

pub struct FnHandler<F>
where
  F: Fn(&Message) -> Result<(), Error> + Send + Sync,
{
  f: Box<F>,
}

impl<F> MessageHandler for FnHandler<F>
where
  F: Fn(&Message) -> Result<(), Error> + Send + Sync,
{
  fn handle(&self, message: &Message) -> Result<(), Error> {
    (self.f)(message)
  }
}

impl<F> FnHandler<F>
where
  F: Fn(&Message) -> Result<(), Error> + Send + Sync,
{
  pub fn new(f: F) -> Self {
    FnHandler { f: Box::new(f) }
  }
}

pub fn create_logging_handler() -> impl MessageHandler {
  FnHandler::new(|message: &Message| {
    info!(
      "Message {} ({} bytes) headers: {:?}",
      message.id(),
      message.payload().len(),
      message.headers()
    );
    trace!("{}", String::from_utf8_lossy(message.payload()));
    Ok(())
  })
}
