#[derive(Debug, Fail, PartialEq)]
pub enum BridgeError {
  #[fail(display = "Cannot convert the delivery: {}", _0)]
  Conversion(String),
  #[fail(display = "Channel {} has no subscriber", _0)]
  NoSubscriber(String),
  #[fail(display = "No channel named {}", _0)]
  UnknownChannel(String),
  #[fail(display = "Invalid configuration: {}", _0)]
  Configuration(String),
  #[fail(display = "Listener container is not started")]
  NotListening,
}
