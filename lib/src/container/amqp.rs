use bridge::MessageConverter;
use container::{ListenerContainer, MessageListener};
use error::BridgeError;
use failure::{err_msg, Error};
use futures::future::{self, Either};
use futures::sync::oneshot;
use futures::{Future, IntoFuture, Stream};
use lapin::channel::{BasicConsumeOptions, BasicProperties, QueueDeclareOptions};
use lapin::client;
use lapin::message::Delivery;
use lapin::types::{AMQPValue, FieldTable};
use model::message::{HeaderValue, Headers, Message};
use model::{ConnectionInfo, DestinationName};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;

const PREFIX: &str = "amqp_";

#[derive(Clone, Debug, PartialEq)]
pub struct ContainerOptions {
  /// Number of consumers, each on its own AMQP channel.
  pub concurrency: u16,
  pub requeue_on_failure: bool,
}

impl Default for ContainerOptions {
  fn default() -> Self {
    ContainerOptions {
      concurrency: 1,
      requeue_on_failure: true,
    }
  }
}

/// Maps an AMQP delivery to a [`Message`].
///
/// The body is kept as is. Entries of the `headers` table are copied when
/// their value has a [`HeaderValue`] counterpart, the others are dropped.
/// Basic properties and delivery metadata are added with an `amqp_` prefix.
#[derive(Clone, Debug, Default)]
pub struct AmqpConverter;

impl MessageConverter<Delivery> for AmqpConverter {
  fn to_message(&self, delivery: Delivery) -> Result<Message, Error> {
    let mut headers = match delivery.properties.headers() {
      Some(table) => map_field_table(table),
      None => Headers::new(),
    };
    map_properties(&delivery.properties, &mut headers)?;
    insert(&mut headers, "redelivered", HeaderValue::Bool(delivery.redelivered));
    insert(&mut headers, "receivedExchange", HeaderValue::Str(delivery.exchange));
    insert(&mut headers, "receivedRoutingKey", HeaderValue::Str(delivery.routing_key));
    if delivery.delivery_tag > i64::max_value() as u64 {
      return Err(BridgeError::Conversion(format!("delivery tag {} is out of range", delivery.delivery_tag)).into());
    }
    insert(&mut headers, "deliveryTag", HeaderValue::Int(delivery.delivery_tag as i64));
    Ok(Message::new(delivery.data, headers))
  }
}

pub fn map_field_table(table: &FieldTable) -> Headers {
  table
    .iter()
    .filter_map(|(k, v)| match map_value(v) {
      Some(value) => Some((k.clone(), value)),
      None => {
        debug!("Dropping header {}: no counterpart for {:?}", k, v);
        None
      }
    })
    .collect()
}

fn map_value(value: &AMQPValue) -> Option<HeaderValue> {
  match value {
    AMQPValue::Boolean(b) => Some(HeaderValue::Bool(*b)),
    AMQPValue::ShortShortInt(i) => Some(HeaderValue::Int(i64::from(*i))),
    AMQPValue::ShortShortUInt(i) => Some(HeaderValue::Int(i64::from(*i))),
    AMQPValue::ShortInt(i) => Some(HeaderValue::Int(i64::from(*i))),
    AMQPValue::ShortUInt(i) => Some(HeaderValue::Int(i64::from(*i))),
    AMQPValue::LongInt(i) => Some(HeaderValue::Int(i64::from(*i))),
    AMQPValue::LongUInt(i) => Some(HeaderValue::Int(i64::from(*i))),
    AMQPValue::LongLongInt(i) => Some(HeaderValue::Int(*i)),
    AMQPValue::Float(f) => Some(HeaderValue::Real(f64::from(*f))),
    AMQPValue::Double(f) => Some(HeaderValue::Real(*f)),
    AMQPValue::LongString(s) => Some(HeaderValue::Str(s.clone())),
    AMQPValue::Timestamp(t) => to_millis(*t).map(HeaderValue::Int),
    AMQPValue::ByteArray(b) => Some(HeaderValue::Bytes(b.clone())),
    _ => None,
  }
}

// seconds on the wire, milliseconds in the headers
fn to_millis(seconds: u64) -> Option<i64> {
  if seconds <= (i64::max_value() / 1000) as u64 {
    Some(seconds as i64 * 1000)
  } else {
    None
  }
}

pub fn map_properties(properties: &BasicProperties, headers: &mut Headers) -> Result<(), Error> {
  let strings = vec![
    ("messageId", properties.message_id()),
    ("correlationId", properties.correlation_id()),
    ("replyTo", properties.reply_to()),
    ("type", properties.type_()),
    ("contentType", properties.content_type()),
    ("contentEncoding", properties.content_encoding()),
    ("appId", properties.app_id()),
    ("userId", properties.user_id()),
    ("expiration", properties.expiration()),
  ];
  for (name, value) in strings {
    if let Some(s) = value {
      insert(headers, name, HeaderValue::Str(s.clone()));
    }
  }
  if let Some(priority) = properties.priority() {
    insert(headers, "priority", HeaderValue::Int(i64::from(*priority)));
  }
  if let Some(timestamp) = properties.timestamp() {
    let millis = to_millis(*timestamp)
      .ok_or_else(|| BridgeError::Conversion(format!("timestamp {} is out of range", timestamp)))?;
    insert(headers, "timestamp", HeaderValue::Int(millis));
  }
  Ok(())
}

fn insert(headers: &mut Headers, name: &str, value: HeaderValue) {
  let key = format!("{}{}", PREFIX, name);
  if let Some(previous) = headers.insert(key, value) {
    debug!("Header {}{} ({:?}) replaced by the AMQP property", PREFIX, name, previous);
  }
}

/// Consumes a queue with `concurrency` consumers.
///
/// Each delivery is acknowledged once the listener returned `Ok`. A failed
/// delivery is rejected, and requeued when `requeue_on_failure` is set.
pub struct AmqpContainer {
  connection: ConnectionInfo,
  destination: DestinationName,
  options: ContainerOptions,
  runtime: Option<Runtime>,
  shutdown: Vec<oneshot::Sender<()>>,
  done: Option<oneshot::Receiver<Result<(), Error>>>,
}

impl AmqpContainer {
  pub fn new(connection: ConnectionInfo, destination: &str, options: ContainerOptions) -> Self {
    AmqpContainer {
      connection,
      destination: destination.to_owned(),
      options,
      runtime: None,
      shutdown: Vec::new(),
      done: None,
    }
  }

  pub fn options(&self) -> &ContainerOptions {
    &self.options
  }

  fn validate(&self) -> Result<(), Error> {
    if self.destination.trim().is_empty() {
      return Err(BridgeError::Configuration("the destination name must not be empty".to_owned()).into());
    }
    if self.options.concurrency == 0 {
      return Err(BridgeError::Configuration("concurrency must be at least 1".to_owned()).into());
    }
    if self.connection.tls {
      return Err(BridgeError::Configuration("amqps connections are not supported".to_owned()).into());
    }
    Ok(())
  }

  /// Block until every consumer has ended, either because the broker closed
  /// it or because the container was stopped.
  pub fn join(&mut self) -> Result<(), Error> {
    match self.done.take() {
      Some(done) => match done.wait() {
        Ok(result) => result,
        Err(_) => Ok(()), // runtime shut down
      },
      None => Err(BridgeError::NotListening.into()),
    }
  }
}

impl ListenerContainer for AmqpContainer {
  type Delivery = Delivery;

  fn destination(&self) -> &str {
    &self.destination
  }

  fn start(&mut self, listener: Arc<dyn MessageListener<Delivery>>) -> Result<(), Error> {
    self.validate()?;
    let mut runtime = Runtime::new()?;

    let (senders, receivers): (Vec<_>, Vec<_>) = (0..self.options.concurrency)
      .map(|_| oneshot::channel::<()>())
      .unzip();
    let (done_tx, done_rx) = oneshot::channel();

    trace!("Connecting to RabbitMQ on {}", self.connection);
    let destination = self.destination.clone();
    let requeue = self.options.requeue_on_failure;
    let program = create_client(&self.connection).and_then(move |client| {
      let consumers: Vec<_> = receivers
        .into_iter()
        .enumerate()
        .map(|(index, stop)| {
          consume(&client, &destination, index, listener.clone(), requeue)
            .select2(stop)
            .then(move |result| match result {
              Ok(Either::A(_)) => {
                info!("Consumer {} ended", index);
                Ok(())
              }
              Ok(Either::B(_)) | Err(Either::B(_)) => {
                debug!("Consumer {} stopped", index);
                Ok(())
              }
              Err(Either::A((e, _))) => Err(e),
            })
        })
        .collect();
      join_consumers(consumers).then(move |result| {
        debug!("Closing the connection");
        drop(client);
        result
      })
    });

    runtime.spawn(program.then(move |result| -> Result<(), ()> {
      let _ = done_tx.send(result);
      Ok(())
    }));

    self.runtime = Some(runtime);
    self.shutdown = senders;
    self.done = Some(done_rx);
    Ok(())
  }

  fn stop(&mut self) -> Result<(), Error> {
    for stop in self.shutdown.drain(..) {
      let _ = stop.send(());
    }
    if let Some(runtime) = self.runtime.take() {
      runtime
        .shutdown_now()
        .wait()
        .map_err(|_| err_msg("Could not shut the runtime down"))?;
    }
    Ok(())
  }
}

/// Wait for every consumer, even after one of them failed, and give back the
/// first failure.
fn join_consumers<F>(consumers: Vec<F>) -> impl Future<Item = (), Error = Error> + Send
where
  F: Future<Item = (), Error = Error> + Send,
{
  let settled: Vec<_> = consumers
    .into_iter()
    .enumerate()
    .map(|(index, consumer)| {
      consumer.then(move |result| -> Result<Result<(), Error>, Error> {
        if let Err(ref e) = result {
          error!("Consumer {} failed: {}", index, e);
        }
        Ok(result)
      })
    })
    .collect();
  future::join_all(settled)
    .and_then(|results| results.into_iter().collect::<Result<Vec<()>, Error>>().map(|_| ()))
}

fn consume(
  client: &client::Client<TcpStream>,
  destination: &str,
  index: usize,
  listener: Arc<dyn MessageListener<Delivery>>,
  requeue: bool,
) -> impl Future<Item = (), Error = Error> + Send + 'static {
  let queue_name = destination.to_owned();
  let consumer_tag = format!("lapinbridge-{}", index);

  client
    .create_channel()
    .and_then(move |channel| {
      debug!("checking queue {}", &queue_name);
      // passive: the queue belongs to the broker configuration
      let options = QueueDeclareOptions {
        passive: true,
        ..QueueDeclareOptions::default()
      };
      channel
        .queue_declare(&*queue_name, options, FieldTable::new())
        .map(|queue| (channel, queue))
    })
    .and_then(move |(channel, queue)| {
      debug!("creating consumer {} on {}", &consumer_tag, queue.name());
      channel
        .basic_consume(
          &queue,
          &*consumer_tag,
          BasicConsumeOptions::default(),
          FieldTable::new(),
        )
        .map(|stream| (channel, stream))
    })
    .and_then(move |(channel, stream)| {
      stream.for_each(move |delivery| {
        let tag = delivery.delivery_tag;
        match listener.on_message(delivery) {
          Ok(()) => Either::A(channel.basic_ack(tag, false).map(|_| ())),
          Err(e) => {
            error!("Delivery {} failed, rejecting it (requeue: {}): {}", tag, requeue, e);
            Either::B(
              channel.basic_reject(tag, requeue).map(|_| ()),
            )
          }
        }
      })
    })
    .map_err(Error::from)
}

fn resolve(connection_info: &ConnectionInfo) -> Result<SocketAddr, Error> {
  (&*connection_info.host, connection_info.port)
    .to_socket_addrs()?
    .next()
    .ok_or_else(|| {
      BridgeError::Configuration(format!("cannot resolve {}", connection_info.host)).into()
    })
}

fn create_client(
  connection_info: &ConnectionInfo,
) -> impl Future<Item = client::Client<TcpStream>, Error = Error> + Send + 'static {
  let amqp_connection = client::ConnectionOptions {
    username: connection_info.user.clone(),
    password: connection_info.password.clone(),
    vhost: connection_info.vhost.clone(),
    ..client::ConnectionOptions::default()
  };
  let addr = match resolve(connection_info) {
    Ok(addr) => addr,
    Err(e) => return Either::A(future::err(e)),
  };
  trace!("Opening a TCP connection to {}", addr);
  Either::B(
    TcpStream::connect(&addr)
      .map_err(Error::from)
      .and_then(|stream| client::Client::connect(stream, amqp_connection).map_err(Error::from))
      .and_then(|(client, heartbeat)| {
        tokio::spawn(heartbeat.map_err(|e| warn!("heartbeat error: {:?}", e)))
          .into_future()
          .map(|_| client)
          .map_err(|_| err_msg("Could not spawn the heartbeat"))
      }),
  )
}
