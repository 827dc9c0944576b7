extern crate clap;
extern crate env_logger;
extern crate lapinbridge_lib as lapinbridge;
#[macro_use]
extern crate log;

use clap::{App, Arg};
use lapinbridge::{config, server};
use std::process;

fn main() {
  env_logger::init();
  let matches = App::new("lapinbridge")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Forwards the messages of a RabbitMQ queue to an in-process channel")
    .arg(
      Arg::with_name("config")
        .short("c")
        .long("config")
        .value_name("FILE")
        .help("JSON configuration file, the environment is used when absent")
        .takes_value(true),
    )
    .get_matches();

  let config = match matches.value_of("config") {
    Some(path) => config::from_file(path),
    None => config::from_env(),
  };
  if let Err(e) = config.and_then(server::run) {
    error!("{}", e);
    process::exit(1);
  }
}
