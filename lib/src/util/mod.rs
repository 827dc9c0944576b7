use error::BridgeError;
use failure::Error;
use std::fs::File;
use std::io::Read;

pub fn read_file(path: &str) -> Result<String, Error> {
  let mut content = String::new();
  File::open(path)?.read_to_string(&mut content)?;
  Ok(content)
}

pub fn parse_flag(name: &str, value: &str) -> Result<bool, Error> {
  match value.trim().to_lowercase().as_str() {
    "true" | "yes" | "1" => Ok(true),
    "false" | "no" | "0" => Ok(false),
    _ => Err(BridgeError::Configuration(format!("{} must be a boolean, got {}", name, value)).into()),
  }
}
