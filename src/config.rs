//! Server and client configuration.
//!
//! Configuration is a YAML document declaring one or more stores. Each
//! backend models its options as a concrete record; the `backend` field
//! selects the record type, and unknown backends are rejected when the
//! document is parsed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Error, Kind, Result};
use crate::store::tape;

/// The main server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub stores: HashMap<String, StoreConfig>,
}

/// A store configuration, dispatched on the `backend` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Fs(FsConfig),
    Tape(Box<tape::Config>),
}

/// Configuration for a file system backed store.
#[derive(Debug, Clone, Deserialize)]
pub struct FsConfig {
    pub root: PathBuf,
}

/// Reads and parses the server configuration file.
pub fn load_server(path: &Path) -> Result<ServerConfig> {
    const OP: &str = "config.load_server";

    let raw = fs::read_to_string(path).map_err(|e| Error::from(e).op(OP))?;
    parse_server(&raw).map_err(|e| e.op(OP))
}

/// Parses a server configuration document.
pub fn parse_server(raw: &str) -> Result<ServerConfig> {
    Ok(serde_yaml::from_str(raw)?)
}

/// The client configuration: where to find the server and which store
/// to target.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub addr: Option<String>,

    #[serde(default)]
    pub store: Option<String>,
}

/// Reads and parses a client configuration file.
pub fn load_client(path: &Path) -> Result<ClientConfig> {
    const OP: &str = "config.load_client";

    let raw = fs::read_to_string(path).map_err(|e| Error::from(e).op(OP))?;
    serde_yaml::from_str(&raw).map_err(|e| Error::from(e).op(OP))
}

// Helpers for backends reading their dynamic option maps.

/// Returns the named string option.
pub fn opt_str(opts: &HashMap<String, serde_yaml::Value>, key: &str) -> Result<String> {
    match opts.get(key) {
        Some(serde_yaml::Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(Error::new(Kind::Invalid)
            .with(format!("the {key} option must be a string, got {other:?}"))),
        None => Err(Error::new(Kind::Invalid).with(format!("the {key} option must be specified"))),
    }
}

/// Returns the named integer option. Strings holding digits are
/// accepted as well.
pub fn opt_i64(opts: &HashMap<String, serde_yaml::Value>, key: &str) -> Result<i64> {
    match opts.get(key) {
        Some(serde_yaml::Value::Number(n)) => n.as_i64().ok_or_else(|| {
            Error::new(Kind::Invalid).with(format!("the {key} option must be an integer"))
        }),
        Some(serde_yaml::Value::String(s)) => s.parse().map_err(|_| {
            Error::new(Kind::Invalid).with(format!("the {key} option must be an integer"))
        }),
        Some(other) => Err(Error::new(Kind::Invalid)
            .with(format!("the {key} option must be an integer, got {other:?}"))),
        None => Err(Error::new(Kind::Invalid).with(format!("the {key} option must be specified"))),
    }
}
