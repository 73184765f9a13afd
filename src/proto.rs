//! Wire message types for the io and inv services.
//!
//! Messages travel as serialized payloads inside the length-prefixed
//! framing of the rpc module. Error fields carry the binary error
//! envelope of the errors module; an empty field means no error.

use serde::{Deserialize, Serialize};

use crate::store::tape::Volume;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushPrepareRequest {
    pub name: String,

    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushPrepareResponse {
    #[serde(default)]
    pub tx: Vec<u8>,

    #[serde(default)]
    pub error: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub error: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushLogRequest {
    #[serde(default)]
    pub tx: Vec<u8>,
}

/// One entry of the push acknowledgement stream. The sequence number is
/// monotonically increasing within a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushLogEntry {
    pub seq: i64,

    #[serde(default)]
    pub error: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullPrepareRequest {
    pub name: String,

    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullPrepareResponse {
    #[serde(default)]
    pub tx: Vec<u8>,

    #[serde(default)]
    pub error: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub tx: Vec<u8>,
}

/// A piece of a streamed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub data: Vec<u8>,

    #[serde(default)]
    pub error: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatResponse {
    #[serde(default)]
    pub size: i64,

    #[serde(default)]
    pub error: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumesRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumesResponse {
    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default)]
    pub error: Vec<u8>,
}
