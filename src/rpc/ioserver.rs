//! The I/O session layer: transaction-scoped push/pull streams between
//! remote clients and a store.
//!
//! Sessions are opened by a prepare call that mints a transaction token
//! and records an open file handle under it. The streaming call then
//! claims the handle exclusively; the handle is closed when the stream
//! ends, errors, or the client disconnects.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::{Error, Kind, Result};
use crate::proto;
use crate::rpc::server::{
    error_response, not_found, payload_response, plain_error, stream_body, stream_response,
    HttpBody,
};
use crate::rpc::{Tx, STREAM_PREAMBLE, TX_LEN};
use crate::storage::{File, OpenFlags};
use crate::store::Store;

const PULL_CHUNK_SIZE: usize = 4096;
const LOG_INTERVAL: Duration = Duration::from_secs(1);

pub struct Server {
    store: Arc<dyn Store>,

    // open files, keyed by transaction token
    fds: Mutex<HashMap<Tx, Box<dyn File>>>,
}

impl Server {
    pub fn new(store: Arc<dyn Store>) -> Server {
        Server {
            store,
            fds: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, method: &str, req: Request<Incoming>) -> Response<HttpBody> {
        match method {
            "push/prepare" => self.push_prepare(req).await,
            "push/log" => self.push_log(req).await,
            "push" => self.push(req).await,
            "pull/prepare" => self.pull_prepare(req).await,
            "pull" => self.pull(req).await,
            "stat" => self.stat(req).await,
            _ => not_found(),
        }
    }

    async fn push_prepare(&self, req: Request<Incoming>) -> Response<HttpBody> {
        let req: proto::PushPrepareRequest = match decode_unary(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        };

        let mut flags = OpenFlags::new().create().write();
        flags = if req.append {
            flags.append()
        } else {
            flags.truncate()
        };

        let f = match self.store.open_file(&req.name, flags) {
            Ok(f) => f,
            Err(e) => return error_response(&e),
        };

        let tx = Tx::generate();

        debug!("rpc/ioserver.push_prepare (tx: {tx}): {}", req.name);

        self.fds.lock().insert(tx, f);

        respond(&proto::PushPrepareResponse {
            tx: tx.as_bytes().to_vec(),
            error: Vec::new(),
        })
    }

    async fn push(&self, req: Request<Incoming>) -> Response<HttpBody> {
        const OP: &str = "rpc/ioserver.push";

        let mut body = BodyReader::new(req.into_body());

        // the body starts with the raw transaction token
        let tx = match body.read_exact(TX_LEN).await {
            Ok(Some(b)) => match Tx::from_bytes(&b) {
                Ok(tx) => tx,
                Err(e) => return error_response(&e),
            },
            Ok(None) => return plain_error("missing transaction token"),
            Err(e) => return error_response(&e),
        };

        debug!("{OP} (tx: {tx}): starting");

        // claim the handle; it is owned by this stream from here on
        let mut f = match self.fds.lock().remove(&tx) {
            Some(f) => f,
            None => {
                return error_response(
                    &Error::new(Kind::NotExist)
                        .op(OP)
                        .with(format!("no such transaction: {tx}")),
                )
            }
        };

        loop {
            // chunks are length-prefixed frames
            let len = match body.read_exact(4).await {
                Ok(Some(b)) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize,
                Ok(None) => break,
                Err(_) => break, // client went away; close the handle
            };

            let payload = match body.read_exact(len).await {
                Ok(Some(b)) => b,
                _ => break,
            };

            let chunk: proto::Chunk = match serde_json::from_slice(&payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    return respond(&proto::PushResponse {
                        error: Error::from(e).op(OP).marshal(),
                    })
                }
            };

            if let Err(e) = f.write_all(&chunk.data) {
                debug!("{OP} (tx: {tx}): write failed: {e}");
                return respond(&proto::PushResponse {
                    error: Error::from(e).op(OP).marshal(),
                });
            }

            debug!("{OP} (tx: {tx}): received {} bytes", chunk.data.len());
        }

        debug!("{OP} (tx: {tx}): done; closing file");
        drop(f);

        respond(&proto::PushResponse::default())
    }

    async fn push_log(&self, req: Request<Incoming>) -> Response<HttpBody> {
        const OP: &str = "rpc/ioserver.push_log";

        let req: proto::PushLogRequest = match decode_unary(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        };

        match Tx::from_bytes(&req.tx) {
            Ok(tx) => debug!("{OP} (tx: {tx})"),
            Err(e) => return error_response(&e),
        }

        let (sender, body) = stream_body(8);

        tokio::spawn(async move {
            if sender
                .send(Bytes::from_static(&STREAM_PREAMBLE))
                .await
                .is_err()
            {
                return;
            }

            let mut seq: i64 = 0;

            loop {
                tokio::time::sleep(LOG_INTERVAL).await;

                let frame = match frame_message(&proto::PushLogEntry {
                    seq,
                    error: Vec::new(),
                }) {
                    Some(frame) => frame,
                    None => return,
                };

                if sender.send(frame).await.is_err() {
                    debug!("{OP}: client gone; log writer terminating");
                    return;
                }

                seq += 1;
            }
        });

        stream_response(body)
    }

    async fn pull_prepare(&self, req: Request<Incoming>) -> Response<HttpBody> {
        let req: proto::PullPrepareRequest = match decode_unary(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        };

        let mut f = match self.store.open(&req.name) {
            Ok(f) => f,
            Err(e) => return error_response(&e),
        };

        if req.offset != 0 {
            if let Err(e) = f.seek(SeekFrom::Start(req.offset as u64)) {
                return error_response(&Error::from(e).op("rpc/ioserver.pull_prepare"));
            }
        }

        let tx = Tx::generate();

        debug!("rpc/ioserver.pull_prepare (tx: {tx}): {} @{}", req.name, req.offset);

        self.fds.lock().insert(tx, f);

        respond(&proto::PullPrepareResponse {
            tx: tx.as_bytes().to_vec(),
            error: Vec::new(),
        })
    }

    async fn pull(&self, req: Request<Incoming>) -> Response<HttpBody> {
        const OP: &str = "rpc/ioserver.pull";

        let req: proto::PullRequest = match decode_unary(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        };

        let tx = match Tx::from_bytes(&req.tx) {
            Ok(tx) => tx,
            Err(e) => return error_response(&e),
        };

        debug!("{OP} (tx: {tx})");

        let mut f = match self.fds.lock().remove(&tx) {
            Some(f) => f,
            None => {
                return error_response(
                    &Error::new(Kind::NotExist)
                        .op(OP)
                        .with(format!("no such transaction: {tx}")),
                )
            }
        };

        let (sender, body) = stream_body(16);

        // file reads block; keep them off the runtime
        tokio::task::spawn_blocking(move || {
            if sender
                .blocking_send(Bytes::from_static(&STREAM_PREAMBLE))
                .is_err()
            {
                return;
            }

            let mut buf = vec![0u8; PULL_CHUNK_SIZE];

            loop {
                match f.read(&mut buf) {
                    // EOF: the stream just ends
                    Ok(0) => return,

                    Ok(n) => {
                        let frame = match frame_message(&proto::Chunk {
                            data: buf[..n].to_vec(),
                            error: Vec::new(),
                        }) {
                            Some(frame) => frame,
                            None => return,
                        };

                        if sender.blocking_send(frame).is_err() {
                            debug!("{OP}: client gone; pull reader terminating");
                            return;
                        }
                    }

                    // a final error chunk, then the handle is dropped
                    Err(e) => {
                        let err = Error::from(e).op(OP);
                        if let Some(frame) = frame_message(&proto::Chunk {
                            data: Vec::new(),
                            error: err.marshal(),
                        }) {
                            let _ = sender.blocking_send(frame);
                        }
                        return;
                    }
                }
            }
        });

        stream_response(body)
    }

    async fn stat(&self, req: Request<Incoming>) -> Response<HttpBody> {
        let req: proto::StatRequest = match decode_unary(req).await {
            Ok(req) => req,
            Err(resp) => return resp,
        };

        match self.store.stat(&req.name) {
            Ok(info) => respond(&proto::StatResponse {
                size: info.size,
                error: Vec::new(),
            }),
            Err(e) => error_response(&e),
        }
    }
}

/// Reads and decodes the request message of a unary method.
async fn decode_unary<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> std::result::Result<T, Response<HttpBody>> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| plain_error(&e.to_string()))?
        .to_bytes();

    serde_json::from_slice(&body).map_err(|e| error_response(&Error::from(e)))
}

/// Encodes a unary response message.
fn respond(msg: &impl Serialize) -> Response<HttpBody> {
    match serde_json::to_vec(msg) {
        Ok(payload) => payload_response(payload),
        Err(e) => plain_error(&e.to_string()),
    }
}

/// Encodes one length-prefixed frame of a stream.
fn frame_message(msg: &impl Serialize) -> Option<Bytes> {
    let payload = serde_json::to_vec(msg).ok()?;

    let mut b = Vec::with_capacity(4 + payload.len());
    b.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    b.extend_from_slice(&payload);

    Some(Bytes::from(b))
}

/// Buffered reads over a request body stream.
struct BodyReader {
    body: Incoming,
    buf: BytesMut,
    done: bool,
}

impl BodyReader {
    fn new(body: Incoming) -> BodyReader {
        BodyReader {
            body,
            buf: BytesMut::new(),
            done: false,
        }
    }

    /// Reads exactly `n` bytes. Returns `None` at a clean end-of-stream
    /// on a read boundary; an end mid-read is an error.
    async fn read_exact(&mut self, n: usize) -> Result<Option<Bytes>> {
        const OP: &str = "rpc/ioserver.read_exact";

        while self.buf.len() < n {
            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::new(Kind::IO).op(OP).with("body ended mid-frame"));
            }

            match self.body.frame().await {
                None => self.done = true,
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.buf.extend_from_slice(&data);
                    }
                }
                Some(Err(e)) => {
                    return Err(Error::new(Kind::IO).op(OP).with(e.to_string()));
                }
            }
        }

        Ok(Some(self.buf.split_to(n).freeze()))
    }
}
