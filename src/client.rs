//! The client library: synchronous access to a tapestore server over
//! HTTP, used by the command line tools.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::{Error, Kind, Result};
use crate::proto;
use crate::rpc::{self, Tx};
use crate::storage::FileInfo;
use crate::store::tape::Volume;
use crate::PathName;

/// The default server address.
pub const DEFAULT_ADDR: &str = "localhost:8080";

/// The default store to target.
pub const DEFAULT_STORE: &str = "default";

const PUSH_CHUNK_SIZE: usize = 4096;

pub struct Client {
    agent: ureq::Agent,
    base_url: String,
    store: String,
}

impl Client {
    pub fn new(addr: &str, store: &str) -> Client {
        Client {
            agent: ureq::Agent::new(),
            base_url: format!("http://{addr}"),
            store: store.to_string(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/api/v1/{}/{}", self.base_url, self.store, method)
    }

    fn post(&self, method: &str, req: &impl Serialize) -> Result<ureq::Response> {
        const OP: &str = "client.post";

        let payload = serde_json::to_vec(req)?;

        debug!("client: invoking {}", self.url(method));

        match self
            .agent
            .post(&self.url(method))
            .set("Content-Type", "application/octet-stream")
            .send_bytes(&payload)
        {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(_, resp)) => Err(read_error(resp)),
            Err(e) => Err(Error::new(Kind::IO).op(OP).with(e.to_string())),
        }
    }

    fn invoke<T: DeserializeOwned>(&self, method: &str, req: &impl Serialize) -> Result<T> {
        const OP: &str = "client.invoke";

        let resp = self.post(method, req)?;

        let mut body = Vec::new();
        resp.into_reader()
            .read_to_end(&mut body)
            .map_err(|e| Error::from(e).op(OP))?;

        serde_json::from_slice(&body).map_err(|e| Error::from(e).op(OP))
    }

    /// Retrieves basic file info.
    pub fn stat(&self, name: &PathName) -> Result<FileInfo> {
        let resp: proto::StatResponse = self.invoke(
            "io/stat",
            &proto::StatRequest {
                name: name.clone(),
            },
        )?;
        take_error(&resp.error)?;

        Ok(FileInfo { size: resp.size })
    }

    /// Pushes data from a reader to the named file. With `append` the
    /// data is appended; otherwise the file is truncated first.
    pub fn push(&self, name: &PathName, input: impl Read, append: bool) -> Result<()> {
        let prep: proto::PushPrepareResponse = self.invoke(
            "io/push/prepare",
            &proto::PushPrepareRequest {
                name: name.clone(),
                append,
            },
        )?;
        take_error(&prep.error)?;

        let tx = Tx::from_bytes(&prep.tx)?;
        debug!("client.push: prepare ok (tx: {tx})");

        // subscribe to the acknowledgement log while the push runs
        let done = Arc::new(AtomicBool::new(false));
        let log_thread = self.subscribe_log(prep.tx.clone(), Arc::clone(&done));

        let result = self.push_body(tx, input);

        done.store(true, Ordering::SeqCst);
        if let Some(handle) = log_thread {
            let _ = handle.join();
        }

        result
    }

    fn push_body(&self, tx: Tx, input: impl Read) -> Result<()> {
        const OP: &str = "client.push";

        let resp = match self
            .agent
            .post(&self.url("io/push"))
            .set("Content-Type", "application/octet-stream")
            .send(PushBody::new(tx, input))
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => return Err(read_error(resp)),
            Err(e) => return Err(Error::new(Kind::IO).op(OP).with(e.to_string())),
        };

        let mut body = Vec::new();
        resp.into_reader()
            .read_to_end(&mut body)
            .map_err(|e| Error::from(e).op(OP))?;

        let resp: proto::PushResponse =
            serde_json::from_slice(&body).map_err(|e| Error::from(e).op(OP))?;
        take_error(&resp.error)?;

        debug!("client.push: push done");

        Ok(())
    }

    fn subscribe_log(
        &self,
        tx: Vec<u8>,
        done: Arc<AtomicBool>,
    ) -> Option<std::thread::JoinHandle<()>> {
        let resp = self.post("io/push/log", &proto::PushLogRequest { tx }).ok()?;
        let mut r = resp.into_reader();

        Some(std::thread::spawn(move || {
            if rpc::read_preamble(&mut r).is_err() {
                return;
            }

            // heartbeats arrive every second, so the done flag is
            // observed promptly between frames
            while !done.load(Ordering::SeqCst) {
                let frame = match rpc::read_frame(&mut r) {
                    Ok(Some(frame)) => frame,
                    _ => return,
                };

                match serde_json::from_slice::<proto::PushLogEntry>(&frame) {
                    Ok(entry) => debug!("client.push: log received: {}", entry.seq),
                    Err(_) => return,
                }
            }
        }))
    }

    /// Pulls the named file into a writer, starting at `offset`.
    pub fn pull(&self, name: &PathName, out: &mut impl Write, offset: i64) -> Result<()> {
        const OP: &str = "client.pull";

        let prep: proto::PullPrepareResponse = self.invoke(
            "io/pull/prepare",
            &proto::PullPrepareRequest {
                name: name.clone(),
                offset,
            },
        )?;
        take_error(&prep.error)?;

        let tx = Tx::from_bytes(&prep.tx)?;
        debug!("client.pull: prepare ok (tx: {tx})");

        let resp = self.post("io/pull", &proto::PullRequest { tx: prep.tx.clone() })?;
        let mut r = resp.into_reader();

        rpc::read_preamble(&mut r)?;

        while let Some(frame) = rpc::read_frame(&mut r)? {
            let chunk: proto::Chunk =
                serde_json::from_slice(&frame).map_err(|e| Error::from(e).op(OP))?;

            take_error(&chunk.error)?;

            out.write_all(&chunk.data)
                .map_err(|e| Error::from(e).op(OP))?;

            debug!("client.pull: received {} bytes", chunk.data.len());
        }

        Ok(())
    }

    /// Returns the volumes known to the store's inventory.
    pub fn volumes(&self) -> Result<Vec<Volume>> {
        let resp: proto::VolumesResponse = self.invoke("inv/volumes", &proto::VolumesRequest {})?;
        take_error(&resp.error)?;

        Ok(resp.volumes)
    }
}

fn take_error(b: &[u8]) -> Result<()> {
    match Error::unmarshal(b) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

/// Decodes the error carried by a non-200 response.
fn read_error(resp: ureq::Response) -> Error {
    const OP: &str = "client.invoke";

    let octet_stream = resp.content_type() == "application/octet-stream";
    let status = resp.status();

    let mut body = Vec::new();
    if resp.into_reader().read_to_end(&mut body).is_err() {
        return Error::new(Kind::IO).op(OP).with("unreadable error response");
    }

    if octet_stream {
        if let Some(e) = Error::unmarshal(&body) {
            return e;
        }
    }

    Error::new(Kind::IO).op(OP).with(format!(
        "status {status}: {}",
        String::from_utf8_lossy(&body).trim()
    ))
}

/// The push request body: the raw transaction token followed by
/// length-prefixed chunk frames built from the input on the fly.
struct PushBody<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> PushBody<R> {
    fn new(tx: Tx, inner: R) -> PushBody<R> {
        PushBody {
            inner,
            buf: tx.as_bytes().to_vec(),
            pos: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let mut data = vec![0u8; PUSH_CHUNK_SIZE];
        let n = self.inner.read(&mut data)?;

        if n == 0 {
            self.eof = true;
            return Ok(());
        }

        let payload = serde_json::to_vec(&proto::Chunk {
            data: data[..n].to_vec(),
            error: Vec::new(),
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.buf.clear();
        self.buf
            .extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(&payload);
        self.pos = 0;

        Ok(())
    }
}

impl<R: Read> Read for PushBody<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.buf.len() {
            if self.eof {
                return Ok(0);
            }

            self.refill()?;

            if self.eof {
                return Ok(0);
            }
        }

        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_body_frames_input() {
        let tx = Tx::generate();
        let input: &[u8] = b"hello push body";

        let mut body = PushBody::new(tx, input);
        let mut encoded = Vec::new();
        body.read_to_end(&mut encoded).unwrap();

        // the raw token comes first
        assert_eq!(&encoded[..rpc::TX_LEN], tx.as_bytes());

        // then one frame holding the whole (small) input
        let mut rest = &encoded[rpc::TX_LEN..];
        let frame = rpc::read_frame(&mut rest).unwrap().unwrap();
        let chunk: proto::Chunk = serde_json::from_slice(&frame).unwrap();
        assert_eq!(chunk.data, input);

        assert_eq!(rpc::read_frame(&mut rest).unwrap(), None);
    }

    #[test]
    fn push_body_empty_input() {
        let tx = Tx::generate();
        let input: &[u8] = b"";

        let mut body = PushBody::new(tx, input);
        let mut encoded = Vec::new();
        body.read_to_end(&mut encoded).unwrap();

        assert_eq!(encoded.len(), rpc::TX_LEN);
    }
}
