//! RPC plumbing shared by servers and clients: transaction tokens and
//! the stream framing.
//!
//! A streamed body is a sequence of frames, each a 4-byte big-endian
//! length followed by that many payload bytes. Server egress streams
//! start with the literal bytes `OK` before the first frame. Client push
//! bodies start with the raw 20-byte transaction token.

pub mod invserver;
pub mod ioserver;
pub mod server;

use std::fmt;
use std::io::{self, Read, Write};

use rand::RngCore;

use crate::errors::{Error, Kind, Result};

/// Length of a transaction token in bytes.
pub const TX_LEN: usize = 20;

/// The bytes prefixed to every server egress stream.
pub const STREAM_PREAMBLE: [u8; 2] = *b"OK";

/// A transaction token, minted per I/O session and used to index open
/// file handles on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tx(pub [u8; TX_LEN]);

impl Tx {
    /// Generates a new random token.
    pub fn generate() -> Tx {
        let mut tx = [0u8; TX_LEN];
        rand::thread_rng().fill_bytes(&mut tx);
        Tx(tx)
    }

    /// Creates a token from a byte slice of exactly [`TX_LEN`] bytes.
    pub fn from_bytes(b: &[u8]) -> Result<Tx> {
        if b.len() != TX_LEN {
            return Err(Error::new(Kind::Invalid)
                .op("rpc.tx_from_bytes")
                .with(format!("transaction token must be {TX_LEN} bytes, got {}", b.len())));
        }

        let mut tx = [0u8; TX_LEN];
        tx.copy_from_slice(b);
        Ok(Tx(tx))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "...")
    }
}

/// Writes one length-prefixed frame.
pub fn write_frame(w: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    w.write_all(&(payload.len() as u32).to_be_bytes())?;
    w.write_all(payload)
}

/// Reads one length-prefixed frame. Returns `None` at a clean
/// end-of-stream on a frame boundary.
pub fn read_frame(r: &mut impl Read) -> Result<Option<Vec<u8>>> {
    const OP: &str = "rpc.read_frame";

    let mut len_bytes = [0u8; 4];
    match read_full(r, &mut len_bytes) {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) => return Err(Error::new(Kind::IO).op(OP).with(e.to_string())),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .map_err(|e| Error::new(Kind::IO).op(OP).with(e.to_string()))?;

    Ok(Some(payload))
}

/// Consumes and checks the `OK` stream preamble.
pub fn read_preamble(r: &mut impl Read) -> Result<()> {
    const OP: &str = "rpc.read_preamble";

    let mut ok = [0u8; 2];
    r.read_exact(&mut ok)
        .map_err(|e| Error::new(Kind::IO).op(OP).with(e.to_string()))?;

    if ok != STREAM_PREAMBLE {
        return Err(Error::new(Kind::IO)
            .op(OP)
            .with("unexpected stream preamble"));
    }

    Ok(())
}

// Like read_exact, but reports a clean EOF before the first byte as
// Ok(false) instead of an error.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) if n == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended mid-frame",
                ))
            }
            Ok(m) => n += m,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_roundtrip() {
        let tx = Tx::generate();
        let back = Tx::from_bytes(tx.as_bytes()).unwrap();
        assert_eq!(tx, back);

        assert!(Tx::from_bytes(&[0u8; 8]).is_err());
    }

    #[test]
    fn tx_tokens_are_unique() {
        assert_ne!(Tx::generate(), Tx::generate());
    }

    #[test]
    fn frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        write_frame(&mut buf, b"").unwrap();
        write_frame(&mut buf, b"world").unwrap();

        let mut r = buf.as_slice();
        assert_eq!(read_frame(&mut r).unwrap().unwrap(), b"hello");
        assert_eq!(read_frame(&mut r).unwrap().unwrap(), b"");
        assert_eq!(read_frame(&mut r).unwrap().unwrap(), b"world");
        assert_eq!(read_frame(&mut r).unwrap(), None);
    }

    #[test]
    fn truncated_frame_is_io_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        buf.truncate(buf.len() - 2);

        let mut r = buf.as_slice();
        let err = read_frame(&mut r).unwrap_err();
        assert!(err.is(Kind::IO));
    }

    #[test]
    fn preamble_check() {
        let mut r: &[u8] = b"OK";
        read_preamble(&mut r).unwrap();

        let mut r: &[u8] = b"NO";
        let err = read_preamble(&mut r).unwrap_err();
        assert!(err.is(Kind::IO));
    }
}
