//! Error handling for tapestore.
//!
//! Every error carries a kind, the operation that produced it and an
//! optional nested cause. Errors cross the wire in a compact binary
//! envelope (see [`Error::marshal`]) so that clients can recover the full
//! chain, not just a message.

use std::fmt;

use crate::PathName;

pub type Result<T> = std::result::Result<T, Error>;

/// The class of an error.
///
/// The numeric values are part of the wire encoding; new kinds must only
/// be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Kind {
    #[error("other error")]
    Other,
    #[error("invalid operation")]
    Invalid,
    #[error("permission denied")]
    Permission,
    #[error("i/o error")]
    IO,
    #[error("item already exists")]
    Exist,
    #[error("item does not exist")]
    NotExist,
    #[error("item is a directory")]
    IsDir,
    #[error("item is not a directory")]
    NotDir,
    #[error("directory not empty")]
    NotEmpty,
    #[error("information withheld")]
    Private,
    #[error("internal error")]
    Internal,
    #[error("transient error")]
    Transient,
}

impl Kind {
    fn as_i64(self) -> i64 {
        match self {
            Kind::Other => 0,
            Kind::Invalid => 1,
            Kind::Permission => 2,
            Kind::IO => 3,
            Kind::Exist => 4,
            Kind::NotExist => 5,
            Kind::IsDir => 6,
            Kind::NotDir => 7,
            Kind::NotEmpty => 8,
            Kind::Private => 9,
            Kind::Internal => 10,
            Kind::Transient => 11,
        }
    }

    fn from_i64(v: i64) -> Kind {
        match v {
            1 => Kind::Invalid,
            2 => Kind::Permission,
            3 => Kind::IO,
            4 => Kind::Exist,
            5 => Kind::NotExist,
            6 => Kind::IsDir,
            7 => Kind::NotDir,
            8 => Kind::NotEmpty,
            9 => Kind::Private,
            10 => Kind::Internal,
            11 => Kind::Transient,
            _ => Kind::Other,
        }
    }
}

/// A nested cause: either another structured [`Error`] or a plain message
/// from a foreign error type. The distinction is preserved on the wire
/// (`E` vs `e` tags).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    Error(Error),
    Plain(String),
}

impl From<Error> for Cause {
    fn from(e: Error) -> Cause {
        Cause::Error(e)
    }
}

impl From<String> for Cause {
    fn from(s: String) -> Cause {
        Cause::Plain(s)
    }
}

impl From<&str> for Cause {
    fn from(s: &str) -> Cause {
        Cause::Plain(s.to_string())
    }
}

/// The error type used throughout tapestore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// Path name of the item being accessed, if any.
    pub path: Option<PathName>,

    /// The operation being performed, usually `module.Method`.
    pub op: Option<String>,

    /// The class of error.
    pub kind: Kind,

    /// The underlying error that triggered this one, if any.
    pub cause: Option<Box<Cause>>,
}

/// Separator used between nested errors when formatting.
const SEPARATOR: &str = ":\n\t";

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error {
            path: None,
            op: None,
            kind,
            cause: None,
        }
    }

    /// Returns an `Other` error carrying a plain message.
    pub fn str(msg: impl Into<String>) -> Error {
        Error::new(Kind::Other).with(Cause::Plain(msg.into()))
    }

    pub fn op(mut self, op: impl Into<String>) -> Error {
        self.op = Some(op.into());
        self
    }

    pub fn path(mut self, path: impl Into<PathName>) -> Error {
        self.path = Some(path.into());
        self
    }

    /// Attaches a nested cause. If this error's kind is unset (`Other`)
    /// and the cause is a structured error, the inner kind is pulled up
    /// so the outermost error always classifies the failure.
    pub fn with(mut self, cause: impl Into<Cause>) -> Error {
        let mut cause = cause.into();

        if let Cause::Error(ref mut inner) = cause {
            if self.kind == Kind::Other {
                self.kind = inner.kind;
                inner.kind = Kind::Other;
            }
        }

        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is(&self, kind: Kind) -> bool {
        self.kind == kind
    }

    /// Marshals the error into its wire envelope: `E`, then path and op
    /// as uvarint-prefixed strings, the kind as a varint, and the
    /// recursive cause.
    pub fn marshal(&self) -> Vec<u8> {
        let mut b = vec![b'E'];
        self.marshal_append(&mut b);
        b
    }

    fn marshal_append(&self, b: &mut Vec<u8>) {
        append_string(b, self.path.as_deref().unwrap_or(""));
        append_string(b, self.op.as_deref().unwrap_or(""));
        put_varint(b, self.kind.as_i64());

        match self.cause.as_deref() {
            None => {}
            Some(Cause::Error(e)) => {
                b.push(b'E');
                e.marshal_append(b);
            }
            Some(Cause::Plain(s)) => {
                b.push(b'e');
                append_string(b, s);
            }
        }
    }

    /// Unmarshals a wire envelope produced by [`Error::marshal`]. Zero
    /// bytes decode to no error at all.
    pub fn unmarshal(b: &[u8]) -> Option<Error> {
        match unmarshal_cause(b)? {
            Cause::Error(e) => Some(e),
            Cause::Plain(s) => Some(Error::str(s)),
        }
    }
}

fn unmarshal_cause(b: &[u8]) -> Option<Cause> {
    if b.is_empty() {
        return None;
    }

    let (tag, rest) = (b[0], &b[1..]);
    match tag {
        b'e' => {
            let (s, _) = get_string(rest)?;
            Some(Cause::Plain(s))
        }
        b'E' => {
            let (path, rest) = get_string(rest)?;
            let (op, rest) = get_string(rest)?;
            let (kind, n) = get_varint(rest)?;

            let mut e = Error::new(Kind::from_i64(kind));
            if !path.is_empty() {
                e.path = Some(path);
            }
            if !op.is_empty() {
                e.op = Some(op);
            }
            e.cause = unmarshal_cause(&rest[n..]).map(Box::new);

            Some(Cause::Error(e))
        }
        // corrupt data; fall back to a plain message
        _ => Some(Cause::Plain(String::from_utf8_lossy(b).into_owned())),
    }
}

/// Marshals an optional error. `None` yields zero bytes.
pub fn marshal_error(err: Option<&Error>) -> Vec<u8> {
    match err {
        None => Vec::new(),
        Some(e) => e.marshal(),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        if let Some(path) = &self.path {
            parts.push(path.clone());
        }
        if let Some(op) = &self.op {
            parts.push(op.clone());
        }
        if self.kind != Kind::Other {
            parts.push(self.kind.to_string());
        }

        let head = parts.join(": ");

        match self.cause.as_deref() {
            None => {
                if head.is_empty() {
                    write!(f, "no error")
                } else {
                    write!(f, "{head}")
                }
            }
            Some(Cause::Error(inner)) => {
                if head.is_empty() {
                    write!(f, "{inner}")
                } else {
                    write!(f, "{head}{SEPARATOR}{inner}")
                }
            }
            Some(Cause::Plain(msg)) => {
                if head.is_empty() {
                    write!(f, "{msg}")
                } else {
                    write!(f, "{head}: {msg}")
                }
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        use std::io::ErrorKind as IoKind;

        let kind = match e.kind() {
            IoKind::NotFound => Kind::NotExist,
            IoKind::PermissionDenied => Kind::Permission,
            IoKind::AlreadyExists => Kind::Exist,
            _ => Kind::IO,
        };

        Error::new(kind).with(Cause::Plain(e.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Error {
        let kind = match e {
            rusqlite::Error::QueryReturnedNoRows => Kind::NotExist,
            _ => Kind::Internal,
        };

        Error::new(kind).with(Cause::Plain(e.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::new(Kind::Invalid).with(Cause::Plain(e.to_string()))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Error {
        Error::new(Kind::Invalid).with(Cause::Plain(e.to_string()))
    }
}

// Varint helpers for the wire envelope. Unsigned lengths use LEB128;
// the kind uses the zigzag signed form.

fn put_uvarint(b: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        b.push((v as u8) | 0x80);
        v >>= 7;
    }
    b.push(v as u8);
}

fn get_uvarint(b: &[u8]) -> Option<(u64, usize)> {
    let mut v: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in b.iter().enumerate() {
        if byte < 0x80 {
            if shift > 63 {
                return None;
            }
            return Some((v | (u64::from(byte) << shift), i + 1));
        }
        v |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if shift > 63 {
            return None;
        }
    }
    None
}

fn put_varint(b: &mut Vec<u8>, v: i64) {
    let zz = ((v << 1) ^ (v >> 63)) as u64;
    put_uvarint(b, zz);
}

fn get_varint(b: &[u8]) -> Option<(i64, usize)> {
    let (zz, n) = get_uvarint(b)?;
    Some((((zz >> 1) as i64) ^ -((zz & 1) as i64), n))
}

fn append_string(b: &mut Vec<u8>, s: &str) {
    put_uvarint(b, s.len() as u64);
    b.extend_from_slice(s.as_bytes());
}

fn get_string(b: &[u8]) -> Option<(String, &[u8])> {
    let (len, n) = get_uvarint(b)?;
    let len = len as usize;
    if b.len() < n + len {
        return None;
    }

    let s = String::from_utf8_lossy(&b[n..n + len]).into_owned();
    Some((s, &b[n + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_none_is_empty() {
        assert!(marshal_error(None).is_empty());
        assert_eq!(Error::unmarshal(&[]), None);
    }

    #[test]
    fn marshal_roundtrip() {
        let err = Error::new(Kind::NotExist)
            .op("inv/sqlite.alloc")
            .path("/archive/foo");

        let b = err.marshal();
        let back = Error::unmarshal(&b).expect("decoded error");

        assert_eq!(back, err);
    }

    #[test]
    fn marshal_roundtrip_nested() {
        let inner = Error::new(Kind::IO)
            .op("changer/mtx.status")
            .with("exit status 1");
        let outer = Error::new(Kind::Transient)
            .op("store/tape.open_file")
            .path("bar")
            .with(inner.clone());

        let back = Error::unmarshal(&outer.marshal()).expect("decoded error");

        assert_eq!(back.kind, Kind::Transient);
        assert_eq!(back.op.as_deref(), Some("store/tape.open_file"));
        assert_eq!(back.path.as_deref(), Some("bar"));
        match back.cause.as_deref() {
            Some(Cause::Error(e)) => {
                assert_eq!(*e, inner);
                assert_eq!(
                    e.cause.as_deref(),
                    Some(&Cause::Plain("exit status 1".to_string()))
                );
            }
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[test]
    fn kind_propagates_from_cause() {
        let inner = Error::new(Kind::NotExist).op("inv/sqlite.info");
        let outer = Error::new(Kind::Other).op("drive.start").with(inner);

        assert!(outer.is(Kind::NotExist));
        match outer.cause.as_deref() {
            Some(Cause::Error(e)) => assert_eq!(e.kind, Kind::Other),
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[test]
    fn io_error_kinds() {
        let e: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(e.is(Kind::NotExist));

        let e: Error = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(e.is(Kind::Permission));
    }

    #[test]
    fn display_nests() {
        let e = Error::new(Kind::Invalid)
            .op("changer/emulated.load")
            .with("no such slot");
        let s = e.to_string();
        assert!(s.contains("changer/emulated.load"));
        assert!(s.contains("invalid operation"));
        assert!(s.contains("no such slot"));
    }
}
