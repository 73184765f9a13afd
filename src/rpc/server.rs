//! The HTTP server plumbing: routes `/api/v1/<store>/<service>/<method>`
//! requests to the io and inv services of the configured stores.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Body, Frame, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::rpc::{invserver, ioserver};
use crate::store::Store;

/// The response body type used across the server: either a buffered
/// payload or a channel-fed stream.
pub type HttpBody = BoxBody<Bytes, Infallible>;

const API_PREFIX: &str = "/api/v1/";

struct StoreHandlers {
    io: Arc<ioserver::Server>,
    inv: Option<Arc<invserver::Server>>,
}

/// Routes requests to per-store service handlers.
pub struct Router {
    stores: HashMap<String, StoreHandlers>,
}

impl Router {
    pub fn new() -> Router {
        Router {
            stores: HashMap::new(),
        }
    }

    /// Mounts the io service (and the inv service, when the store has a
    /// management surface) for the given store.
    pub fn add_store(&mut self, store: Arc<dyn Store>) {
        let name = store.name().to_string();

        let inv = store
            .management()
            .map(|m| Arc::new(invserver::Server::new(m)));

        self.stores.insert(
            name,
            StoreHandlers {
                io: Arc::new(ioserver::Server::new(store)),
                inv,
            },
        );
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Response<HttpBody> {
        let path = req.uri().path().to_string();

        let rest = match path.strip_prefix(API_PREFIX) {
            Some(rest) => rest,
            None => return not_found(),
        };

        let (store, service_method) = match rest.split_once('/') {
            Some(parts) => parts,
            None => return not_found(),
        };

        let handlers = match self.stores.get(store) {
            Some(handlers) => handlers,
            None => return not_found(),
        };

        debug!("rpc/server: {path}");

        if let Some(method) = service_method.strip_prefix("io/") {
            return handlers.io.handle(method, req).await;
        }

        if let Some(method) = service_method.strip_prefix("inv/") {
            if let Some(inv) = &handlers.inv {
                return inv.handle(method, req).await;
            }
        }

        not_found()
    }
}

impl Default for Router {
    fn default() -> Router {
        Router::new()
    }
}

/// Serves the router on the given listener until the process exits.
pub async fn serve(router: Arc<Router>, listener: TcpListener) -> Result<()> {
    loop {
        let (socket, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::from(e).op("rpc/server.serve"))?;

        debug!("rpc/server: connection from {peer}");

        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let router = Arc::clone(&router);
                async move { Ok::<_, Infallible>(router.handle(req).await) }
            });

            let builder = ConnBuilder::new(TokioExecutor::new());
            let conn = builder.serve_connection(TokioIo::new(socket), service);

            if let Err(e) = conn.await {
                debug!("rpc/server: connection error: {e}");
            }
        });
    }
}

// Response constructors.

fn full(payload: Vec<u8>) -> HttpBody {
    Full::new(Bytes::from(payload)).boxed()
}

pub fn not_found() -> Response<HttpBody> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(full(b"not found".to_vec()))
        .expect("static response")
}

/// A successful response carrying the payload only.
pub fn payload_response(payload: Vec<u8>) -> Response<HttpBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/octet-stream")
        .body(full(payload))
        .expect("static response")
}

/// A typed error: status 500 with the marshaled error envelope as an
/// octet-stream body.
pub fn error_response(err: &Error) -> Response<HttpBody> {
    debug!("rpc/server: request failed: {err}");

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header("Content-Type", "application/octet-stream")
        .body(full(err.marshal()))
        .expect("static response")
}

/// An untyped failure: status 500 with a plain text `Error:` line.
pub fn plain_error(msg: &str) -> Response<HttpBody> {
    debug!("rpc/server: request failed: {msg}");

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header("Content-Type", "text/plain")
        .body(full(format!("Error: {msg}\n").into_bytes()))
        .expect("static response")
}

/// A response body fed from a channel. The sender side observes client
/// disconnect as a failed send once the connection (and with it the
/// receiver) is dropped.
pub struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

/// Creates a streaming response body and its feeding channel.
pub fn stream_body(buffer: usize) -> (mpsc::Sender<Bytes>, HttpBody) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ChannelBody { rx }.boxed())
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Bytes>, Infallible>>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|opt| opt.map(|b| Ok(Frame::data(b))))
    }
}

/// A streaming response: 200 with a body that begins with the `OK`
/// preamble (already written by the caller through the channel).
pub fn stream_response(body: HttpBody) -> Response<HttpBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/octet-stream")
        .body(body)
        .expect("static response")
}
