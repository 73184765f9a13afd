//! The inventory service: the administrative surface of a store.

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use tracing::debug;

use crate::errors::marshal_error;
use crate::proto;
use crate::rpc::server::{not_found, payload_response, plain_error, HttpBody};
use crate::store::Management;

pub struct Server {
    mgnt: Arc<dyn Management>,
}

impl Server {
    pub fn new(mgnt: Arc<dyn Management>) -> Server {
        Server { mgnt }
    }

    pub async fn handle(&self, method: &str, req: Request<Incoming>) -> Response<HttpBody> {
        match method {
            "volumes" => self.volumes(req).await,
            _ => not_found(),
        }
    }

    async fn volumes(&self, req: Request<Incoming>) -> Response<HttpBody> {
        const OP: &str = "rpc/invserver.volumes";

        // drain the (empty) request message
        if let Err(e) = req.into_body().collect().await {
            return plain_error(&e.to_string());
        }

        let resp = match self.mgnt.volumes() {
            Ok(volumes) => proto::VolumesResponse {
                volumes,
                error: Vec::new(),
            },
            Err(e) => {
                debug!("{OP}: {e}");
                proto::VolumesResponse {
                    volumes: Vec::new(),
                    error: marshal_error(Some(&e)),
                }
            }
        };

        match serde_json::to_vec(&resp) {
            Ok(payload) => payload_response(payload),
            Err(e) => plain_error(&e.to_string()),
        }
    }
}
