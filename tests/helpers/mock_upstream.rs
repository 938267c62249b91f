//! Mock upstream query API server for integration testing.
//!
//! Serves one preconfigured status/body pair for every request and records
//! what it received, so tests can assert on the proxied request as well as
//! the rewritten response.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// A request observed by the mock upstream.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub uri: String,
    pub headers: HeaderMap,
}

/// Canned-response upstream server.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockUpstream {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests observed so far.
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Bind an ephemeral port and start serving in the background.
    pub async fn start(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let status = self.status;
        let body = self.body.clone();
        let seen = self.seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);

                let status = status;
                let body = body.clone();
                let seen = seen.clone();

                let svc = service_fn(move |req: Request<Incoming>| {
                    let body = body.clone();
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(SeenRequest {
                            uri: req.uri().to_string(),
                            headers: req.headers().clone(),
                        });

                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .header(header::CONTENT_TYPE, "application/json")
                                .body(Full::new(Bytes::from(body)))
                                .unwrap(),
                        )
                    }
                });

                tokio::spawn(async move {
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });

        addr
    }
}
