//! Core proxy service: upstream forwarding plus response filtering.
//!
//! `ProxyService` is the entry point for all traffic. Every request is
//! forwarded to the configured upstream; what happens to the response
//! depends on the route:
//!
//! - **Rules / Alerts** (`/api/v1/rules`, `/api/v1/alerts`): the tenant
//!   value is resolved from the request headers before forwarding, and the
//!   upstream response body is rewritten through the tenant filter.
//! - **Everything else**: zero-copy streaming passthrough, no buffering.
//!
//! The tenant is resolved before the upstream leg so that a request without
//! a tenant identity fails fast with 400 and never reaches the backend.

use bytes::Bytes;
use http::header::HeaderName;
use http::{HeaderValue, Uri, header};
use http_body::Body;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tower::Service;
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::rewrite::{GateBody, rewrite_api_response};
use crate::routes::{RouteTarget, route};
use crate::rules::{filter_alerts, filter_rules};
use crate::tenant::tenant_value;

/// Body type sent on the upstream leg.
type ClientBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Reverse proxy service with tenant filtering on the rules and alerts
/// endpoints.
///
/// Cheap to clone; the underlying client pools upstream connections.
pub struct ProxyService {
    /// HTTPS-capable pooled client for upstream connections
    client: Client<HttpsConnector<HttpConnector>, ClientBody>,
    /// Upstream base URL, scheme and authority (e.g. "http://prometheus:9090")
    upstream_url: String,
    /// Label name designating tenant ownership
    label: String,
    /// Request header carrying the tenant value
    tenant_header: HeaderName,
    /// Runtime tuning
    config: GateConfig,
}

impl Clone for ProxyService {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            upstream_url: self.upstream_url.clone(),
            label: self.label.clone(),
            tenant_header: self.tenant_header.clone(),
            config: self.config.clone(),
        }
    }
}

impl ProxyService {
    /// Create a new proxy service.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Connection` if the rustls crypto provider cannot
    /// be installed.
    pub fn new(
        upstream_url: impl Into<String>,
        label: impl Into<String>,
        tenant_header: HeaderName,
        config: GateConfig,
    ) -> GateResult<Self> {
        // Install the default crypto provider exactly once; concurrent
        // service construction in tests must not race the install.
        static RUSTLS_INIT: std::sync::OnceLock<Result<(), ()>> = std::sync::OnceLock::new();
        let init_result = RUSTLS_INIT.get_or_init(|| {
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| ())
        });
        if init_result.is_err() {
            return Err(GateError::Connection(
                "Failed to install rustls crypto provider".into(),
            ));
        }

        let mut http_connector = HttpConnector::new();
        http_connector.set_nodelay(config.tcp_nodelay);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build(https_connector);

        Ok(Self {
            client,
            upstream_url: upstream_url.into(),
            label: label.into(),
            tenant_header,
            config,
        })
    }

    /// Handle an incoming request.
    ///
    /// Routes the request, resolves the tenant where required, forwards
    /// upstream, and rewrites or streams the response back.
    pub async fn handle_request<B>(&self, req: Request<B>) -> GateResult<Response<GateBody>>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let target = route(req.uri().path());

        // Resolve the tenant before spending the upstream round trip; a
        // request without a tenant identity can never be answered.
        let tenant = match target {
            RouteTarget::Rules | RouteTarget::Alerts => {
                Some(tenant_value(req.headers(), &self.tenant_header)?)
            }
            RouteTarget::PassThrough => None,
        };

        let upstream_res = self.forward(req).await?;

        match (target, tenant) {
            (RouteTarget::Rules, Some(tenant)) => {
                debug!(tenant = %tenant, "Filtering rules response");
                rewrite_api_response(upstream_res, self.config.resp_buffer_max, |api| {
                    filter_rules(api, &self.label, &tenant)
                })
                .await
            }
            (RouteTarget::Alerts, Some(tenant)) => {
                debug!(tenant = %tenant, "Filtering alerts response");
                rewrite_api_response(upstream_res, self.config.resp_buffer_max, |api| {
                    filter_alerts(api, &self.label, &tenant)
                })
                .await
            }
            _ => Ok(upstream_res.map(|body| body.map_err(GateError::from).boxed())),
        }
    }

    /// Forward `req` to the upstream and return its response.
    async fn forward<B>(&self, req: Request<B>) -> GateResult<Response<hyper::body::Incoming>>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let target_uri = self.target_uri(req.uri())?;

        info!(
            method = %req.method(),
            uri = %req.uri(),
            target = %target_uri,
            "Proxying request"
        );

        let (parts, body) = req.into_parts();

        let mut upstream_req = Request::builder()
            .method(parts.method)
            .uri(target_uri.clone())
            .version(http::Version::HTTP_11);

        let headers = upstream_req.headers_mut().ok_or_else(|| {
            GateError::Connection("Request builder in invalid state".to_string())
        })?;
        for (name_opt, value) in parts.headers {
            if let Some(name) = name_opt
                && !is_hop_by_hop_header(name.as_str())
                && name != header::HOST
            {
                headers.insert(name, value);
            }
        }

        // The Host header follows the upstream authority, not the proxy's.
        if let Some(authority) = target_uri.authority()
            && let Ok(host) = HeaderValue::from_str(authority.as_str())
        {
            headers.insert(header::HOST, host);
        }

        let body: ClientBody = body
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { e.into() })
            .boxed();
        let upstream_req = upstream_req
            .body(body)
            .map_err(|e| GateError::Connection(format!("Failed to build request: {}", e)))?;

        self.client
            .request(upstream_req)
            .await
            .map_err(|e| GateError::Connection(format!("Upstream request failed: {}", e)))
    }

    /// Rebuild the request URI against the upstream base.
    fn target_uri(&self, uri: &Uri) -> GateResult<Uri> {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let full = format!("{}{}", self.upstream_url.trim_end_matches('/'), path);
        full.parse()
            .map_err(|e| GateError::InvalidUri(format!("Failed to parse upstream URI: {}", e)))
    }
}

impl<B> Service<Request<B>> for ProxyService
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<GateBody>;
    type Error = GateError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { service.handle_request(req).await })
    }
}

/// Whether a header is hop-by-hop and must not be forwarded upstream.
///
/// labelgate terminates both legs and never proxies protocol upgrades, so
/// connection-management headers stay on their own leg.
fn is_hop_by_hop_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-authenticate")
        || name.eq_ignore_ascii_case("proxy-authorization")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailers")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("upgrade")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ProxyService {
        ProxyService::new(
            "http://127.0.0.1:9090",
            "tenant",
            HeaderName::from_static("x-scope-orgid"),
            GateConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_target_uri_appends_path_and_query() {
        let svc = service();
        let uri: Uri = "/api/v1/rules?type=alert".parse().unwrap();
        assert_eq!(
            svc.target_uri(&uri).unwrap().to_string(),
            "http://127.0.0.1:9090/api/v1/rules?type=alert"
        );
    }

    #[test]
    fn test_target_uri_handles_trailing_slash_in_base() {
        let svc = ProxyService::new(
            "http://127.0.0.1:9090/",
            "tenant",
            HeaderName::from_static("x-scope-orgid"),
            GateConfig::default(),
        )
        .unwrap();
        let uri: Uri = "/metrics".parse().unwrap();
        assert_eq!(
            svc.target_uri(&uri).unwrap().to_string(),
            "http://127.0.0.1:9090/metrics"
        );
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop_header("Connection"));
        assert!(is_hop_by_hop_header("transfer-encoding"));
        assert!(is_hop_by_hop_header("Upgrade"));
        assert!(!is_hop_by_hop_header("accept"));
        assert!(!is_hop_by_hop_header("x-scope-orgid"));
    }
}
