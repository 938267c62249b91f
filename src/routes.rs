//! Request routing for the query API surface.
//!
//! Only two endpoints carry tenant-filterable payloads; everything else is
//! streamed through untouched. The router is stateless path matching — the
//! behavior behind each target lives in the proxy service.

/// Handling path for an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// Rules endpoint: response filtered through the rule-group handler.
    Rules,
    /// Alerts endpoint: response filtered through the alert handler.
    Alerts,
    /// Everything else: forwarded with a zero-copy streaming body.
    PassThrough,
}

/// Path of the rules endpoint.
pub const RULES_PATH: &str = "/api/v1/rules";
/// Path of the alerts endpoint.
pub const ALERTS_PATH: &str = "/api/v1/alerts";

/// Match a request path to its handling target. Exact match only.
pub fn route(path: &str) -> RouteTarget {
    match path {
        RULES_PATH => RouteTarget::Rules,
        ALERTS_PATH => RouteTarget::Alerts,
        _ => RouteTarget::PassThrough,
    }
}
