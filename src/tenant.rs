//! Per-request tenant resolution.
//!
//! The tenant identity arrives on each request in a configurable header
//! (`X-Scope-OrgID` by default). It is resolved once, before the request is
//! forwarded upstream, and passed into the filter handlers as a plain
//! argument. A request without a usable tenant value fails with 400: the
//! filter cannot run without a tenant identity, and skipping the filter
//! would return another tenant's data.

use http::HeaderMap;
use http::header::HeaderName;

use crate::error::GateError;

/// Resolve the tenant value from `headers`.
///
/// # Errors
///
/// `MissingTenant` if the header is absent, empty, or not valid UTF-8.
pub fn tenant_value(headers: &HeaderMap, header: &HeaderName) -> Result<String, GateError> {
    let missing = || GateError::MissingTenant(header.as_str().to_string());

    let value = headers.get(header).ok_or_else(missing)?;
    let value = value.to_str().map_err(|_| missing())?;

    if value.is_empty() {
        return Err(missing());
    }

    Ok(value.to_string())
}
