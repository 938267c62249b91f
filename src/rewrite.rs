//! Response rewrite adapter.
//!
//! Turns a pure envelope-mutation function into a response interceptor:
//! gate on the transport status, buffer and decode the body, apply the
//! mutation, re-encode, and swap the body in with corrected framing. The
//! discriminator-first decode of rule payloads needs the whole body in
//! memory, so the adapter never stream-filters; it buffers up to a
//! configured cap and atomically replaces body plus `Content-Length` at
//! the end.
//!
//! There is no fallback after the gate: once the original body has been
//! consumed it cannot be restored, so any later failure is terminal for
//! the response and surfaces as a proxy error. Falling back to the
//! unmodified body would hand one tenant another tenant's data.

use bytes::Bytes;
use http::{Response, StatusCode, header};
use http_body::Body;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use tracing::{debug, warn};

use crate::api::ApiResponse;
use crate::error::GateError;

/// Unified body type produced by the proxy pipeline.
///
/// Passthrough responses stream the upstream body; rewritten responses
/// carry a fully buffered replacement. Both are boxed to one return type.
pub type GateBody = BoxBody<Bytes, GateError>;

/// Intercept `resp` and rewrite its envelope with `modify`.
///
/// State machine per response:
/// 1. Non-200 transport status: return the response as-is, body untouched,
///    no decode attempted.
/// 2. Buffer the body (at most `max_bytes`) and decode the envelope.
/// 3. Run `modify` on the decoded envelope.
/// 4. Re-encode the envelope into a fresh buffer.
/// 5. Swap the body and set `Content-Length` to the exact new length;
///    a stale `Transfer-Encoding` marker is dropped along with the old
///    body it described.
///
/// # Errors
///
/// - `PayloadTooLarge` - body exceeded `max_bytes`
/// - `Connection` - the upstream body stream failed mid-read
/// - `DecodeEnvelope` / `UnexpectedApiStatus` - envelope decode failed
/// - whatever `modify` returns, unchanged
/// - `EncodeEnvelope` - the mutated envelope failed to serialize
pub async fn rewrite_api_response<B, F>(
    resp: Response<B>,
    max_bytes: usize,
    modify: F,
) -> Result<Response<GateBody>, GateError>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    F: FnOnce(&mut ApiResponse) -> Result<(), GateError>,
{
    // Pass non-200 responses as-is.
    if resp.status() != StatusCode::OK {
        return Ok(resp.map(|body| {
            body.map_err(|e| {
                let e: Box<dyn std::error::Error + Send + Sync> = e.into();
                GateError::Connection(e.to_string())
            })
            .boxed()
        }));
    }

    let (mut parts, body) = resp.into_parts();

    // The collected buffer lives to the end of this scope at most; the
    // original body is fully drained here whether or not decode succeeds.
    let collected = Limited::new(body, max_bytes).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            warn!(limit = max_bytes, "API response exceeded buffer limit");
            GateError::PayloadTooLarge { limit: max_bytes }
        } else {
            GateError::Connection(format!("failed to buffer API response: {}", e))
        }
    })?;
    let original = collected.to_bytes();

    let mut api = ApiResponse::decode(&original)?;

    modify(&mut api)?;

    let rewritten = api.encode()?;

    debug!(
        original_len = original.len(),
        rewritten_len = rewritten.len(),
        "Rewrote API response body"
    );

    parts.headers.remove(header::TRANSFER_ENCODING);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, rewritten.len().into());

    let body = Full::new(rewritten).map_err(|e| match e {}).boxed();
    Ok(Response::from_parts(parts, body))
}
