//! Outer envelope shared by all query API responses.
//!
//! Every endpoint of the upstream API wraps its result in the same JSON
//! envelope: a `status` discriminating success from failure, an opaque
//! `data` payload, and optional error/warning fields. The envelope is
//! decoded without interpreting the payload; handlers request a typed view
//! of `data` on demand and write a replacement back after filtering. This
//! keeps the codec shared across response types whose payload shapes have
//! nothing in common.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::GateError;

/// Envelope status value required for the payload to be trusted.
const STATUS_SUCCESS: &str = "success";

/// The outer API response envelope.
///
/// `data` stays an uninterpreted raw JSON value until a handler asks for a
/// typed view, so unrelated response shapes round-trip through the same
/// codec untouched. Optional fields absent from the upstream response stay
/// absent from the rewritten one.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,

    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl ApiResponse {
    /// Decode the envelope from raw bytes.
    ///
    /// Parses the outer object only; payload content is not inspected. An
    /// envelope whose `status` is anything but `"success"` is rejected: its
    /// payload cannot be trusted, and for a tenant boundary an untrusted
    /// payload must fail the response rather than pass through.
    ///
    /// # Errors
    ///
    /// - `DecodeEnvelope` - the bytes are not valid JSON for the envelope shape
    /// - `UnexpectedApiStatus` - the envelope status is not `"success"`
    pub fn decode(bytes: &[u8]) -> Result<Self, GateError> {
        let resp: ApiResponse =
            serde_json::from_slice(bytes).map_err(GateError::DecodeEnvelope)?;

        if resp.status != STATUS_SUCCESS {
            return Err(GateError::UnexpectedApiStatus(resp.status));
        }

        Ok(resp)
    }

    /// Typed view of the opaque payload.
    ///
    /// An absent `data` field decodes as JSON `null`; payload types with
    /// required fields turn that into a decode error at the caller.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_str("null"),
        }
    }

    /// Serialize `value` and store it as the opaque payload.
    pub fn set_payload<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.data = Some(serde_json::value::to_raw_value(value)?);
        Ok(())
    }

    /// Serialize the full envelope, including whatever payload is set.
    pub fn encode(&self) -> Result<Bytes, GateError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(GateError::EncodeEnvelope)
    }
}
