//! labelgate - tenant-scoping reverse proxy for monitoring query APIs.
//!
//! labelgate sits between clients and a Prometheus-style query API. It
//! forwards every request to the configured upstream and rewrites the JSON
//! bodies of the rules and alerts endpoints so that only rule groups and
//! alerts carrying the deployment's tenant label with the caller's tenant
//! value remain visible. The upstream stays tenant-unaware; the proxy is the
//! tenant boundary.
//!
//! # Request Flow
//!
//! ```text
//! Request ──► route(path)
//!                 │
//!      ┌──────────┴───────────────┐
//!      │                          │
//!  Rules / Alerts             PassThrough
//!      │                          │
//!      ▼                          ▼
//!  resolve tenant header     zero-copy streaming
//!      │
//!  forward upstream ──► rewrite_api_response ──► filtered body
//! ```
//!
//! Filtering fails closed: a response is either fully filtered or the
//! request fails visibly. No error path ever returns unfiltered data.

pub mod api;
pub mod config;
pub mod error;
pub mod labels;
pub mod logging_layer;
pub mod proxy_service;
pub mod rewrite;
pub mod routes;
pub mod rules;
pub mod tenant;
