// siphon-rcs - The Siphon RCS Messaging Engine
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observability and metrics integration for the RCS engine.
//!
//! Provides a pluggable metrics sink for session lifecycle, message flow,
//! and HTTP upload retries, with a tracing-backed default implementation.
//!
//! # Example
//! ```
//! use rcs_observe::{set_engine_metrics, TracingEngineMetrics};
//! use std::sync::Arc;
//! set_engine_metrics(Arc::new(TracingEngineMetrics));
//! // Metrics automatically emitted via tracing events
//! ```

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::Level;

/// Metrics sink used by the engine to emit observability events.
///
/// Implementations should treat `kind`, `stage`, and `status` as
/// low-cardinality identifiers (e.g., "one2one", "invite", "delivered") and
/// avoid propagating untrusted or high-cardinality data into metrics/logs.
pub trait EngineMetrics: Send + Sync + 'static {
    fn on_session_created(&self, kind: &str);
    fn on_session_terminated(&self, kind: &str, reason: &str);
    fn on_message_received(&self, mime: &str);
    fn on_message_sent(&self, mime: &str);
    fn on_delivery_report(&self, status: &str);
    fn on_invitation_dropped(&self, reason: &str);
    fn on_upload_retry(&self, attempt: u32);
}

#[derive(Debug, Default)]
struct NoopEngineMetrics;

impl EngineMetrics for NoopEngineMetrics {
    fn on_session_created(&self, _kind: &str) {}
    fn on_session_terminated(&self, _kind: &str, _reason: &str) {}
    fn on_message_received(&self, _mime: &str) {}
    fn on_message_sent(&self, _mime: &str) {}
    fn on_delivery_report(&self, _status: &str) {}
    fn on_invitation_dropped(&self, _reason: &str) {}
    fn on_upload_retry(&self, _attempt: u32) {}
}

static ENGINE_METRICS: OnceCell<Arc<dyn EngineMetrics>> = OnceCell::new();
static NOOP_ENGINE_METRICS: NoopEngineMetrics = NoopEngineMetrics;

/// Installs the global engine metrics implementation.
///
/// Returns `true` if the metrics sink was installed, or `false` if it was
/// already configured.
pub fn set_engine_metrics(metrics: Arc<dyn EngineMetrics>) -> bool {
    ENGINE_METRICS.set(metrics).is_ok()
}

/// Returns the currently configured engine metrics sink.
pub fn engine_metrics() -> &'static dyn EngineMetrics {
    ENGINE_METRICS
        .get()
        .map(|arc| arc.as_ref())
        .unwrap_or(&NOOP_ENGINE_METRICS)
}

/// Creates a tracing span associated with the given session-scoped operation.
pub fn span_with_session(name: &'static str, session_id: &str) -> tracing::Span {
    tracing::span!(Level::INFO, "session", op = name, id = session_id)
}

/// Simple metrics implementation that logs via `tracing`.
#[derive(Debug, Default)]
pub struct TracingEngineMetrics;

impl EngineMetrics for TracingEngineMetrics {
    fn on_session_created(&self, kind: &str) {
        tracing::debug!(kind, "session created");
    }

    fn on_session_terminated(&self, kind: &str, reason: &str) {
        tracing::debug!(kind, reason, "session terminated");
    }

    fn on_message_received(&self, mime: &str) {
        tracing::debug!(mime, "message received");
    }

    fn on_message_sent(&self, mime: &str) {
        tracing::debug!(mime, "message sent");
    }

    fn on_delivery_report(&self, status: &str) {
        tracing::debug!(status, "delivery report");
    }

    fn on_invitation_dropped(&self, reason: &str) {
        tracing::warn!(reason, "invitation dropped");
    }

    fn on_upload_retry(&self, attempt: u32) {
        tracing::debug!(attempt, "upload retry");
    }
}
