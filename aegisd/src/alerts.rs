//! Log-backed alert sink.
//!
//! Default outbound notification channel: alerts land in the structured
//! log stream. Deployments that deliver to a chat webhook implement
//! `AlertSink` against their channel of choice; either way delivery
//! failures never propagate to the monitoring cycle.

use async_trait::async_trait;
use tracing::{error, info, warn};

use aegis_exec::{AlertSink, Severity};

/// Alert sink that writes notifications to the tracing log.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, severity: Severity, message: &str, fields: serde_json::Value) {
        match severity {
            Severity::Info => info!(alert = true, %fields, "{message}"),
            Severity::Warning => warn!(alert = true, %fields, "{message}"),
            Severity::Critical => error!(alert = true, %fields, "{message}"),
        }
    }
}
