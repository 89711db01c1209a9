//! # Trace forwarding
//!
//! Optional copy of every usage event to an external tracing service. The
//! [`TraceSink`] trait is the seam; [`LangfuseSink`] posts to the Langfuse
//! ingestion API.
//!
//! Forwarding is fire-and-forget: [`forward`] hands the event to a detached
//! task and returns immediately. Failures are logged and dropped, never retried.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LangfuseConfig;
use crate::error::TraceError;
use crate::runtime;
use crate::usage::UsageLog;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver of forwarded usage events.
pub trait TraceSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn record<'a>(&'a self, entry: &'a UsageLog) -> BoxFuture<'a, Result<(), TraceError>>;
}

/// Sends each usage event to Langfuse as a trace with one span named
/// `prompt:<key>`.
pub struct LangfuseSink {
    client: reqwest::Client,
    config: LangfuseConfig,
}

impl LangfuseSink {
    pub fn new(config: LangfuseConfig) -> Result<LangfuseSink, TraceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(LangfuseSink { client, config })
    }

    fn ingestion_url(&self) -> String {
        format!("{}/api/public/ingestion", self.config.host)
    }
}

impl TraceSink for LangfuseSink {
    fn name(&self) -> &'static str {
        "langfuse"
    }

    fn record<'a>(&'a self, entry: &'a UsageLog) -> BoxFuture<'a, Result<(), TraceError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.ingestion_url())
                .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
                .json(&ingestion_batch(entry))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TraceError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        })
    }
}

/// Builds the ingestion payload for one entry: a `trace-create` keyed by the
/// entry id and a `span-create` carrying input, output and metadata.
pub fn ingestion_batch(entry: &UsageLog) -> Value {
    let name = format!("prompt:{}", entry.prompt_key);
    let metadata = json!({
        "stage": entry.stage,
        "model": entry.model,
        "session_id": entry.session_id,
        "prompt_hash": entry.prompt_hash,
    });
    let level = if entry.success { "DEFAULT" } else { "ERROR" };

    json!({
        "batch": [
            {
                "id": Uuid::new_v4().to_string(),
                "timestamp": entry.timestamp,
                "type": "trace-create",
                "body": {
                    "id": entry.id,
                    "timestamp": entry.timestamp,
                    "name": name,
                    "sessionId": entry.session_id,
                    "metadata": metadata,
                },
            },
            {
                "id": Uuid::new_v4().to_string(),
                "timestamp": entry.timestamp,
                "type": "span-create",
                "body": {
                    "id": Uuid::new_v4().to_string(),
                    "traceId": entry.id,
                    "name": name,
                    "startTime": entry.timestamp,
                    "endTime": entry.timestamp,
                    "input": {
                        "prompt_key": entry.prompt_key,
                        "variables": entry.variables_used,
                    },
                    "output": { "success": entry.success },
                    "metadata": metadata,
                    "level": level,
                },
            },
        ]
    })
}

/// Sends a copy of `entry` to `sink` on a detached task.
pub fn forward(sink: Arc<dyn TraceSink>, entry: UsageLog) {
    let spawned = runtime::spawn_detached(async move {
        match sink.record(&entry).await {
            Ok(()) => {
                debug!(sink = sink.name(), prompt_key = %entry.prompt_key, "forwarded usage")
            }
            Err(e) => warn!(
                sink = sink.name(),
                prompt_key = %entry.prompt_key,
                error = %e,
                "failed to forward usage"
            ),
        }
    });

    if !spawned {
        warn!("no runtime available, usage event not forwarded");
    }
}
