//! Audit recorder - durable, append-only security event log.
//!
//! Events flow through a bounded queue drained by a single writer task, so
//! callers never wait on the log write and events for one identity land in
//! submission order. When the queue is full the send waits for capacity
//! instead of dropping: losing a reuse-detection event would disable the
//! theft response, so overflow degrades to backpressure, never to loss.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::models::{actions, AuditEvent, Outcome, RequestContext, Severity};
use crate::store::AuditEventStore;

use super::ServiceError;

/// Tuning for the recorder and its read-side scans.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub queue_capacity: usize,
    /// Field-name fragments replaced by the redaction marker (lowercase).
    pub sensitive_fields: Vec<String>,
    /// Failures within the window that flag an identity.
    pub failed_request_threshold: u32,
    /// Distinct origins within the window that flag an identity.
    pub distinct_origin_threshold: u32,
    /// Denied authorization attempts within the window that flag an identity.
    pub denial_threshold: u32,
    /// How many origins a security report lists.
    pub top_origin_count: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            sensitive_fields: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "card".to_string(),
                "cvv".to_string(),
                "authorization".to_string(),
            ],
            failed_request_threshold: 10,
            distinct_origin_threshold: 3,
            denial_threshold: 5,
            top_origin_count: 5,
        }
    }
}

enum QueueMessage {
    Event(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Options for [`AuditRecorder::wrap_action`].
#[derive(Debug, Default)]
pub struct ActionOptions {
    /// Before-image of the touched record, captured by the caller.
    pub old_values: Option<Value>,
    /// Snapshot the serialized result as the after-image.
    pub capture_new_values: bool,
}

/// A pattern found by [`AuditRecorder::detect_suspicious_activity`].
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub code: FindingCode,
    pub observed: u32,
    pub window_minutes: i64,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCode {
    ExcessiveFailures,
    MultipleOrigins,
    RepeatedDenials,
}

/// Aggregated view over a trailing window of the event log.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub period_days: i64,
    pub total_events: u64,
    /// Events at high or critical severity.
    pub security_events: u64,
    /// Denied authorization attempts (permission and hierarchy).
    pub permission_violations: u64,
    pub suspicious_origins: Vec<OriginCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginCount {
    pub origin: String,
    pub events: u64,
}

#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<QueueMessage>,
    store: Arc<dyn AuditEventStore>,
    config: Arc<AuditConfig>,
}

impl AuditRecorder {
    /// Create the recorder and spawn its writer task.
    pub fn new(store: Arc<dyn AuditEventStore>, config: AuditConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueueMessage>(config.queue_capacity.max(1));

        let writer_store = store.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    QueueMessage::Event(event) => {
                        if let Err(e) = writer_store.append(event).await {
                            tracing::error!(error = %e, severity = "critical", "Failed to persist audit event");
                        }
                    }
                    QueueMessage::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            tx,
            store,
            config: Arc::new(config),
        }
    }

    /// Record an event. Redacts sensitive payload fields, then enqueues;
    /// waits for queue capacity when full and falls back to a synchronous
    /// append only if the writer is gone.
    pub async fn record(&self, mut event: AuditEvent) {
        event.redact(&self.config.sensitive_fields);

        if event.severity >= Severity::High {
            tracing::warn!(
                action = %event.action,
                severity = event.severity.as_str(),
                outcome = event.outcome.as_str(),
                identity = ?event.identity_id,
                origin = %event.context.origin,
                "Security event"
            );
        } else {
            tracing::debug!(
                action = %event.action,
                outcome = event.outcome.as_str(),
                "Audit event"
            );
        }

        let message = match self.tx.try_send(QueueMessage::Event(event)) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!("Audit queue full, applying backpressure");
                message
            }
            Err(mpsc::error::TrySendError::Closed(message)) => message,
        };

        if let Err(mpsc::error::SendError(message)) = self.tx.send(message).await {
            if let QueueMessage::Event(event) = message {
                if let Err(e) = self.store.append(event).await {
                    tracing::error!(error = %e, severity = "critical", "Failed to persist audit event");
                }
            }
        }
    }

    /// Wait until every event enqueued so far has been written.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(QueueMessage::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Run `f` and record exactly one event for it: low severity on
    /// success, medium on failure. This is the integration point request
    /// handlers use to get audit coverage around a business operation.
    #[allow(clippy::too_many_arguments)]
    pub async fn wrap_action<T, F, Fut>(
        &self,
        identity_id: Option<&str>,
        action: &str,
        resource: &str,
        resource_id: Option<&str>,
        context: &RequestContext,
        options: ActionOptions,
        f: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let result = f().await;

        let (outcome, severity) = match &result {
            Ok(_) => (Outcome::Success, Severity::Low),
            Err(_) => (Outcome::Failed, Severity::Medium),
        };

        let new_values = match (&result, options.capture_new_values) {
            (Ok(value), true) => serde_json::to_value(value).ok(),
            _ => None,
        };

        let mut event = AuditEvent::new(action, resource, outcome, severity, context.clone())
            .with_snapshots(options.old_values, new_values);
        if let Some(id) = identity_id {
            event = event.with_identity(id);
        }
        if let Some(rid) = resource_id {
            event = event.with_resource_id(rid);
        }

        self.record(event).await;

        result
    }

    /// Scan recent events for an identity and return findings for the
    /// configured abuse patterns. Takes no action itself.
    pub async fn detect_suspicious_activity(
        &self,
        identity_id: &str,
        window_minutes: i64,
    ) -> Result<Vec<Finding>, ServiceError> {
        let since = Utc::now() - Duration::minutes(window_minutes);
        let events = self.store.events_for_identity(identity_id, since).await?;

        let mut findings = Vec::new();

        let failures = events
            .iter()
            .filter(|e| e.outcome == Outcome::Failed)
            .count() as u32;
        if failures >= self.config.failed_request_threshold {
            findings.push(Finding {
                code: FindingCode::ExcessiveFailures,
                observed: failures,
                window_minutes,
                detail: format!("{failures} failed requests in the window"),
            });
        }

        let origins: HashSet<&str> = events.iter().map(|e| e.context.origin.as_str()).collect();
        if origins.len() as u32 >= self.config.distinct_origin_threshold {
            findings.push(Finding {
                code: FindingCode::MultipleOrigins,
                observed: origins.len() as u32,
                window_minutes,
                detail: format!("activity from {} distinct origins", origins.len()),
            });
        }

        let denials = events
            .iter()
            .filter(|e| {
                e.action == actions::PERMISSION_DENIED || e.action == actions::HIERARCHY_VIOLATION
            })
            .count() as u32;
        if denials >= self.config.denial_threshold {
            findings.push(Finding {
                code: FindingCode::RepeatedDenials,
                observed: denials,
                window_minutes,
                detail: format!("{denials} denied authorization attempts in the window"),
            });
        }

        Ok(findings)
    }

    /// Aggregate the trailing `days` of the log. An empty window yields an
    /// all-zero report.
    pub async fn generate_security_report(
        &self,
        days: i64,
    ) -> Result<SecurityReport, ServiceError> {
        let since = Utc::now() - Duration::days(days);
        let events = self.store.events_since(since).await?;

        let security_events = events
            .iter()
            .filter(|e| e.severity >= Severity::High)
            .count() as u64;

        let permission_violations = events
            .iter()
            .filter(|e| {
                e.action == actions::PERMISSION_DENIED || e.action == actions::HIERARCHY_VIOLATION
            })
            .count() as u64;

        let mut by_origin: HashMap<&str, u64> = HashMap::new();
        for event in &events {
            *by_origin.entry(event.context.origin.as_str()).or_default() += 1;
        }
        let mut suspicious_origins: Vec<OriginCount> = by_origin
            .into_iter()
            .map(|(origin, events)| OriginCount {
                origin: origin.to_string(),
                events,
            })
            .collect();
        suspicious_origins.sort_by(|a, b| b.events.cmp(&a.events).then(a.origin.cmp(&b.origin)));
        suspicious_origins.truncate(self.config.top_origin_count);

        Ok(SecurityReport {
            period_days: days,
            total_events: events.len() as u64,
            security_events,
            permission_violations,
            suspicious_origins,
        })
    }
}
