use async_trait::async_trait;
use chrono::{DateTime, Utc};
use counsel_flow::workflows::automation::{
    AutomationService, GenerationError, InMemoryStore, MessageSender, MessagingError,
    OutboundMessage, TextGenerator,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

pub(crate) type ApiService =
    AutomationService<InMemoryStore, LoggingSender, UnconfiguredGenerator>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Delivers messages to the log and keeps a copy for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingSender {
    outbox: Arc<Mutex<Vec<OutboundMessage>>>,
}

#[async_trait]
impl MessageSender for LoggingSender {
    async fn send(&self, message: OutboundMessage) -> Result<(), MessagingError> {
        info!(
            channel = message.channel.label(),
            recipient = %message.recipient.user_id,
            subject = message.subject.as_deref().unwrap_or(""),
            "message delivered"
        );
        let mut guard = self
            .outbox
            .lock()
            .map_err(|_| MessagingError::Transport("outbox mutex poisoned".to_string()))?;
        guard.push(message);
        Ok(())
    }
}

impl LoggingSender {
    pub(crate) fn delivered(&self) -> Vec<OutboundMessage> {
        match self.outbox.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Stand-in until a text-generation backend is wired up; personalized drafts fail
/// per record and show up in the pass summary.
#[derive(Default, Clone, Copy)]
pub(crate) struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable(
            "no text generation backend configured".to_string(),
        ))
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
