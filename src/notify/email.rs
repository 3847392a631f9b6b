//! Email transport
//!
//! Delivery is an external collaborator. The dispatcher only needs a
//! `send` that either succeeds or reports why it did not.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// An outgoing email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(to = %message.to, subject = %message.subject, "Email (log transport)");
        Ok(())
    }
}

/// Posts each message as JSON to an HTTP mail relay
pub struct RelayEmailTransport {
    client: Client,
    endpoint: String,
}

impl RelayEmailTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, EmailError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmailTransport for RelayEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Keeps sent messages in memory. Can be switched into a failing mode.
#[derive(Debug, Clone, Default)]
pub struct MemoryEmailTransport {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemoryEmailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailTransport for MemoryEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(true);
        if failing {
            return Err(EmailError::Unavailable("memory transport set to fail".into()));
        }
        self.sent
            .lock()
            .map_err(|_| EmailError::Unavailable("poisoned outbox".into()))?
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "assessor@lab.test".into(),
            subject: "[GEA Portal] Assessor assigned".into(),
            body: "You were assigned".into(),
        }
    }

    #[tokio::test]
    async fn test_memory_transport_records_and_fails_on_demand() {
        let transport = MemoryEmailTransport::new();
        transport.send(&message()).await.unwrap();
        assert_eq!(transport.sent(), vec![message()]);

        transport.set_failing(true);
        assert!(transport.send(&message()).await.is_err());
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        assert!(LogEmailTransport.send(&message()).await.is_ok());
    }

    #[test]
    fn test_relay_keeps_endpoint() {
        let relay = RelayEmailTransport::new("http://localhost:8025/send").unwrap();
        assert_eq!(relay.endpoint(), "http://localhost:8025/send");
    }
}
