use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error};
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: Ulid,
    pub message: String,
}

#[derive(Debug)]
pub struct AlertError(pub String);

impl std::fmt::Display for AlertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "alert delivery failed: {}", self.0)
    }
}

impl std::error::Error for AlertError {}

/// Operator notification channel for allocation failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), AlertError>;
}

/// Broadcast hub: every subscriber sees every alert.
pub struct AlertHub {
    sender: broadcast::Sender<Alert>,
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl AlertSink for AlertHub {
    /// No-op if nobody is subscribed.
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        let alert = Alert {
            id: Ulid::new(),
            message: message.to_string(),
        };
        if self.sender.send(alert).is_err() {
            debug!("alert dropped, no subscribers: {message}");
        }
        Ok(())
    }
}

/// Drain a subscription into the error log until the hub goes away.
pub async fn log_alerts(mut rx: broadcast::Receiver<Alert>) {
    loop {
        match rx.recv().await {
            Ok(alert) => error!(alert_id = %alert.id, "ALERT: {}", alert.message),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                error!("alert log lagged, {n} alerts skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
