use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::broadcast::recipients::RecipientHandle;
use crate::broadcast::summary;
use crate::broadcast::UserId;

/// Longest error description kept for `DeliveryError::Unknown`.
pub const MAX_ERROR_LEN: usize = 200;

/// Send a progress notification after every this many recipients.
pub const PROGRESS_EVERY: usize = 5;

/// Why a single delivery failed. Closed set: every failure maps to exactly one kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("recipient not found")]
    NotFound,
    #[error("invalid handle")]
    InvalidHandle,
    #[error("privacy settings prevent delivery")]
    PrivacyRestricted,
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("not a user account")]
    NotAUserAccount,
    #[error("{0}")]
    Unknown(String),
}

impl DeliveryError {
    /// Build an `Unknown` error, truncating the description on a char boundary.
    pub fn unknown(description: impl Into<String>) -> Self {
        let mut description = description.into();
        if description.len() > MAX_ERROR_LEN {
            let mut end = MAX_ERROR_LEN;
            while !description.is_char_boundary(end) {
                end -= 1;
            }
            description.truncate(end);
            description.push('…');
        }
        Self::Unknown(description)
    }

    /// Short machine-friendly name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::InvalidHandle => "invalid-handle",
            Self::PrivacyRestricted => "privacy-restricted",
            Self::RateLimited { .. } => "rate-limited",
            Self::NotAUserAccount => "not-a-user-account",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Outcome of one delivery attempt. `outcome` holds either success or exactly one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub recipient: RecipientHandle,
    pub outcome: Result<(), DeliveryError>,
}

impl DeliveryResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        self.outcome.as_ref().err()
    }
}

/// Ordered results of one dispatch, in recipient input order.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub results: Vec<DeliveryResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryResult> {
        self.results.iter().filter(|r| !r.success())
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Resolves a handle on the messaging platform and delivers the body to it.
#[async_trait]
pub trait RecipientSender: Send + Sync {
    async fn resolve_and_send(
        &self,
        recipient: &RecipientHandle,
        body: &str,
    ) -> Result<(), DeliveryError>;
}

/// Outbound reply channel back to the user who started the dispatch.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()>;
}

/// Suspends between sends.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Production pacer backed by the tokio timer.
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sequential, paced delivery of one body to a list of recipients.
pub struct DeliveryPipeline<S, N, P> {
    sender: S,
    notifier: N,
    pacer: P,
    delay: Duration,
}

impl<S, N, P> DeliveryPipeline<S, N, P>
where
    S: RecipientSender,
    N: Notifier,
    P: Pacer,
{
    pub fn new(sender: S, notifier: N, pacer: P, delay: Duration) -> Self {
        Self {
            sender,
            notifier,
            pacer,
            delay,
        }
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Deliver `body` to every recipient in order, exactly once each.
    ///
    /// Per-recipient failures are recorded, never propagated. Progress goes to
    /// `user_id` after every [`PROGRESS_EVERY`] recipients and after the last one.
    pub async fn dispatch(
        &self,
        user_id: UserId,
        recipients: Vec<RecipientHandle>,
        body: &str,
    ) -> DispatchReport {
        let dispatch_id = Uuid::new_v4();
        let span = tracing::info_span!("dispatch", %dispatch_id, user_id, total = recipients.len());
        self.run(user_id, recipients, body).instrument(span).await
    }

    async fn run(
        &self,
        user_id: UserId,
        recipients: Vec<RecipientHandle>,
        body: &str,
    ) -> DispatchReport {
        let total = recipients.len();
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(total);

        info!("Starting dispatch to {} recipient(s)", total);

        for (index, recipient) in recipients.into_iter().enumerate() {
            let position = index + 1;

            let outcome = self.sender.resolve_and_send(&recipient, body).await;
            match &outcome {
                Ok(()) => info!(%recipient, "Message delivered"),
                Err(e) => warn!(%recipient, kind = e.kind(), "Delivery failed: {}", e),
            }
            results.push(DeliveryResult { recipient, outcome });

            if position % PROGRESS_EVERY == 0 || position == total {
                if let Some(latest) = results.last() {
                    let text = summary::progress(position, total, latest);
                    self.notify_best_effort(user_id, &text).await;
                }
            }

            if position < total {
                self.pacer.pause(self.delay).await;
            }
        }

        let report = DispatchReport {
            results,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            successful = report.successful(),
            failed = report.failed(),
            "Dispatch finished"
        );

        report
    }

    /// Send a reply, logging and dropping any failure.
    pub async fn notify_best_effort(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.notifier.notify(user_id, text).await {
            warn!(user_id, "Failed to send notification: {:#}", e);
        }
    }
}
