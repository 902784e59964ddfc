//! Fakes for the delivery collaborators.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::broadcast::delivery::{DeliveryError, Notifier, Pacer, RecipientSender};
use crate::broadcast::recipients::RecipientHandle;
use crate::broadcast::UserId;

/// Succeeds for everyone except the handles it was told to fail.
#[derive(Default)]
pub struct ScriptedSender {
    failures: HashMap<String, DeliveryError>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedSender {
    pub fn failing(mut self, handle: &str, error: DeliveryError) -> Self {
        self.failures.insert(handle.to_string(), error);
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipientSender for ScriptedSender {
    async fn resolve_and_send(
        &self,
        recipient: &RecipientHandle,
        _body: &str,
    ) -> Result<(), DeliveryError> {
        self.attempts
            .lock()
            .unwrap()
            .push(recipient.as_str().to_string());
        match self.failures.get(recipient.as_str()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(UserId, String)>>,
    broken: bool,
}

impl RecordingNotifier {
    /// A notifier whose every send fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<(UserId, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("chat unavailable");
        }
        self.messages
            .lock()
            .unwrap()
            .push((user_id, text.to_string()));
        Ok(())
    }
}

/// Records requested pauses without sleeping.
#[derive(Default)]
pub struct CountingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl CountingPacer {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}
