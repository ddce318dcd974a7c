//! Injected observer for the transport's log side channel.
//!
//! Components report what they are doing through a [`ProtocolObserver`]; the
//! outcome of an operation never depends on the observer.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sender {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    Info,
    Data,
    Handshake,
    Error,
    Warn,
}

/// One entry of the protocol log, shaped like the transport's log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub sender: Sender,
    pub kind: LogKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ProtocolEvent {
    pub fn new(sender: Sender, kind: LogKind, message: impl Into<String>) -> Self {
        ProtocolEvent {
            sender,
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ProtocolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.sender, self.kind, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

pub trait ProtocolObserver: Send + Sync {
    fn on_event(&self, event: &ProtocolEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProtocolObserver for NoopObserver {
    fn on_event(&self, _event: &ProtocolEvent) {}
}

/// Forwards events to `tracing` at a level matching their kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProtocolObserver for TracingObserver {
    fn on_event(&self, event: &ProtocolEvent) {
        match event.kind {
            LogKind::Error => error!(target: "privacy_lab::protocol", "{}", event),
            LogKind::Warn => warn!(target: "privacy_lab::protocol", "{}", event),
            LogKind::Data => debug!(target: "privacy_lab::protocol", "{}", event),
            LogKind::Info | LogKind::Handshake => {
                info!(target: "privacy_lab::protocol", "{}", event)
            }
        }
    }
}

/// Keeps every event in memory, for rendering a log panel or for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProtocolEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProtocolEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProtocolObserver for RecordingObserver {
    fn on_event(&self, event: &ProtocolEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::new();
        observer.on_event(&ProtocolEvent::new(Sender::Client, LogKind::Info, "hello"));
        observer.on_event(
            &ProtocolEvent::new(Sender::Server, LogKind::Handshake, "key").with_details("abc"),
        );
        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].details.as_deref(), Some("abc"));
    }

    #[test]
    fn test_event_serialization() {
        let event = ProtocolEvent::new(Sender::Client, LogKind::Handshake, "sent public key");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "sender": "CLIENT", "kind": "HANDSHAKE", "message": "sent public key" })
        );
        assert_eq!(event.to_string(), "[Client/Handshake] sent public key");
    }
}
