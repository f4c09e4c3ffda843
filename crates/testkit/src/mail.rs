//! Mailbox capture.
//!
//! Test applications that carry the `mail` capability record outgoing
//! messages into a [`Mailbox`] instead of sending them. The fixture
//! lookup fails with a descriptive configuration error when the
//! capability is absent, rather than handing back an empty capture.

use std::sync::Mutex;

use crate::app::CapabilityRegistry;
use crate::error::FixtureResult;

/// Name under which the mail capability is registered.
pub const MAIL_CAPABILITY: &str = "mail";

/// A captured outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

/// Records outgoing mail instead of delivering it.
#[derive(Debug, Default)]
pub struct Mailbox {
    messages: Mutex<Vec<MailMessage>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outgoing message.
    pub fn record(&self, message: MailMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }

    /// Number of captured messages.
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the captured messages.
    pub fn messages(&self) -> Vec<MailMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Discard all captured messages (per-test clearing).
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

/// Resolve the application's mailbox, failing descriptively when the
/// mail capability is not installed.
pub fn mailbox(capabilities: &CapabilityRegistry) -> FixtureResult<std::sync::Arc<Mailbox>> {
    capabilities.require::<Mailbox>(MAIL_CAPABILITY)
}
