use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::origin_of;
use crate::error::{LinkError, Result};
use crate::models::{LinkedAccount, WireAccount};
use crate::providers::MailProvider;

/// A cross-window message as the receiving window sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub data: Value,
}

/// Delivery side of cross-document messaging, as held by the popup.
pub trait MessageTarget: Send + Sync {
    fn post_message(&self, data: Value, target_origin: &str);
}

type ListenerSenders = Vec<mpsc::UnboundedSender<WindowMessage>>;

/// Message events delivered to one window (the opener).
///
/// Every listener gets its own unbounded queue, so no amount of unrelated
/// traffic can evict a message a listener has not read yet.
#[derive(Debug, Clone)]
pub struct MessageBus {
    window_origin: String,
    listeners: Arc<Mutex<ListenerSenders>>,
}

impl MessageBus {
    pub fn new(window_origin: impl Into<String>) -> Self {
        Self {
            window_origin: window_origin.into(),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> MessageListener {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_listeners().push(sender);
        MessageListener { receiver }
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock_listeners();
        listeners.retain(|sender| !sender.is_closed());
        listeners.len()
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ListenerSenders> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A target other windows use to post into this one, stamped with the
    /// sender's origin.
    pub fn poster(&self, sender_origin: impl Into<String>) -> MessagePoster {
        MessagePoster {
            bus: self.clone(),
            origin: sender_origin.into(),
        }
    }

    fn deliver(&self, message: WindowMessage, target_origin: &str) {
        if target_origin != "*" && target_origin != self.window_origin {
            log::debug!(
                "[messages] dropped message for target_origin={target_origin} window_origin={}",
                self.window_origin
            );
            return;
        }
        // Dropped listeners are pruned here; none left is not an error.
        self.lock_listeners()
            .retain(|sender| sender.send(message.clone()).is_ok());
    }
}

#[derive(Debug, Clone)]
pub struct MessagePoster {
    bus: MessageBus,
    origin: String,
}

impl MessageTarget for MessagePoster {
    fn post_message(&self, data: Value, target_origin: &str) {
        self.bus.deliver(
            WindowMessage {
                origin: self.origin.clone(),
                data,
            },
            target_origin,
        );
    }
}

/// A registered message listener. Dropping it removes the listener.
#[derive(Debug)]
pub struct MessageListener {
    receiver: mpsc::UnboundedReceiver<WindowMessage>,
}

impl MessageListener {
    /// Next message, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<WindowMessage> {
        self.receiver.recv().await
    }
}

/// Origins whose messages the opener trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Trusts the backend serving `endpoint` and the application itself.
    pub fn for_endpoint(endpoint: &str, app_origin: &str) -> Self {
        let allowed = [endpoint, app_origin]
            .iter()
            .filter_map(|value| origin_of(value))
            .fold(Vec::new(), |mut allowed, origin| {
                if !allowed.contains(&origin) {
                    allowed.push(origin);
                }
                allowed
            });
        Self { allowed }
    }

    pub fn allows(&self, origin: &str) -> bool {
        origin_of(origin)
            .map(|origin| self.allowed.contains(&origin))
            .unwrap_or(false)
    }
}

/// Terminal result the callback page reports back to the opener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Success {
        provider: MailProvider,
        account: LinkedAccount,
    },
    Error {
        provider: MailProvider,
        error: String,
    },
}

impl LinkMessage {
    pub fn success(account: LinkedAccount) -> Self {
        LinkMessage::Success {
            provider: account.provider,
            account,
        }
    }

    pub fn error(provider: MailProvider, error: impl Into<String>) -> Self {
        LinkMessage::Error {
            provider,
            error: error.into(),
        }
    }

    pub fn provider(&self) -> MailProvider {
        match self {
            LinkMessage::Success { provider, .. } | LinkMessage::Error { provider, .. } => {
                *provider
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LinkMessage::Success { .. })
    }

    pub fn to_payload(&self) -> Value {
        let contract = self.provider().contract();
        match self {
            LinkMessage::Success { account, .. } => json!({
                "type": contract.success_tag(),
                "account": {
                    "id": account.id,
                    "email": account.email,
                    "last_sync": account.last_sync,
                },
            }),
            LinkMessage::Error { error, .. } => json!({
                "type": contract.error_tag(),
                "error": error,
            }),
        }
    }

    /// Reads a payload addressed to `provider`. Payloads for other providers,
    /// or without a recognised `type`, yield `None`.
    pub fn parse(provider: MailProvider, data: &Value) -> Option<Self> {
        let kind = data.get("type")?.as_str()?;
        let contract = provider.contract();

        if kind == contract.success_tag() {
            let account = data
                .get("account")
                .cloned()
                .map(serde_json::from_value::<WireAccount>)
                .transpose()
                .map_err(LinkError::from)
                .and_then(|wire| {
                    let wire = wire.ok_or_else(|| {
                        LinkError::Validation("success message has no account".to_string())
                    })?;
                    LinkedAccount::from_wire(provider, wire)
                });
            return Some(match account {
                Ok(account) => LinkMessage::success(account),
                Err(err) => LinkMessage::error(provider, format!("malformed success message: {err}")),
            });
        }

        if kind == contract.error_tag() {
            let error = data
                .get("error")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or("account linking failed");
            return Some(LinkMessage::error(provider, error));
        }

        None
    }

    pub fn into_outcome(self) -> Result<LinkedAccount> {
        match self {
            LinkMessage::Success { account, .. } => Ok(account),
            LinkMessage::Error { error, .. } => Err(LinkError::ExchangeFailed(error)),
        }
    }
}
