//! Linking third-party mail accounts through an OAuth popup.
//!
//! The opener asks the backend to start a provider authorization
//! ([`LinkInitiator`]), opens the authorization URL in a popup
//! ([`PopupController`]) and waits for exactly one terminal result
//! ([`Reconciler`]). Inside the popup, [`CallbackPage`] exchanges the
//! authorization code and reports back. [`AccountLinker`] wires the opener
//! side together.

pub mod account_store;
pub mod backend;
pub mod callback;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod initiator;
pub mod linker;
pub mod messages;
pub mod models;
pub mod popup;
pub mod providers;
pub mod reconciler;
pub mod session;
mod utils;

#[cfg(test)]
mod test_support;

pub use account_store::AccountStore;
pub use backend::{HttpBackend, LinkBackend};
pub use callback::CallbackPage;
pub use config::LinkConfig;
pub use endpoint::EndpointProber;
pub use error::{LinkError, Result};
pub use initiator::LinkInitiator;
pub use linker::{AccountLinker, PendingLink};
pub use messages::{LinkMessage, MessageBus, MessageTarget, WindowMessage};
pub use models::{LinkTicket, LinkedAccount};
pub use popup::{PopupController, PopupHandle, PopupOpener, PopupWindow};
pub use providers::MailProvider;
pub use reconciler::{Channel, LinkAttempt, Reconciler, Resolution};
pub use session::{SessionProvider, StaticSession};
