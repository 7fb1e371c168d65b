use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::account_store::AccountStore;
use crate::backend::LinkBackend;
use crate::config::LinkConfig;
use crate::endpoint::EndpointProber;
use crate::error::{LinkError, Result};
use crate::initiator::LinkInitiator;
use crate::messages::MessageBus;
use crate::models::LinkedAccount;
use crate::popup::{PopupController, PopupOpener};
use crate::providers::MailProvider;
use crate::reconciler::{Reconciler, ReconcilerTimings};
use crate::session::SessionProvider;

type ResolvedCallback = Box<dyn FnOnce(&Result<LinkedAccount>) + Send + 'static>;

/// Opener-side entry point: one call per "Connect account" click.
pub struct AccountLinker {
    session: Arc<dyn SessionProvider>,
    prober: EndpointProber,
    initiator: LinkInitiator,
    popups: PopupController,
    reconciler: Reconciler,
    bus: MessageBus,
    store: Option<Arc<AccountStore>>,
}

impl AccountLinker {
    pub fn new(
        config: &LinkConfig,
        backend: Arc<dyn LinkBackend>,
        session: Arc<dyn SessionProvider>,
        opener: Arc<dyn PopupOpener>,
        bus: MessageBus,
    ) -> Result<Self> {
        config.validate()?;
        let prober = EndpointProber::from_config(backend.clone(), config);
        Ok(Self {
            initiator: LinkInitiator::new(backend.clone(), prober.clone()),
            popups: PopupController::new(opener, config.popup_width, config.popup_height),
            reconciler: Reconciler::new(
                backend,
                session.clone(),
                config.app_origin.clone(),
                ReconcilerTimings::from(config),
            ),
            session,
            prober,
            bus,
            store: None,
        })
    }

    /// Hands each successfully linked account to `store`.
    pub fn with_store(mut self, store: Arc<AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn prober(&self) -> &EndpointProber {
        &self.prober
    }

    pub async fn link(&self, provider: MailProvider) -> Result<PendingLink> {
        self.start(provider, None).await
    }

    /// Like `link`, also calling `on_resolved` exactly once when the attempt
    /// resolves. Not called for cancelled attempts.
    pub async fn link_with<F>(&self, provider: MailProvider, on_resolved: F) -> Result<PendingLink>
    where
        F: FnOnce(&Result<LinkedAccount>) + Send + 'static,
    {
        self.start(provider, Some(Box::new(on_resolved))).await
    }

    async fn start(
        &self,
        provider: MailProvider,
        on_resolved: Option<ResolvedCallback>,
    ) -> Result<PendingLink> {
        let access_token = self.session.access_token();
        let ticket = self
            .initiator
            .initiate(provider, access_token.as_deref())
            .await?;
        let popup = self
            .popups
            .open(&ticket.auth_url, &format!("Connect {}", provider.name()))?;

        let attempt = self.reconciler.listen(ticket, popup, &self.bus);
        let id = attempt.id().to_string();
        let store = self.store.clone();
        let (sender, receiver) = oneshot::channel();

        let task = tokio::spawn(async move {
            let resolution = attempt.resolve().await;
            let outcome = resolution.outcome;
            if let (Ok(account), Some(store)) = (&outcome, store.as_ref()) {
                if let Err(err) = store.upsert_linked(account.clone()) {
                    log::error!("[linker] storing linked account {} failed: {err}", account.id);
                }
            }
            if let Some(on_resolved) = on_resolved {
                on_resolved(&outcome);
            }
            let _ = sender.send(outcome);
        });

        Ok(PendingLink {
            id,
            provider,
            receiver: Some(receiver),
            task,
        })
    }
}

/// A listening link attempt. Dropping it before it resolves cancels it.
pub struct PendingLink {
    id: String,
    provider: MailProvider,
    receiver: Option<oneshot::Receiver<Result<LinkedAccount>>>,
    task: JoinHandle<()>,
}

impl PendingLink {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> MailProvider {
        self.provider
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops listening, closes the popup and stops both timers.
    pub fn cancel(&self) {
        if !self.task.is_finished() {
            log::info!("[linker] cancelling attempt={}", self.id);
            self.task.abort();
        }
    }

    pub async fn outcome(mut self) -> Result<LinkedAccount> {
        let Some(receiver) = self.receiver.take() else {
            return Err(LinkError::Cancelled);
        };
        receiver.await.unwrap_or(Err(LinkError::Cancelled))
    }
}

impl Drop for PendingLink {
    fn drop(&mut self) {
        self.cancel();
    }
}
