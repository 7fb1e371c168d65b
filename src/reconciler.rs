//! Opener-side completion of a link attempt.
//!
//! Three independent sources can report the outcome of an attempt: a
//! cross-window message from the callback page, the server-side poll record,
//! and the popup being closed. They feed a single `select!` so exactly one of
//! them resolves the attempt. When several are ready at once the order is
//! message, then poll, then popup-closed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::backend::LinkBackend;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::messages::{LinkMessage, MessageBus, MessageListener, OriginPolicy, WindowMessage};
use crate::models::{outcome_from_parts, LinkTicket, LinkedAccount};
use crate::popup::PopupHandle;
use crate::providers::MailProvider;
use crate::session::SessionProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerTimings {
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub closed_check_interval: Duration,
    pub closed_grace: Duration,
}

impl Default for ReconcilerTimings {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

impl From<&LinkConfig> for ReconcilerTimings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            poll_max_attempts: config.poll_max_attempts,
            closed_check_interval: config.closed_check_interval(),
            closed_grace: config.closed_grace(),
        }
    }
}

/// Which source resolved an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Message,
    Poll,
    PopupClosed,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Message => "message",
            Channel::Poll => "poll",
            Channel::PopupClosed => "popup-closed",
        })
    }
}

#[derive(Debug)]
pub struct Resolution {
    pub channel: Channel,
    pub outcome: Result<LinkedAccount>,
}

/// Set once, by whichever source resolves the attempt first.
#[derive(Debug, Default)]
pub struct ResolutionLatch {
    handled: AtomicBool,
}

impl ResolutionLatch {
    /// `true` only for the first caller.
    pub fn try_claim(&self) -> bool {
        self.handled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::SeqCst)
    }
}

/// Builds `LinkAttempt`s that share a backend, session and timing profile.
#[derive(Clone)]
pub struct Reconciler {
    backend: Arc<dyn LinkBackend>,
    session: Arc<dyn SessionProvider>,
    app_origin: String,
    timings: ReconcilerTimings,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn LinkBackend>,
        session: Arc<dyn SessionProvider>,
        app_origin: impl Into<String>,
        timings: ReconcilerTimings,
    ) -> Self {
        Self {
            backend,
            session,
            app_origin: app_origin.into(),
            timings,
        }
    }

    /// Enters `Listening` for an opened popup. The message listener is
    /// registered immediately; timers start on the first poll of `resolve`.
    pub fn listen(&self, ticket: LinkTicket, popup: PopupHandle, bus: &MessageBus) -> LinkAttempt {
        let id = Uuid::new_v4().to_string();
        let popup = Arc::new(popup);
        let origins = OriginPolicy::for_endpoint(&ticket.endpoint, &self.app_origin);

        let polls = ticket.poll_id.clone().map(|poll_id| {
            poll_stream(
                self.backend.clone(),
                self.session.clone(),
                ticket.provider,
                ticket.endpoint.clone(),
                poll_id,
                self.timings.poll_interval,
                self.timings.poll_max_attempts,
            )
        });
        let closed = closed_watch(
            popup.clone(),
            self.timings.closed_check_interval,
            self.timings.closed_grace,
        );

        log::info!(
            "[reconciler] listening attempt={id} provider={} poll_fallback={}",
            ticket.provider,
            polls.is_some()
        );

        LinkAttempt {
            id,
            provider: ticket.provider,
            origins,
            popup,
            latch: ResolutionLatch::default(),
            channels: Channels {
                messages: Some(bus.subscribe()),
                polls,
                closed: Some(closed),
            },
            cleaned_up: false,
        }
    }
}

struct Channels {
    messages: Option<MessageListener>,
    polls: Option<BoxStream<'static, Result<LinkedAccount>>>,
    closed: Option<BoxFuture<'static, ()>>,
}

/// One listening link attempt. Owns the popup handle and the three sources.
///
/// Dropping an unresolved attempt runs the same cleanup as resolution.
pub struct LinkAttempt {
    id: String,
    provider: MailProvider,
    origins: OriginPolicy,
    popup: Arc<PopupHandle>,
    latch: ResolutionLatch,
    channels: Channels,
    cleaned_up: bool,
}

enum Signal {
    Message(Option<WindowMessage>),
    Poll(Option<Result<LinkedAccount>>),
    Closed,
}

impl LinkAttempt {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> MailProvider {
        self.provider
    }

    pub fn is_handled(&self) -> bool {
        self.latch.is_handled()
    }

    pub async fn resolve(mut self) -> Resolution {
        let resolution = loop {
            let signal = tokio::select! {
                biased;
                message = next_message(&mut self.channels.messages) => Signal::Message(message),
                poll = next_poll(&mut self.channels.polls) => Signal::Poll(poll),
                () = closed_elapsed(&mut self.channels.closed) => Signal::Closed,
            };

            let candidate = match signal {
                Signal::Message(Some(message)) => self
                    .accept_message(&message)
                    .map(|outcome| (Channel::Message, outcome)),
                Signal::Message(None) => {
                    log::warn!("[reconciler] message bus closed attempt={}", self.id);
                    self.channels.messages = None;
                    None
                }
                Signal::Poll(Some(outcome)) => Some((Channel::Poll, outcome)),
                Signal::Poll(None) => {
                    log::info!(
                        "[reconciler] poll attempts exhausted attempt={}, waiting on other channels",
                        self.id
                    );
                    self.channels.polls = None;
                    None
                }
                Signal::Closed => Some((
                    Channel::PopupClosed,
                    Err(LinkError::ClosedWithoutCompleting),
                )),
            };

            if let Some((channel, outcome)) = candidate {
                if self.latch.try_claim() {
                    break Resolution { channel, outcome };
                }
            }
        };

        match &resolution.outcome {
            Ok(account) => log::info!(
                "[reconciler] resolved attempt={} channel={} account={}",
                self.id,
                resolution.channel,
                account.id
            ),
            Err(err) => log::info!(
                "[reconciler] resolved attempt={} channel={} error={err}",
                self.id,
                resolution.channel
            ),
        }
        self.cleanup();
        resolution
    }

    fn accept_message(&self, message: &WindowMessage) -> Option<Result<LinkedAccount>> {
        if !self.origins.allows(&message.origin) {
            log::debug!(
                "[reconciler] ignored message from origin={} attempt={}",
                message.origin,
                self.id
            );
            return None;
        }
        LinkMessage::parse(self.provider, &message.data).map(LinkMessage::into_outcome)
    }

    /// Stops both timers, removes the listener and closes the popup. Runs once.
    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.channels.polls = None;
        self.channels.closed = None;
        self.channels.messages = None;
        self.popup.close();
        log::debug!("[reconciler] cleaned up attempt={}", self.id);
    }
}

impl Drop for LinkAttempt {
    fn drop(&mut self) {
        if !self.cleaned_up {
            log::info!("[reconciler] attempt={} dropped while listening", self.id);
        }
        self.cleanup();
    }
}

async fn next_message(listener: &mut Option<MessageListener>) -> Option<WindowMessage> {
    match listener {
        Some(listener) => listener.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_poll(
    polls: &mut Option<BoxStream<'static, Result<LinkedAccount>>>,
) -> Option<Result<LinkedAccount>> {
    match polls {
        Some(polls) => polls.next().await,
        None => std::future::pending().await,
    }
}

async fn closed_elapsed(closed: &mut Option<BoxFuture<'static, ()>>) {
    match closed {
        Some(closed) => closed.await,
        None => std::future::pending().await,
    }
}

struct PollState {
    backend: Arc<dyn LinkBackend>,
    session: Arc<dyn SessionProvider>,
    provider: MailProvider,
    endpoint: String,
    poll_id: String,
    period: Duration,
    max_attempts: u32,
    attempts: u32,
    ticker: Option<Interval>,
}

/// Yields the first non-pending poll outcome, then ends after `max_attempts`
/// requests without one. Transport errors count as pending.
fn poll_stream(
    backend: Arc<dyn LinkBackend>,
    session: Arc<dyn SessionProvider>,
    provider: MailProvider,
    endpoint: String,
    poll_id: String,
    period: Duration,
    max_attempts: u32,
) -> BoxStream<'static, Result<LinkedAccount>> {
    let state = PollState {
        backend,
        session,
        provider,
        endpoint,
        poll_id,
        period,
        max_attempts,
        attempts: 0,
        ticker: None,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.attempts >= state.max_attempts {
                return None;
            }
            let period = state.period;
            let ticker = state.ticker.get_or_insert_with(|| {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;
            state.attempts += 1;

            let token = state.session.access_token();
            let response = state
                .backend
                .poll(&state.endpoint, &state.poll_id, token.as_deref())
                .await;
            match response {
                Ok(response) if response.pending => continue,
                Ok(response) => {
                    let outcome = outcome_from_parts(
                        state.provider,
                        response.success,
                        response.account,
                        response.error,
                        "account linking failed",
                    )
                    .map_err(LinkError::ExchangeFailed);
                    return Some((outcome, state));
                }
                Err(err) => {
                    log::debug!(
                        "[reconciler] poll attempt={} failed, treating as pending: {err}",
                        state.attempts
                    );
                }
            }
        }
    })
    .boxed()
}

/// Completes `grace` after the popup is first seen closed.
fn closed_watch(
    popup: Arc<PopupHandle>,
    check_every: Duration,
    grace: Duration,
) -> BoxFuture<'static, ()> {
    async move {
        let mut ticker = interval_at(Instant::now() + check_every, check_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if popup.is_closed() {
                break;
            }
        }
        log::info!(
            "[reconciler] popup closed, waiting {}ms for a late result",
            grace.as_millis()
        );
        tokio::time::sleep(grace).await;
    }
    .boxed()
}
