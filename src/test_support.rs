use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tiny_http::{Header, ListenAddr, Response, Server};

use crate::backend::{BackendFuture, LinkBackend};
use crate::error::LinkError;
use crate::models::{ExchangeRequest, ExchangeResponse, InitResponse, PollResponse, WireAccount};
use crate::popup::{PopupFeatures, PopupOpener, PopupWindow};
use crate::providers::MailProvider;

pub fn wire_account(id: &str, email: &str) -> WireAccount {
    WireAccount {
        id: Some(id.to_string()),
        email: Some(email.to_string()),
        last_sync: Some("2026-10-17T09:00:00Z".to_string()),
        connected: Some(true),
    }
}

pub fn ready_poll(id: &str, email: &str) -> PollResponse {
    PollResponse {
        pending: false,
        success: true,
        account: Some(wire_account(id, email)),
        error: None,
    }
}

#[derive(Debug, Clone)]
pub enum HealthBehavior {
    Status(u16),
    TransportError,
    Hang,
}

#[derive(Debug, Clone)]
pub enum InitBehavior {
    Respond(InitResponse),
    Reject(String),
}

#[derive(Debug, Clone)]
pub enum ExchangeBehavior {
    Respond(ExchangeResponse),
    Reject(String),
}

#[derive(Debug, Clone)]
pub struct RecordedExchange {
    pub prefix: String,
    pub provider: MailProvider,
    pub code: String,
    pub state: String,
    pub redirect_uri: String,
    pub access_token: Option<String>,
}

/// Scripted `LinkBackend`. Poll attempts are numbered from 1; attempts with no
/// scripted response answer `pending`.
pub struct FakeBackend {
    health: Mutex<HashMap<String, HealthBehavior>>,
    health_calls: Mutex<Vec<String>>,
    init: Mutex<InitBehavior>,
    init_calls: Mutex<Vec<(String, MailProvider, String)>>,
    polls: Mutex<HashMap<usize, PollResponse>>,
    poll_failures: Mutex<HashSet<usize>>,
    poll_calls: AtomicUsize,
    exchange: Mutex<ExchangeBehavior>,
    exchange_calls: Mutex<Vec<RecordedExchange>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            health: Mutex::new(HashMap::new()),
            health_calls: Mutex::new(Vec::new()),
            init: Mutex::new(InitBehavior::Reject("init not scripted".to_string())),
            init_calls: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            poll_failures: Mutex::new(HashSet::new()),
            poll_calls: AtomicUsize::new(0),
            exchange: Mutex::new(ExchangeBehavior::Reject("exchange not scripted".to_string())),
            exchange_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_health(&self, prefix: &str, behavior: HealthBehavior) {
        self.health
            .lock()
            .unwrap()
            .insert(prefix.to_string(), behavior);
    }

    pub fn health_calls(&self) -> Vec<String> {
        self.health_calls.lock().unwrap().clone()
    }

    pub fn set_init(&self, behavior: InitBehavior) {
        *self.init.lock().unwrap() = behavior;
    }

    pub fn init_ok(&self, auth_url: &str, state: &str, poll_id: Option<&str>) {
        self.set_init(InitBehavior::Respond(InitResponse {
            success: true,
            auth_url: Some(auth_url.to_string()),
            state: Some(state.to_string()),
            poll_id: poll_id.map(str::to_string),
            error: None,
        }));
    }

    pub fn init_calls(&self) -> Vec<(String, MailProvider, String)> {
        self.init_calls.lock().unwrap().clone()
    }

    pub fn poll_on(&self, attempt: usize, response: PollResponse) {
        self.polls.lock().unwrap().insert(attempt, response);
    }

    pub fn fail_poll_on(&self, attempt: usize) {
        self.poll_failures.lock().unwrap().insert(attempt);
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn set_exchange(&self, behavior: ExchangeBehavior) {
        *self.exchange.lock().unwrap() = behavior;
    }

    pub fn exchange_calls(&self) -> Vec<RecordedExchange> {
        self.exchange_calls.lock().unwrap().clone()
    }
}

impl LinkBackend for FakeBackend {
    fn health<'a>(
        &'a self,
        prefix: &'a str,
        _access_token: Option<&'a str>,
    ) -> BackendFuture<'a, u16> {
        self.health_calls.lock().unwrap().push(prefix.to_string());
        let behavior = self
            .health
            .lock()
            .unwrap()
            .get(prefix)
            .cloned()
            .unwrap_or(HealthBehavior::TransportError);
        Box::pin(async move {
            match behavior {
                HealthBehavior::Status(status) => Ok(status),
                HealthBehavior::TransportError => {
                    Err(LinkError::Http("connection refused".to_string()))
                }
                HealthBehavior::Hang => std::future::pending().await,
            }
        })
    }

    fn init<'a>(
        &'a self,
        prefix: &'a str,
        provider: MailProvider,
        access_token: &'a str,
    ) -> BackendFuture<'a, InitResponse> {
        self.init_calls.lock().unwrap().push((
            prefix.to_string(),
            provider,
            access_token.to_string(),
        ));
        let behavior = self.init.lock().unwrap().clone();
        Box::pin(async move {
            match behavior {
                InitBehavior::Respond(response) => Ok(response),
                InitBehavior::Reject(reason) => Err(LinkError::InitiationFailed(reason)),
            }
        })
    }

    fn poll<'a>(
        &'a self,
        _prefix: &'a str,
        _poll_id: &'a str,
        _access_token: Option<&'a str>,
    ) -> BackendFuture<'a, PollResponse> {
        let attempt = self.poll_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failed = self.poll_failures.lock().unwrap().contains(&attempt);
        let response = self.polls.lock().unwrap().get(&attempt).cloned();
        Box::pin(async move {
            if failed {
                return Err(LinkError::Http("poll transport error".to_string()));
            }
            Ok(response.unwrap_or(PollResponse {
                pending: true,
                success: false,
                account: None,
                error: None,
            }))
        })
    }

    fn exchange<'a>(
        &'a self,
        prefix: &'a str,
        provider: MailProvider,
        request: ExchangeRequest<'a>,
        access_token: Option<&'a str>,
    ) -> BackendFuture<'a, ExchangeResponse> {
        self.exchange_calls.lock().unwrap().push(RecordedExchange {
            prefix: prefix.to_string(),
            provider,
            code: request.code.to_string(),
            state: request.state.to_string(),
            redirect_uri: request.redirect_uri.to_string(),
            access_token: access_token.map(str::to_string),
        });
        let behavior = self.exchange.lock().unwrap().clone();
        Box::pin(async move {
            match behavior {
                ExchangeBehavior::Respond(response) => Ok(response),
                ExchangeBehavior::Reject(reason) => Err(LinkError::ExchangeFailed(reason)),
            }
        })
    }
}

/// Browser window stand-in. `close` marks it closed and counts the calls.
#[derive(Debug, Default)]
pub struct FakePopup {
    closed: AtomicBool,
    close_calls: AtomicUsize,
    url: Mutex<String>,
}

impl FakePopup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The user closing the window; not counted as a `close` call.
    pub fn user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeOpener {
    blocked: bool,
    opened: Mutex<Vec<(String, String, PopupFeatures)>>,
    windows: Mutex<Vec<Arc<FakePopup>>>,
}

impl FakeOpener {
    pub fn allowing() -> Arc<Self> {
        Arc::new(Self {
            blocked: false,
            opened: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
        })
    }

    pub fn blocking() -> Arc<Self> {
        Arc::new(Self {
            blocked: true,
            opened: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<(String, String, PopupFeatures)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn last_window(&self) -> Option<Arc<FakePopup>> {
        self.windows.lock().unwrap().last().cloned()
    }
}

impl PopupOpener for FakeOpener {
    fn open(
        &self,
        url: &str,
        name: &str,
        features: &PopupFeatures,
    ) -> Option<Arc<dyn PopupWindow>> {
        self.opened
            .lock()
            .unwrap()
            .push((url.to_string(), name.to_string(), *features));
        if self.blocked {
            return None;
        }
        let window = FakePopup::new();
        *window.url.lock().unwrap() = url.to_string();
        self.windows.lock().unwrap().push(window.clone());
        Some(window)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Local HTTP server answering every request through `handler`.
pub struct MockHttpServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
}

impl MockHttpServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("mock server should bind");
        let port = match server.server_addr() {
            ListenAddr::IP(addr) => addr.port(),
            _ => panic!("mock server should listen on ip"),
        };
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let requests_thread = requests.clone();
        let stop_thread = stop.clone();

        thread::spawn(move || {
            while !stop_thread.load(Ordering::SeqCst) {
                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(_) => return,
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Authorization"))
                    .map(|header| header.value.as_str().to_string());
                let recorded = RecordedRequest {
                    method: request.method().as_str().to_string(),
                    path: request.url().to_string(),
                    authorization,
                    body,
                };
                let (status, payload) = handler(&recorded);
                requests_thread.lock().unwrap().push(recorded);
                let header =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                let response = Response::from_string(payload)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            port,
            requests,
            stop,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
