use crate::channel::{LoggingHandler, MessageHandler, PushChannel};
use crate::config::ClientConfig;
use crate::error::{SResult, SignalingError};
use crate::ice::{has_turn_server, IceServer};
use crate::message::SignalingMessage;
use crate::parameters::SignalingParameters;
use crate::room_page::RoomPage;
use crate::turn::request_turn_server;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, StatusCode, Url};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Notified once the ICE servers of a joined room are known.
pub trait IceServersObserver: Send + Sync {
    fn on_ice_servers(&self, ice_servers: Vec<IceServer>);
}

/// Joins a room on the relay server and exchanges signaling messages with
/// the other participant. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SignalingClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
    message_handler: Arc<dyn MessageHandler>,
    ice_servers_observer: Option<Arc<dyn IceServersObserver>>,
    parameters: RwLock<Option<Arc<SignalingParameters>>>,
    channel: Mutex<Option<PushChannel>>,
    send_queue: Mutex<VecDeque<String>>,
    // Serializes drains so a queued message is never posted twice.
    drain_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SignalingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!(
            "SignalingClient: connected={}",
            self.is_connected().unwrap_or(false)
        ))
    }
}

impl SignalingClient {
    pub fn builder() -> SignalingClientBuilder {
        SignalingClientBuilder::new()
    }

    /// Joins the room at `room_url`.
    ///
    /// Follows redirects, scrapes the room page, fetches a TURN server when
    /// the page offers none, notifies the ICE servers observer, opens the
    /// push channel and finally sends any messages queued before the join.
    ///
    /// Once the page is loaded the room is joined, so a failure to send the
    /// queued messages does not fail the call: it is reported through
    /// [`MessageHandler::on_error`] and the messages stay queued.
    pub async fn connect_to_room(&self, room_url: &str) -> SResult<Arc<SignalingParameters>> {
        let url =
            Url::parse(room_url).map_err(|err| SignalingError::invalid_url(room_url, err))?;

        let (resolved_url, html) = self.inner.load_room_page(url).await?;
        let parameters = Arc::new(self.inner.room_parameters(&resolved_url, &html).await?);

        tracing::info!(
            room = %parameters.room_key,
            client = %parameters.client_id,
            initiator = parameters.initiator,
            ice_servers = parameters.ice_servers.len(),
            "joined room"
        );

        *self
            .inner
            .parameters
            .write()
            .map_err(|_| SignalingError::LockPoisoned)? = Some(parameters.clone());

        if let Some(observer) = &self.inner.ice_servers_observer {
            observer.on_ice_servers(parameters.ice_servers.clone());
        }

        let channel = PushChannel::open(
            self.inner.http.clone(),
            &parameters.base_url,
            &parameters.channel_token,
            self.inner.config.poll_timeout,
            self.inner.message_handler.clone(),
        );
        if let Some(previous) = self.inner.lock_channel()?.replace(channel) {
            previous.close();
        }

        self.inner.drain_or_report().await;

        Ok(parameters)
    }

    /// Queues `message` for the other participant and drains the queue in
    /// the background. Before the room is joined messages simply wait.
    ///
    /// Drain failures are logged and reported through
    /// [`MessageHandler::on_error`].
    pub fn send_message(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "queueing message");

        match self.inner.lock_queue() {
            Ok(mut queue) => queue.push_back(message),
            Err(err) => {
                tracing::error!(error = %err, "dropping message");
                return;
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, message stays queued until the next flush");
            return;
        };

        let inner = self.inner.clone();
        runtime.spawn(async move { inner.drain_or_report().await });
    }

    /// Sends every queued message now. A no-op while not connected.
    pub async fn flush(&self) -> SResult<()> {
        self.inner.drain().await
    }

    /// Says `bye` to the room, closes the push channel and forgets the
    /// session. Does nothing when not connected.
    ///
    /// The send queue is emptied even when the `bye` could not be delivered;
    /// its messages were meant for this room only.
    pub async fn disconnect(&self) -> SResult<()> {
        if !self.is_connected()? {
            return Ok(());
        }

        self.inner
            .lock_queue()?
            .push_back(SignalingMessage::Bye.to_json()?);
        let sent = self.inner.drain().await;
        let dropped = {
            let mut queue = self.inner.lock_queue()?;
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            tracing::warn!(dropped, "discarding messages that were not delivered");
        }

        if let Some(channel) = self.inner.lock_channel()?.take() {
            channel.close();
        }
        *self
            .inner
            .parameters
            .write()
            .map_err(|_| SignalingError::LockPoisoned)? = None;

        tracing::info!("left room");
        sent
    }

    pub fn parameters(&self) -> SResult<Option<Arc<SignalingParameters>>> {
        self.inner.parameters()
    }

    pub fn is_connected(&self) -> SResult<bool> {
        Ok(self.inner.parameters()?.is_some())
    }

    pub fn pending_messages(&self) -> SResult<Vec<String>> {
        Ok(self.inner.lock_queue()?.iter().cloned().collect())
    }
}

impl ClientInner {
    fn parameters(&self) -> SResult<Option<Arc<SignalingParameters>>> {
        Ok(self
            .parameters
            .read()
            .map_err(|_| SignalingError::LockPoisoned)?
            .clone())
    }

    fn lock_queue(&self) -> SResult<MutexGuard<'_, VecDeque<String>>> {
        self.send_queue
            .lock()
            .map_err(|_| SignalingError::LockPoisoned)
    }

    fn lock_channel(&self) -> SResult<MutexGuard<'_, Option<PushChannel>>> {
        self.channel.lock().map_err(|_| SignalingError::LockPoisoned)
    }

    /// Fetches the room page, following redirects by hand so the final URL is
    /// known. The page is requested only once: the server joins the room on
    /// every successful GET.
    async fn load_room_page(&self, url: Url) -> SResult<(Url, String)> {
        let mut current = url;

        for _ in 0..=self.config.max_redirects {
            let response = self.http.get(current.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| {
                        SignalingError::malformed("Location", "redirect without a location")
                    })?;
                let next = current
                    .join(location)
                    .map_err(|err| SignalingError::invalid_url(location, err))?;

                tracing::debug!(from = %current, to = %next, "room URL redirected");
                current = next;
                continue;
            }

            if status != StatusCode::OK {
                return Err(SignalingError::UnexpectedStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let html = response.text().await?;
            return Ok((current, html));
        }

        Err(SignalingError::TooManyRedirects(self.config.max_redirects))
    }

    async fn room_parameters(&self, room_url: &Url, html: &str) -> SResult<SignalingParameters> {
        let page = RoomPage::parse(html)?;
        let mut parameters = SignalingParameters::from_room_page(room_url, page)?;

        if !has_turn_server(&parameters.ice_servers) {
            let turn_server =
                request_turn_server(&self.http, &parameters.turn_url, &parameters.base_url)
                    .await?;
            parameters.ice_servers.push(turn_server);
        }

        Ok(parameters)
    }

    /// Posts queued messages in order. Each one leaves the queue only after
    /// the server accepted it; the first failure stops the drain.
    async fn drain(&self) -> SResult<()> {
        let _guard = self.drain_lock.lock().await;

        let Some(parameters) = self.parameters()? else {
            let queued = self.lock_queue()?.len();
            tracing::debug!(queued, "not connected, keeping messages queued");
            return Ok(());
        };

        loop {
            let next = self.lock_queue()?.front().cloned();
            let Some(message) = next else {
                break;
            };

            self.post_message(&parameters.post_message_url, message)
                .await?;
            self.lock_queue()?.pop_front();
        }

        Ok(())
    }

    async fn drain_or_report(&self) {
        if let Err(err) = self.drain().await {
            tracing::error!(error = %err, "failed to send queued messages");
            self.message_handler
                .on_error(error_code(&err), err.to_string());
        }
    }

    async fn post_message(&self, url: &Url, message: String) -> SResult<()> {
        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(message)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(SignalingError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

fn error_code(err: &SignalingError) -> u16 {
    match err {
        SignalingError::UnexpectedStatus { status, .. } => *status,
        _ => 0,
    }
}

pub struct SignalingClientBuilder {
    config: ClientConfig,
    message_handler: Option<Arc<dyn MessageHandler>>,
    ice_servers_observer: Option<Arc<dyn IceServersObserver>>,
}

impl Default for SignalingClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            message_handler: None,
            ice_servers_observer: None,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.message_handler = Some(handler);
        self
    }

    pub fn with_ice_servers_observer(mut self, observer: Arc<dyn IceServersObserver>) -> Self {
        self.ice_servers_observer = Some(observer);
        self
    }

    pub fn build(self) -> SResult<SignalingClient> {
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(self.config.request_timeout)
            .connect_timeout(self.config.connect_timeout)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|err| SignalingError::HttpClientBuild(err.to_string()))?;

        Ok(SignalingClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                http,
                message_handler: self
                    .message_handler
                    .unwrap_or_else(|| Arc::new(LoggingHandler)),
                ice_servers_observer: self.ice_servers_observer,
                parameters: RwLock::new(None),
                channel: Mutex::new(None),
                send_queue: Mutex::new(VecDeque::new()),
                drain_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}
