//! Server-push channel.
//!
//! The room server keeps a mailbox per channel token. The client opens it
//! once and then long-polls it; every poll answers with the messages
//! queued since the previous one (possibly none).

use reqwest::{StatusCode, Url};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Callbacks for push-channel activity. Invoked from the channel task.
pub trait MessageHandler: Send + Sync {
    fn on_open(&self);
    fn on_message(&self, message: String);
    fn on_close(&self);
    fn on_error(&self, code: u16, description: String);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Close,
    Error { code: u16, description: String },
}

impl MessageHandler for UnboundedSender<ChannelEvent> {
    fn on_open(&self) {
        let _ = self.send(ChannelEvent::Open);
    }

    fn on_message(&self, message: String) {
        let _ = self.send(ChannelEvent::Message(message));
    }

    fn on_close(&self) {
        let _ = self.send(ChannelEvent::Close);
    }

    fn on_error(&self, code: u16, description: String) {
        let _ = self.send(ChannelEvent::Error { code, description });
    }
}

/// Handler that only logs; used when the caller registers none.
pub(crate) struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn on_open(&self) {
        tracing::info!("push channel opened");
    }

    fn on_message(&self, message: String) {
        tracing::info!(%message, "push channel message");
    }

    fn on_close(&self) {
        tracing::info!("push channel closed");
    }

    fn on_error(&self, code: u16, description: String) {
        tracing::warn!(code, %description, "push channel error");
    }
}

/// Makes sure `on_close` reaches the handler at most once, whether the server
/// closes the channel or the client does.
struct ChannelShared {
    handler: Arc<dyn MessageHandler>,
    closed: AtomicBool,
}

impl ChannelShared {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.handler.on_close();
        }
    }

    fn fail(&self, code: u16, description: String) {
        // Error ends the channel without a close notification.
        self.closed.store(true, Ordering::SeqCst);
        self.handler.on_error(code, description);
    }
}

pub struct PushChannel {
    shared: Arc<ChannelShared>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PushChannel {
    /// Spawns the channel task. Must be called from within a tokio runtime.
    pub fn open(
        http: reqwest::Client,
        base_url: &Url,
        token: &str,
        poll_timeout: Duration,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let shared = Arc::new(ChannelShared {
            handler,
            closed: AtomicBool::new(false),
        });

        let open_url = channel_url(base_url, "channel/open", token, None);
        let poll_url = channel_url(base_url, "channel/poll", token, Some(poll_timeout));
        let task_shared = shared.clone();

        let task = tokio::spawn(async move {
            run_channel(http, open_url, poll_url, poll_timeout, task_shared).await;
        });

        Self { shared, task }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst) || self.task.is_finished()
    }

    /// Stops polling. `on_close` fires unless the channel already ended.
    pub fn close(&self) {
        self.task.abort();
        self.shared.close();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn channel_url(base_url: &Url, path: &str, token: &str, poll_timeout: Option<Duration>) -> Url {
    let mut url = base_url.clone();
    url.set_path(&format!("{}{path}", base_url.path()));
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("token", token);
        if let Some(timeout) = poll_timeout {
            query.append_pair("timeout_ms", &timeout.as_millis().to_string());
        }
    }
    url
}

async fn run_channel(
    http: reqwest::Client,
    open_url: Url,
    poll_url: Url,
    poll_timeout: Duration,
    shared: Arc<ChannelShared>,
) {
    match http.get(open_url.clone()).send().await {
        Ok(response) if response.status() == StatusCode::OK => {
            tracing::debug!(%open_url, "push channel open");
            shared.handler.on_open();
        }
        Ok(response) => {
            let status = response.status();
            shared.fail(status.as_u16(), format!("channel open rejected: {status}"));
            return;
        }
        Err(err) => {
            shared.fail(0, format!("channel open failed: {err}"));
            return;
        }
    }

    // The poll outlives the server's hold time by a margin so a held-open
    // request is not cut off client side.
    let request_timeout = poll_timeout + Duration::from_secs(10);

    loop {
        let response = match http
            .get(poll_url.clone())
            .timeout(request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                shared.fail(0, format!("channel poll failed: {err}"));
                return;
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::GONE => {
                tracing::debug!("push channel closed by server");
                shared.close();
                return;
            }
            status => {
                shared.fail(status.as_u16(), format!("channel poll rejected: {status}"));
                return;
            }
        }

        let messages: Vec<String> = match response.json().await {
            Ok(messages) => messages,
            Err(err) => {
                shared.fail(0, format!("channel poll body unreadable: {err}"));
                return;
            }
        };

        for message in messages {
            shared.handler.on_message(message);
        }
    }
}
