#[macro_use]
extern crate rocket;

mod page;
mod room;

use rocket::{
    fairing::AdHoc,
    figment::Figment,
    http::Status,
    response::{content::RawHtml, Redirect},
    serde::json::Json,
    tokio::sync::RwLock,
    Build, Either, Rocket, State,
};
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

pub use room::{Participant, Poll, PostError, RoomFull, RoomRegistry, ROOM_CAPACITY};

pub type Registry = Arc<RwLock<RoomRegistry>>;

const TURN_CREDENTIAL_TTL_SECS: u64 = 86_400;
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Read from the Rocket figment (`Rocket.toml` / `ROCKET_*`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub stun_urls: Vec<String>,
    /// Offered by `/turn`; an empty list disables the endpoint.
    pub turn_uris: Vec<String>,
    /// Upper bound for how long a channel poll is held open.
    pub poll_timeout_ms: u64,
    pub room_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_uris: vec![
                "turn:127.0.0.1:3478?transport=udp".to_string(),
                "turn:127.0.0.1:3478?transport=tcp".to_string(),
            ],
            poll_timeout_ms: 25_000,
            room_ttl_secs: 3_600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnCredentials {
    pub username: String,
    pub password: String,
    pub uris: Vec<String>,
    pub ttl: u64,
}

fn get_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[get("/?<r>")]
async fn room_page(
    r: Option<&str>,
    registry: &State<Registry>,
    config: &State<ServerConfig>,
) -> Either<Redirect, RawHtml<String>> {
    let room_key = r.map(page::sanitize_room_key).unwrap_or_default();
    if room_key.is_empty() {
        let fresh = room::new_room_key();
        log::info!("redirecting to new room {fresh}");
        return Either::Left(Redirect::to(format!("/?r={fresh}")));
    }

    let joined = registry.write().await.join(&room_key);
    match joined {
        Ok(participant) => {
            log::info!(
                "user {} joined room {} (initiator: {})",
                participant.user_id, room_key, participant.initiator
            );
            Either::Right(RawHtml(page::render_room_page(
                &room_key,
                &participant,
                config,
            )))
        }
        Err(RoomFull) => {
            log::warn!("room {room_key} is full");
            Either::Right(RawHtml(page::ROOM_FULL_PAGE.to_string()))
        }
    }
}

#[get("/turn?<username>")]
fn turn_credentials(
    username: &str,
    config: &State<ServerConfig>,
) -> Result<Json<TurnCredentials>, Status> {
    if config.turn_uris.is_empty() {
        return Err(Status::NotFound);
    }

    Ok(Json(TurnCredentials {
        username: format!("{}:{username}", get_now() + TURN_CREDENTIAL_TTL_SECS),
        password: uuid::Uuid::new_v4().simple().to_string(),
        uris: config.turn_uris.clone(),
        ttl: TURN_CREDENTIAL_TTL_SECS,
    }))
}

#[post("/message?<r>&<u>", data = "<body>")]
async fn post_message(r: &str, u: &str, body: String, registry: &State<Registry>) -> Status {
    let posted = registry.write().await.post(r, u, body);
    match posted {
        Ok(()) => Status::Ok,
        Err(err) => {
            log::warn!("rejected message from {u} in room {r}: {err:?}");
            Status::NotFound
        }
    }
}

#[get("/channel/open?<token>")]
async fn open_channel(token: &str, registry: &State<Registry>) -> Status {
    if registry.read().await.is_open(token) {
        Status::Ok
    } else {
        Status::NotFound
    }
}

/// Long poll: answers immediately when messages are queued, otherwise waits
/// up to `timeout_ms` (capped by the server config) for one to arrive.
#[get("/channel/poll?<token>&<timeout_ms>")]
async fn poll_channel(
    token: &str,
    timeout_ms: Option<u64>,
    registry: &State<Registry>,
    config: &State<ServerConfig>,
) -> Result<Json<Vec<String>>, Status> {
    let notify = match registry.write().await.take_messages(token) {
        Poll::Messages(messages) => return Ok(Json(messages)),
        Poll::Wait(notify) => notify,
        Poll::Closed => return Err(Status::Gone),
        Poll::Unknown => return Err(Status::NotFound),
    };

    let wait = Duration::from_millis(
        timeout_ms
            .unwrap_or(config.poll_timeout_ms)
            .min(config.poll_timeout_ms),
    );
    let _ = tokio::time::timeout(wait, notify.notified()).await;

    let polled = registry.write().await.take_messages(token);
    match polled {
        Poll::Messages(messages) => Ok(Json(messages)),
        Poll::Wait(_) => Ok(Json(Vec::new())),
        Poll::Closed => Err(Status::Gone),
        Poll::Unknown => Err(Status::NotFound),
    }
}

/// Builds the room server on top of `figment`, which also supplies the
/// [`ServerConfig`].
pub fn build(figment: Figment) -> Rocket<Build> {
    let registry: Registry = Arc::new(RwLock::new(RoomRegistry::default()));

    rocket::custom(figment)
        .manage(registry)
        .attach(AdHoc::config::<ServerConfig>())
        .attach(AdHoc::on_liftoff("Room sweeper", |rocket| {
            Box::pin(async move {
                let (Some(registry), Some(config)) =
                    (rocket.state::<Registry>(), rocket.state::<ServerConfig>())
                else {
                    return;
                };
                let registry = registry.clone();
                let ttl = Duration::from_secs(config.room_ttl_secs);

                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(SWEEP_INTERVAL).await;
                        let removed = registry.write().await.sweep(Instant::now(), ttl);
                        if removed > 0 {
                            log::info!("swept {removed} idle rooms");
                        }
                    }
                });
            })
        }))
        .mount(
            "/",
            routes![
                room_page,
                turn_credentials,
                post_message,
                open_channel,
                poll_channel
            ],
        )
}
