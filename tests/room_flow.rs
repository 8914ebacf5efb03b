use anyhow::{anyhow, Result as AResult};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::{Build, Rocket};
use room_signaling::{
    ChannelEvent, ClientConfig, IceServer, IceServersObserver, SignalingClient, SignalingError,
    SignalingMessage,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{sleep, timeout};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Launches the room server on a free loopback port and returns its base URL.
async fn spawn_server() -> AResult<String> {
    spawn_with(signal_server::build).await
}

/// Launches whatever `build` makes of the test figment.
async fn spawn_with(build: impl FnOnce(Figment) -> Rocket<Build>) -> AResult<String> {
    let port = std::net::TcpListener::bind("127.0.0.1:0")?
        .local_addr()?
        .port();

    let figment = rocket::Config::figment()
        .merge(("address", "127.0.0.1"))
        .merge(("port", port))
        .merge(("log_level", "off"))
        .merge(("shutdown.ctrlc", false))
        .merge(("poll_timeout_ms", 200));
    tokio::spawn(build(figment).launch());

    for _ in 0..200 {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(format!("http://127.0.0.1:{port}/"));
        }
        sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!("room server did not come up on port {port}"))
}

const STUB_ROOM_PAGE: &str = r#"<html>
  <script type="text/javascript">
    var channelToken = 'stub-token';
    var me = '1';
    var roomKey = 'stub';
    var initiator = 0;
    var pcConfig = {"iceServers": [{"urls": "turn:127.0.0.1:3478", "username": "u", "credential": "c"}]};
    var pcConstraints = {};
    var mediaConstraints = {"audio": true, "video": true};
    var turnUrl = '/turn';
  </script>
</html>
"#;

#[rocket::get("/")]
fn stub_room_page() -> RawHtml<&'static str> {
    RawHtml(STUB_ROOM_PAGE)
}

#[rocket::get("/channel/open")]
fn stub_channel_open() -> Status {
    Status::Ok
}

/// A server that hands out a room page and opens channels, but answers every
/// message POST and channel poll with 404.
async fn spawn_rejecting_server() -> AResult<String> {
    spawn_with(|figment| {
        rocket::custom(figment).mount("/", rocket::routes![stub_room_page, stub_channel_open])
    })
    .await
}

#[derive(Default)]
struct RecordingObserver(Mutex<Vec<IceServer>>);

impl IceServersObserver for RecordingObserver {
    fn on_ice_servers(&self, ice_servers: Vec<IceServer>) {
        *self.0.lock().unwrap() = ice_servers;
    }
}

fn client_config() -> ClientConfig {
    ClientConfig {
        poll_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

fn new_client() -> AResult<(SignalingClient, UnboundedReceiver<ChannelEvent>)> {
    let (sx, rx) = unbounded_channel();
    let client = SignalingClient::builder()
        .with_config(client_config())
        .with_message_handler(Arc::new(sx))
        .build()?;
    Ok((client, rx))
}

async fn next_event(rx: &mut UnboundedReceiver<ChannelEvent>) -> AResult<ChannelEvent> {
    timeout(EVENT_TIMEOUT, rx.recv())
        .await?
        .ok_or_else(|| anyhow!("message handler dropped"))
}

/// Waits a little, then returns every event delivered meanwhile.
async fn drain_events(rx: &mut UnboundedReceiver<ChannelEvent>) -> Vec<ChannelEvent> {
    sleep(QUIET_PERIOD).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_clients_exchange_messages() -> AResult<()> {
    let base = spawn_server().await?;

    let observer = Arc::new(RecordingObserver::default());
    let (sx, mut first_events) = unbounded_channel();
    let first = SignalingClient::builder()
        .with_config(client_config())
        .with_message_handler(Arc::new(sx))
        .with_ice_servers_observer(observer.clone())
        .build()?;

    // No room in the URL: the server redirects to a fresh one.
    let first_params = first.connect_to_room(&base).await?;
    assert!(!first_params.initiator);
    assert!(first_params.post_message_url.as_str().starts_with(&base));
    assert_eq!(next_event(&mut first_events).await?, ChannelEvent::Open);

    // The page only offers STUN, so a TURN server was fetched and appended.
    let observed = observer.0.lock().unwrap().clone();
    assert_eq!(observed, first_params.ice_servers);
    assert_eq!(observed.len(), 2);
    assert!(observed[1].is_turn());
    assert!(!observed[1].credential.is_empty());

    let (second, mut second_events) = new_client()?;
    let second_params = second
        .connect_to_room(&format!("{base}?r={}", first_params.room_key))
        .await?;
    assert!(second_params.initiator);
    assert_eq!(second_params.room_key, first_params.room_key);
    assert_eq!(next_event(&mut second_events).await?, ChannelEvent::Open);

    let offer = SignalingMessage::Offer {
        sdp: "v=0\r\n".to_string(),
    };
    second.send_message(offer.to_json()?);
    second.flush().await?;
    assert!(second.pending_messages()?.is_empty());

    match next_event(&mut first_events).await? {
        ChannelEvent::Message(raw) => assert_eq!(SignalingMessage::from_json(&raw)?, offer),
        other => panic!("expected the offer, got {other:?}"),
    }

    let answer = SignalingMessage::Answer {
        sdp: "v=0\r\n".to_string(),
    };
    first.send_message(answer.to_json()?);
    first.flush().await?;

    match next_event(&mut second_events).await? {
        ChannelEvent::Message(raw) => assert_eq!(SignalingMessage::from_json(&raw)?, answer),
        other => panic!("expected the answer, got {other:?}"),
    }

    second.disconnect().await?;
    assert!(!second.is_connected()?);
    assert_eq!(next_event(&mut second_events).await?, ChannelEvent::Close);

    match next_event(&mut first_events).await? {
        ChannelEvent::Message(raw) => {
            assert_eq!(SignalingMessage::from_json(&raw)?, SignalingMessage::Bye)
        }
        other => panic!("expected bye, got {other:?}"),
    }

    first.disconnect().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_messages_queued_before_join_are_delivered() -> AResult<()> {
    let base = spawn_server().await?;
    let room_url = format!("{base}?r=queued");

    let (early, _early_events) = new_client()?;
    early.send_message("hello before joining");
    assert_eq!(early.pending_messages()?, vec!["hello before joining"]);

    early.connect_to_room(&room_url).await?;
    assert!(early.pending_messages()?.is_empty());

    let (late, mut late_events) = new_client()?;
    late.connect_to_room(&room_url).await?;

    assert_eq!(next_event(&mut late_events).await?, ChannelEvent::Open);
    assert_eq!(
        next_event(&mut late_events).await?,
        ChannelEvent::Message("hello before joining".to_string())
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_third_client_finds_room_full() -> AResult<()> {
    let base = spawn_server().await?;
    let room_url = format!("{base}?r=crowded");

    let (first, _first_events) = new_client()?;
    let (second, _second_events) = new_client()?;
    let (third, _third_events) = new_client()?;

    first.connect_to_room(&room_url).await?;
    second.connect_to_room(&room_url).await?;

    let err = third.connect_to_room(&room_url).await.unwrap_err();
    assert!(matches!(err, SignalingError::RoomFull), "got {err:?}");
    assert!(!third.is_connected()?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unexpected_status_is_fatal() -> AResult<()> {
    let base = spawn_server().await?;
    let (client, _events) = new_client()?;

    let err = client
        .connect_to_room(&format!("{base}no/such/page"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, SignalingError::UnexpectedStatus { status: 404, .. }),
        "got {err:?}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_redirect_limit() -> AResult<()> {
    let base = spawn_server().await?;
    let client = SignalingClient::builder()
        .with_config(ClientConfig {
            max_redirects: 0,
            ..client_config()
        })
        .build()?;

    let err = client.connect_to_room(&base).await.unwrap_err();
    assert!(
        matches!(err, SignalingError::TooManyRedirects(0)),
        "got {err:?}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_close_then_failed_disconnect() -> AResult<()> {
    let base = spawn_server().await?;
    let (client, mut events) = new_client()?;

    let params = client.connect_to_room(&format!("{base}?r=first")).await?;
    assert_eq!(next_event(&mut events).await?, ChannelEvent::Open);

    // Leave behind the client's back: the server closes its channel.
    let status = reqwest::Client::new()
        .post(params.post_message_url.clone())
        .body(SignalingMessage::Bye.to_json()?)
        .send()
        .await?
        .status();
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(next_event(&mut events).await?, ChannelEvent::Close);

    client.send_message("hello first room");
    let err = client.disconnect().await.unwrap_err();
    assert!(
        matches!(err, SignalingError::UnexpectedStatus { status: 404, .. }),
        "got {err:?}"
    );
    assert!(!client.is_connected()?);
    assert!(client.pending_messages()?.is_empty());

    // Closing the already closed channel does not report a second close.
    let late = drain_events(&mut events).await;
    assert!(!late.contains(&ChannelEvent::Close), "got {late:?}");

    // Nothing from the first room follows the client into the next one.
    let room_url = format!("{base}?r=second");
    client.connect_to_room(&room_url).await?;
    assert_eq!(next_event(&mut events).await?, ChannelEvent::Open);

    let (peer, mut peer_events) = new_client()?;
    peer.connect_to_room(&room_url).await?;
    assert_eq!(next_event(&mut peer_events).await?, ChannelEvent::Open);

    client.send_message("hello second room");
    client.flush().await?;
    assert_eq!(
        next_event(&mut peer_events).await?,
        ChannelEvent::Message("hello second room".to_string())
    );
    assert!(client.is_connected()?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_turn_rejection_is_fatal() -> AResult<()> {
    let base = spawn_with(|figment| {
        signal_server::build(figment.merge(("turn_uris", Vec::<String>::new())))
    })
    .await?;
    let (client, _events) = new_client()?;

    let err = client
        .connect_to_room(&format!("{base}?r=noturn"))
        .await
        .unwrap_err();
    match err {
        SignalingError::UnexpectedStatus { status, url } => {
            assert_eq!(status, 404);
            assert!(url.contains("/turn?"), "{url}");
        }
        other => panic!("expected a TURN status error, got {other:?}"),
    }
    assert!(!client.is_connected()?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_channel_poll_is_an_error() -> AResult<()> {
    let base = spawn_rejecting_server().await?;
    let (client, mut events) = new_client()?;

    client.connect_to_room(&format!("{base}?r=stub")).await?;
    assert_eq!(next_event(&mut events).await?, ChannelEvent::Open);
    match next_event(&mut events).await? {
        ChannelEvent::Error { code, description } => {
            assert_eq!(code, 404);
            assert!(description.contains("poll"), "{description}");
        }
        other => panic!("expected a channel error, got {other:?}"),
    }

    assert!(client.disconnect().await.is_err());
    let late = drain_events(&mut events).await;
    assert!(!late.contains(&ChannelEvent::Close), "got {late:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_succeeds_when_queued_messages_are_rejected() -> AResult<()> {
    let base = spawn_rejecting_server().await?;
    let (client, mut events) = new_client()?;

    client.send_message("early");
    let params = client.connect_to_room(&format!("{base}?r=stub")).await?;
    assert_eq!(params.room_key, "stub");
    assert!(client.is_connected()?);
    assert_eq!(client.pending_messages()?, vec!["early"]);

    // The push channel and the queue fail independently; the queue's error
    // names the message URL.
    let is_queue_error = |event: &ChannelEvent| match event {
        ChannelEvent::Error { description, .. } => description.contains("/message?"),
        _ => false,
    };
    let mut seen = Vec::new();
    while !seen.iter().any(is_queue_error) {
        seen.push(next_event(&mut events).await?);
    }
    assert!(seen.iter().all(|event| match event {
        ChannelEvent::Error { code, .. } => *code == 404,
        other => *other == ChannelEvent::Open,
    }));
    Ok(())
}
