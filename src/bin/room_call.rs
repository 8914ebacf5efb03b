use anyhow::Result as AResult;
use clap::Parser;
use room_signaling::{
    forward_ice_candidates, new_peer_connection, ChannelEvent, ClientConfig, SignalingClient,
    SignalingMessage,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use webrtc::api::APIBuilder;
use webrtc::peer_connection::RTCPeerConnection;

/// Join a room on the relay server and negotiate a peer connection with
/// whoever else is in it. Lines typed on stdin are sent as raw messages.
#[derive(Parser, Debug)]
#[command(name = "room-call", version)]
struct Cli {
    /// Room URL, e.g. `http://127.0.0.1:8000/?r=demo`. Without `r` the
    /// server picks a fresh room.
    #[arg(env = "ROOM_CALL_URL")]
    room_url: String,

    /// Send an offer when this client is the initiator.
    #[arg(long)]
    offer: bool,

    /// Raw message to send right after joining. May be repeated.
    #[arg(long = "send", value_name = "MESSAGE")]
    send: Vec<String>,
}

#[tokio::main]
async fn main() -> AResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (sx, mut events) = unbounded_channel();
    let client = SignalingClient::builder()
        .with_config(ClientConfig::from_env())
        .with_message_handler(Arc::new(sx))
        .build()?;

    let params = client.connect_to_room(&cli.room_url).await?;
    info!(
        room = %params.room_key,
        url = %format!("{}?r={}", params.base_url, params.room_key),
        initiator = params.initiator,
        "share the room URL with the other participant"
    );

    let api = APIBuilder::new().build();
    let connection = Arc::new(new_peer_connection(&api, &params).await?);
    let data_channel = connection
        .create_data_channel(&format!("data_channel_{}", Uuid::new_v4()), None)
        .await?;
    data_channel.on_open(Box::new(|| {
        info!("data channel open");
        Box::pin(async {})
    }));
    connection.on_peer_connection_state_change(Box::new(|state| {
        info!(%state, "peer connection state changed");
        Box::pin(async {})
    }));
    forward_ice_candidates(&connection, client.clone());

    if cli.offer && params.initiator {
        let offer = connection.create_offer(None).await?;
        connection.set_local_description(offer.clone()).await?;
        client.send_message(SignalingMessage::from_session_description(&offer)?.to_json()?);
    }

    for message in cli.send {
        client.send_message(message);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Open) => info!("push channel open"),
                Some(ChannelEvent::Message(raw)) => {
                    match handle_message(&client, &connection, &raw).await {
                        Ok(true) => {}
                        Ok(false) => {
                            info!("other participant left");
                            break;
                        }
                        Err(err) => {
                            error!(error = %err, "failed to apply message");
                            break;
                        }
                    }
                }
                Some(ChannelEvent::Error { code, description }) => {
                    error!(code, %description, "push channel failed");
                    break;
                }
                Some(ChannelEvent::Close) | None => break,
            },
            line = stdin.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => client.send_message(line),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await?;
    connection.close().await?;
    Ok(())
}

/// Applies one message from the other participant. Returns `false` on `bye`.
async fn handle_message(
    client: &SignalingClient,
    connection: &RTCPeerConnection,
    raw: &str,
) -> AResult<bool> {
    let message = match SignalingMessage::from_json(raw) {
        Ok(message) => message,
        Err(_) => {
            info!(message = %raw, "received");
            return Ok(true);
        }
    };

    match &message {
        SignalingMessage::Offer { .. } => {
            if let Some(offer) = message.to_session_description()? {
                connection.set_remote_description(offer).await?;
                let answer = connection.create_answer(None).await?;
                connection.set_local_description(answer.clone()).await?;
                let answer = SignalingMessage::from_session_description(&answer)?;
                client.send_message(answer.to_json()?);
            }
        }
        SignalingMessage::Answer { .. } => {
            if let Some(answer) = message.to_session_description()? {
                connection.set_remote_description(answer).await?;
            }
        }
        SignalingMessage::Candidate { .. } => match message.to_candidate() {
            Some(candidate) => connection.add_ice_candidate(candidate).await?,
            None => warn!("candidate message without candidate"),
        },
        SignalingMessage::Bye => return Ok(false),
    }

    Ok(true)
}
