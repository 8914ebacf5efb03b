mod channel;
mod config;
mod constraints;
mod error;
mod ice;
mod message;
mod parameters;
mod peer;
mod room_page;
mod signaling_client;
mod turn;

pub use channel::{ChannelEvent, MessageHandler, PushChannel};
pub use config::ClientConfig;
pub use constraints::{av_constraints, KeyValuePair, MediaConstraints};
pub use error::{SResult, SignalingError};
pub use ice::{has_turn_server, ice_servers_from_pc_config, IceServer, TurnServerResponse};
pub use message::SignalingMessage;
pub use parameters::SignalingParameters;
pub use peer::{forward_ice_candidates, new_peer_connection, rtc_configuration};
pub use room_page::{is_room_full, var_value, RoomPage};
pub use signaling_client::{IceServersObserver, SignalingClient, SignalingClientBuilder};
pub use turn::request_turn_server;
