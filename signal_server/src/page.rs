use crate::room::Participant;
use crate::ServerConfig;
use serde_json::json;

pub const ROOM_FULL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Room full</title>
</head>
<body>
  <div>
    Sorry, this room is full.
  </div>
</body>
</html>
"#;

/// Renders the room page. Session parameters are emitted as one
/// `var name = value;` declaration per line.
pub fn render_room_page(
    room_key: &str,
    participant: &Participant,
    config: &ServerConfig,
) -> String {
    let ice_servers: Vec<_> = config
        .stun_urls
        .iter()
        .map(|url| json!({ "urls": url }))
        .collect();
    let pc_config = json!({ "iceServers": ice_servers });
    let pc_constraints = json!({ "optional": [{ "DtlsSrtpKeyAgreement": true }] });
    let offer_constraints = json!({ "mandatory": {}, "optional": [] });
    let media_constraints = json!({ "audio": true, "video": true });

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Room {room_key}</title>
</head>
<body>
  <script type="text/javascript">
    var channelToken = '{token}';
    var me = '{user_id}';
    var roomKey = '{room_key}';
    var initiator = {initiator};
    var pcConfig = {pc_config};
    var pcConstraints = {pc_constraints};
    var offerConstraints = {offer_constraints};
    var mediaConstraints = {media_constraints};
    var turnUrl = '/turn?username={user_id}&key={room_key}';
  </script>
</body>
</html>
"#,
        token = participant.token,
        user_id = participant.user_id,
        initiator = u8::from(participant.initiator),
    )
}

/// Keeps room keys safe to embed in the page.
pub fn sanitize_room_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect()
}
