use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

pub const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub token: String,
    pub initiator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomFull;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostError {
    UnknownRoom,
    UnknownUser,
}

#[derive(Debug)]
pub enum Poll {
    Messages(Vec<String>),
    /// Nothing queued; wait on the handle and poll again.
    Wait(Arc<Notify>),
    Closed,
    Unknown,
}

#[derive(Debug)]
struct Room {
    participants: Vec<Participant>,
    // Messages posted while the sender was alone, for whoever joins next.
    pending: Vec<String>,
    last_activity: Instant,
}

#[derive(Debug, Default)]
struct Mailbox {
    room_key: String,
    messages: VecDeque<String>,
    notify: Arc<Notify>,
    closed: bool,
    closed_at: Option<Instant>,
}

impl Mailbox {
    fn push(&mut self, message: String) {
        if !self.closed {
            self.messages.push_back(message);
            self.notify.notify_one();
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.closed_at = Some(Instant::now());
        self.notify.notify_one();
    }
}

/// Rooms and the push-channel mailbox of every participant, keyed by channel
/// token.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    mailboxes: HashMap<String, Mailbox>,
}

impl RoomRegistry {
    /// Adds a participant to `room_key`, creating the room on first use.
    /// The second participant is the initiator.
    pub fn join(&mut self, room_key: &str) -> Result<Participant, RoomFull> {
        let room = self.rooms.entry(room_key.to_string()).or_insert_with(|| Room {
            participants: Vec::new(),
            pending: Vec::new(),
            last_activity: Instant::now(),
        });

        if room.participants.len() >= ROOM_CAPACITY {
            return Err(RoomFull);
        }

        let participant = Participant {
            user_id: new_user_id(),
            token: Uuid::new_v4().to_string(),
            initiator: !room.participants.is_empty(),
        };

        let mailbox = Mailbox {
            room_key: room_key.to_string(),
            messages: room.pending.drain(..).collect(),
            ..Default::default()
        };
        self.mailboxes.insert(participant.token.clone(), mailbox);

        room.participants.push(participant.clone());
        room.last_activity = Instant::now();

        Ok(participant)
    }

    /// Relays `message` from `user_id` to the other participant of the room.
    /// A `bye` also removes the sender from the room and closes its channel.
    pub fn post(
        &mut self,
        room_key: &str,
        user_id: &str,
        message: String,
    ) -> Result<(), PostError> {
        let room = self.rooms.get_mut(room_key).ok_or(PostError::UnknownRoom)?;
        let sender = room
            .participants
            .iter()
            .position(|participant| participant.user_id == user_id)
            .ok_or(PostError::UnknownUser)?;
        room.last_activity = Instant::now();

        let is_bye = is_bye(&message);
        let recipient = room
            .participants
            .iter()
            .find(|participant| participant.user_id != user_id)
            .map(|participant| participant.token.clone());

        match recipient {
            Some(token) => {
                if let Some(mailbox) = self.mailboxes.get_mut(&token) {
                    mailbox.push(message);
                }
            }
            None if !is_bye => room.pending.push(message),
            None => {}
        }

        if is_bye {
            let leaving = room.participants.remove(sender);
            if let Some(mailbox) = self.mailboxes.get_mut(&leaving.token) {
                mailbox.close();
            }
            if room.participants.is_empty() {
                self.rooms.remove(room_key);
            }
        }

        Ok(())
    }

    pub fn is_open(&self, token: &str) -> bool {
        self.mailboxes
            .get(token)
            .is_some_and(|mailbox| !mailbox.closed)
    }

    /// Takes everything queued for `token`. Queued messages are handed out
    /// before a closed mailbox reports `Closed`; after that it is forgotten.
    /// Polling counts as activity for the room.
    pub fn take_messages(&mut self, token: &str) -> Poll {
        let Some(mailbox) = self.mailboxes.get_mut(token) else {
            return Poll::Unknown;
        };
        if let Some(room) = self.rooms.get_mut(&mailbox.room_key) {
            room.last_activity = Instant::now();
        }

        if !mailbox.messages.is_empty() {
            return Poll::Messages(mailbox.messages.drain(..).collect());
        }

        if mailbox.closed {
            self.mailboxes.remove(token);
            return Poll::Closed;
        }

        Poll::Wait(mailbox.notify.clone())
    }

    /// Drops rooms idle for longer than `ttl` together with their mailboxes,
    /// and mailboxes closed for longer than `ttl` that were never polled to
    /// the end. Returns how many rooms were removed.
    pub fn sweep(&mut self, now: Instant, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, room)| now.saturating_duration_since(room.last_activity) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(room) = self.rooms.remove(key) {
                for participant in room.participants {
                    self.mailboxes.remove(&participant.token);
                }
            }
        }

        let rooms = &self.rooms;
        self.mailboxes.retain(|_, mailbox| match mailbox.closed_at {
            Some(closed_at) => now.saturating_duration_since(closed_at) < ttl,
            None => rooms.contains_key(&mailbox.room_key),
        });

        expired.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn mailbox_count(&self) -> usize {
        self.mailboxes.len()
    }
}

pub fn new_room_key() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn new_user_id() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    format!("{:08}", value % 100_000_000)
}

fn is_bye(message: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(message)
        .ok()
        .and_then(|value| {
            value
                .get("type")
                .and_then(|kind| kind.as_str())
                .map(|kind| kind == "bye")
        })
        .unwrap_or(false)
}
