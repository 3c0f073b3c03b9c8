// Serde types for the slice of the Telegram Bot API this bot consumes.
//
// Hand-rolled rather than pulled from a bot framework: the bot calls six
// methods and reads about a dozen fields, and the wire format is plain
// JSON. Unknown fields are ignored on deserialization.

use serde::Deserialize;

use crate::store::{ChatId, MessageId, UserId};

/// Envelope every Bot API response arrives in.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// One long-polling update.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// An incoming message, reduced to the fields the bot reads.
#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
}

/// One rendition of a posted photo.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    /// Stable identifier of the uploaded object itself, shared by every
    /// rendition and constant across chats. This is the memoization key.
    pub file_unique_id: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

/// getFile result. `file_path` keys the download URL.
#[derive(Debug, Deserialize)]
pub struct File {
    pub file_path: Option<String>,
}

/// getChatMember result, reduced to the member's role.
#[derive(Debug, Deserialize)]
pub struct ChatMember {
    pub status: String,
}

impl ChatMember {
    /// Creator or administrator: the roles allowed to flip monitoring.
    pub fn is_admin(&self) -> bool {
        matches!(self.status.as_str(), "creator" | "administrator")
    }
}

/// Offset between a raw channel id and its bot-style chat id.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// A chat peer, classified once at the transport boundary.
///
/// Everything past this point works on `ChatId`s; the raw channel id only
/// resurfaces to build t.me permalinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerRef {
    /// A direct conversation with one user.
    User(UserId),
    /// A supergroup or broadcast channel, by its raw (positive) id.
    Channel(i64),
}

impl PeerRef {
    /// Classify a Bot API chat. Basic groups and unrecognized kinds yield
    /// None and their messages are ignored: no permalink form exists for
    /// them, and monitoring requires a supergroup anyway.
    pub fn from_chat(chat: &Chat) -> Option<PeerRef> {
        match chat.kind.as_str() {
            "private" => Some(PeerRef::User(UserId(chat.id))),
            "supergroup" | "channel" => Some(PeerRef::Channel(-chat.id - CHANNEL_ID_OFFSET)),
            _ => None,
        }
    }

    /// The id the registry and the state file key on.
    pub fn conversation_id(&self) -> ChatId {
        match *self {
            PeerRef::User(UserId(id)) => ChatId(id),
            PeerRef::Channel(raw) => ChatId(-(CHANNEL_ID_OFFSET + raw)),
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, PeerRef::Channel(_))
    }

    /// Permalink to a message in this chat, in the t.me/c/ form.
    pub fn permalink(&self, message: MessageId) -> String {
        let raw = match *self {
            PeerRef::Channel(raw) => raw,
            // Monitoring never gets enabled in a private chat, so this arm
            // is only reachable from tooling; the user id stands in.
            PeerRef::User(UserId(id)) => id,
        };
        format!("https://t.me/c/{raw}/{}", message.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: i64, kind: &str) -> Chat {
        Chat {
            id,
            kind: kind.to_string(),
        }
    }

    #[test]
    fn supergroup_ids_round_trip_through_the_raw_form() {
        let peer = PeerRef::from_chat(&chat(-1001234567890, "supergroup")).unwrap();
        assert_eq!(peer, PeerRef::Channel(1234567890));
        assert_eq!(peer.conversation_id(), ChatId(-1001234567890));
    }

    #[test]
    fn private_chats_map_to_the_user_id() {
        let peer = PeerRef::from_chat(&chat(42, "private")).unwrap();
        assert_eq!(peer, PeerRef::User(UserId(42)));
        assert_eq!(peer.conversation_id(), ChatId(42));
        assert!(!peer.is_channel());
    }

    #[test]
    fn basic_groups_are_unsupported() {
        assert!(PeerRef::from_chat(&chat(-4567, "group")).is_none());
        assert!(PeerRef::from_chat(&chat(1, "something_new")).is_none());
    }

    #[test]
    fn permalinks_use_the_raw_channel_id() {
        let peer = PeerRef::Channel(1234567890);
        assert_eq!(
            peer.permalink(MessageId(77)),
            "https://t.me/c/1234567890/77"
        );
    }

    #[test]
    fn update_payload_decodes() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 900001,
                "message": {
                    "message_id": 12,
                    "from": {"id": 5, "is_bot": false, "first_name": "A", "username": "alice"},
                    "chat": {"id": -1001234567890, "type": "supergroup", "title": "pics"},
                    "date": 1700000000,
                    "photo": [
                        {"file_id": "small", "file_unique_id": "uq1", "width": 90, "height": 60, "file_size": 1200},
                        {"file_id": "big", "file_unique_id": "uq1", "width": 900, "height": 600}
                    ]
                }
            }"#,
        )
        .unwrap();

        let message = update.message.unwrap();
        assert_eq!(message.message_id, 12);
        assert_eq!(message.from.unwrap().id, 5);
        assert_eq!(message.photo.unwrap().len(), 2);
        assert!(message.text.is_none());
    }
}
