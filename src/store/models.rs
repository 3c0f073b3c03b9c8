// Identifier newtypes shared by the store, the detector, and the transport.
//
// Wrapping Telegram's raw numbers keeps a chat id from being passed where a
// user id belongs. All of them serialize as their inner value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical id of one conversation (negative for channels/supergroups).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// A Telegram user account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// A message within one conversation. Only meaningful together with the
/// chat it was posted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// Platform-native unique id of one uploaded media object. The same upload
/// keeps its id across chats and renditions, which is what makes the
/// fingerprint memo table work.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a ledger knows about one fingerprint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OccurrenceRecord {
    /// Times this fingerprint has been posted in the conversation.
    pub count: u64,
    /// Most recent message that carried it.
    pub last_message: Option<MessageId>,
}
