// State layer — per-chat repost ledgers, the registry that owns them, and
// the snapshot codec. The registry is the unit of durability: loaded once
// at startup, written whole by the saver.

pub mod codec;
pub mod ledger;
pub mod models;
pub mod registry;

pub use ledger::RepostLedger;
pub use models::{ChatId, MediaId, MessageId, OccurrenceRecord, UserId};
pub use registry::{AdminOutcome, ConversationRegistry};
