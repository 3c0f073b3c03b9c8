// Core error taxonomy — typed failures from the hash and store layers.
//
// The orchestration layers (bot loop, CLI) wrap these in anyhow and attach
// context; transport failures stay in anyhow and never enter these types.

use std::path::PathBuf;

use thiserror::Error;

use crate::hash::Fingerprint;
use crate::store::{ChatId, MediaId, UserId};

/// Convenience alias for core-layer results.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The payload could not be decoded as an image. The triggering event
    /// is abandoned with no ledger mutation.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// A media id the ledger has never memoized.
    #[error("media id {0} has no recorded fingerprint")]
    UnknownMedia(MediaId),

    /// A fingerprint with no recorded occurrence message.
    #[error("fingerprint {0} has no recorded message in this conversation")]
    UnknownFingerprint(Fingerprint),

    /// Removal of an exemption that was never granted.
    #[error("user {0} is not on the exemption list")]
    NotExempt(UserId),

    /// A per-conversation operation against a chat that is not monitored.
    #[error("chat {0} is not monitored")]
    NotMonitored(ChatId),

    /// Reading or writing the snapshot file failed.
    #[error("state file {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file exists but does not decode. Never silently
    /// discarded: startup refuses to continue over a half-readable file.
    #[error("state file {path} is malformed: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// Text that is not a 16-character hex fingerprint.
    #[error("{0:?} is not a 16-character hex fingerprint")]
    MalformedFingerprint(String),
}
