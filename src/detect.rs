// Repost detection — the per-event state machine.
//
// An inbound image event either stays silent (unmonitored chat, exempt
// sender, first occurrence) or produces a reply pointing at the previous
// occurrence. Hashing never happens under the per-chat lock: the ledger is
// locked once to consult the memo table, released while the bytes are
// fetched and hashed, then locked again for the read-decide-write sequence
// as one critical section. The count is re-read inside that second
// section, so racing duplicates of a brand-new image still count exactly
// once each and every event past the first gets a reply.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::hash;
use crate::store::{ChatId, ConversationRegistry, MediaId, MessageId, UserId};

/// Repost count at which the notice escalates to the coronation wording.
pub const DEFAULT_THRESHOLD: u64 = 10;

/// One "image posted" event, resolved by the transport.
#[derive(Clone, Debug)]
pub struct ImageEvent {
    pub chat: ChatId,
    pub sender: UserId,
    pub media: MediaId,
    pub message: MessageId,
}

/// The outgoing annotation: a reply to the triggering message carrying
/// link-bearing HTML text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub reply_to: MessageId,
    pub text: String,
}

pub struct RepostDetector {
    registry: Arc<ConversationRegistry>,
    threshold: u64,
}

impl RepostDetector {
    pub fn new(registry: Arc<ConversationRegistry>, threshold: u64) -> Self {
        Self {
            registry,
            threshold,
        }
    }

    /// Process one image event.
    ///
    /// `permalink` renders a message id in this chat as a URL for the reply
    /// text. `load` fetches the image bytes and is awaited only when the
    /// media id has never been hashed before. A loader or decode failure
    /// abandons the event with no ledger mutation.
    pub async fn process<L, F, Fut>(
        &self,
        event: &ImageEvent,
        permalink: L,
        load: F,
    ) -> Result<Option<Reply>>
    where
        L: Fn(MessageId) -> String,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let Some(handle) = self.registry.get(event.chat).await else {
            return Ok(None);
        };

        // Fast path: a memoized media id resolves entirely under one lock
        // hold, with no download and no hashing.
        {
            let mut ledger = handle.lock().await;
            if ledger.is_exempt(event.sender) {
                debug!(sender = %event.sender, "Exempt sender, skipping");
                return Ok(None);
            }
            if ledger.knows_media(&event.media) {
                let fingerprint = ledger.fingerprint_of(&event.media)?;
                let count = ledger.occurrence_count(&fingerprint);
                let prior = ledger.last_message_for(&fingerprint)?;
                ledger.record_media(event.media.clone(), fingerprint);
                ledger.set_last_message(fingerprint, event.message);
                debug!(media = %event.media, count, "Memoized media reposted");
                return Ok(Some(Reply {
                    reply_to: event.message,
                    text: repost_notice(&permalink(prior), count, self.threshold),
                }));
            }
        }

        // New media object: fetch and hash with no lock held.
        let bytes = load().await?;
        let fingerprint = hash::dhash(&bytes)?;

        // Second critical section. The count is read afresh here, so an
        // event that raced us to the same fingerprint is already visible.
        let mut ledger = handle.lock().await;
        let count = ledger.occurrence_count(&fingerprint);
        let prior = if count > 0 {
            Some(ledger.last_message_for(&fingerprint)?)
        } else {
            None
        };
        ledger.record_media(event.media.clone(), fingerprint);
        ledger.set_last_message(fingerprint, event.message);

        match prior {
            // Baseline occurrence: recorded silently.
            None => Ok(None),
            Some(prior) => Ok(Some(Reply {
                reply_to: event.message,
                text: repost_notice(&permalink(prior), count, self.threshold),
            })),
        }
    }
}

/// Render the repost notice for a prior-occurrence link and the count as it
/// stood before this event. Three distinct ranges: informational below the
/// threshold, the coronation at it, and the past-threshold groan above it.
pub fn repost_notice(link: &str, count: u64, threshold: u64) -> String {
    if count > threshold {
        format!(
            "Spare us, Repost King: this image is <a href=\"{link}\">{count} reposts</a> deep already!"
        )
    } else if count == threshold {
        format!(
            "This image just hit <a href=\"{link}\">repost number {count}</a>, and you are hereby crowned the Repost King!"
        )
    } else {
        let times = if count == 1 {
            "once".to_string()
        } else {
            format!("{count} times")
        };
        format!("This image has already been <a href=\"{link}\">reposted {times}</a>!")
    }
}
