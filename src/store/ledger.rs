// RepostLedger — everything one monitored conversation remembers.
//
// Three pieces of state: the media-id -> fingerprint memo (so the same
// uploaded object is never downloaded or hashed twice), the per-fingerprint
// occurrence records, and the exemption set. The registry serializes
// mutation by handing each ledger out behind its own mutex; the ledger
// itself is plain data with no locking of its own.

use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::hash::Fingerprint;

use super::models::{MediaId, MessageId, OccurrenceRecord, UserId};

#[derive(Clone, Debug, Default)]
pub struct RepostLedger {
    pub(crate) media_fingerprints: HashMap<MediaId, Fingerprint>,
    pub(crate) occurrences: HashMap<Fingerprint, OccurrenceRecord>,
    pub(crate) exempt_senders: HashSet<UserId>,
}

impl RepostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this exact media object has been recorded here before.
    pub fn knows_media(&self, id: &MediaId) -> bool {
        self.media_fingerprints.contains_key(id)
    }

    /// The memoized fingerprint of a media object.
    pub fn fingerprint_of(&self, id: &MediaId) -> Result<Fingerprint, Error> {
        self.media_fingerprints
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownMedia(id.clone()))
    }

    /// Record one occurrence: memoize the media -> fingerprint mapping and
    /// bump the fingerprint's count. Callers route each observed message
    /// through here exactly once; a second call for the same message would
    /// double-count, and that is the caller's bug to avoid.
    pub fn record_media(&mut self, id: MediaId, fingerprint: Fingerprint) {
        self.media_fingerprints.insert(id, fingerprint);
        self.occurrences.entry(fingerprint).or_default().count += 1;
    }

    /// Times this fingerprint has been seen here. Zero when never seen.
    pub fn occurrence_count(&self, fingerprint: &Fingerprint) -> u64 {
        self.occurrences
            .get(fingerprint)
            .map(|record| record.count)
            .unwrap_or(0)
    }

    /// The most recent message that carried this fingerprint.
    pub fn last_message_for(&self, fingerprint: &Fingerprint) -> Result<MessageId, Error> {
        self.occurrences
            .get(fingerprint)
            .and_then(|record| record.last_message)
            .ok_or(Error::UnknownFingerprint(*fingerprint))
    }

    /// Point the fingerprint's most-recent-occurrence marker at a message.
    pub fn set_last_message(&mut self, fingerprint: Fingerprint, message: MessageId) {
        self.occurrences.entry(fingerprint).or_default().last_message = Some(message);
    }

    /// Exempt a sender from repost checks. Returns false when they already
    /// were.
    pub fn add_exempt(&mut self, sender: UserId) -> bool {
        self.exempt_senders.insert(sender)
    }

    /// Withdraw a sender's exemption. `Error::NotExempt` when they never
    /// had one.
    pub fn remove_exempt(&mut self, sender: UserId) -> Result<(), Error> {
        if self.exempt_senders.remove(&sender) {
            Ok(())
        } else {
            Err(Error::NotExempt(sender))
        }
    }

    pub fn is_exempt(&self, sender: UserId) -> bool {
        self.exempt_senders.contains(&sender)
    }

    pub fn media_count(&self) -> usize {
        self.media_fingerprints.len()
    }

    pub fn fingerprint_count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn exempt_count(&self) -> usize {
        self.exempt_senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 8])
    }

    #[test]
    fn counts_start_at_zero_and_accumulate() {
        let mut ledger = RepostLedger::new();
        assert_eq!(ledger.occurrence_count(&fp(1)), 0);

        ledger.record_media(MediaId::new("a"), fp(1));
        assert_eq!(ledger.occurrence_count(&fp(1)), 1);

        // A different upload of the same image lands on the same count.
        ledger.record_media(MediaId::new("b"), fp(1));
        assert_eq!(ledger.occurrence_count(&fp(1)), 2);
        assert_eq!(ledger.media_count(), 2);
        assert_eq!(ledger.fingerprint_count(), 1);
    }

    #[test]
    fn memoizes_media_fingerprints() {
        let mut ledger = RepostLedger::new();
        assert!(!ledger.knows_media(&MediaId::new("a")));
        assert!(ledger.fingerprint_of(&MediaId::new("a")).is_err());

        ledger.record_media(MediaId::new("a"), fp(7));
        assert!(ledger.knows_media(&MediaId::new("a")));
        assert_eq!(ledger.fingerprint_of(&MediaId::new("a")).unwrap(), fp(7));
    }

    #[test]
    fn last_message_requires_a_prior_set() {
        let mut ledger = RepostLedger::new();
        ledger.record_media(MediaId::new("a"), fp(3));
        assert!(matches!(
            ledger.last_message_for(&fp(3)),
            Err(Error::UnknownFingerprint(_))
        ));

        ledger.set_last_message(fp(3), MessageId(42));
        assert_eq!(ledger.last_message_for(&fp(3)).unwrap(), MessageId(42));

        ledger.set_last_message(fp(3), MessageId(99));
        assert_eq!(ledger.last_message_for(&fp(3)).unwrap(), MessageId(99));
    }

    #[test]
    fn set_last_message_tolerates_unseen_fingerprints() {
        // Loading a hand-edited state file can produce a pointer without a
        // count; the record materializes with count zero.
        let mut ledger = RepostLedger::new();
        ledger.set_last_message(fp(9), MessageId(5));
        assert_eq!(ledger.occurrence_count(&fp(9)), 0);
        assert_eq!(ledger.last_message_for(&fp(9)).unwrap(), MessageId(5));
    }

    #[test]
    fn exemption_set_semantics() {
        let mut ledger = RepostLedger::new();
        assert!(!ledger.is_exempt(UserId(10)));

        assert!(ledger.add_exempt(UserId(10)));
        assert!(!ledger.add_exempt(UserId(10)));
        assert!(ledger.is_exempt(UserId(10)));

        ledger.remove_exempt(UserId(10)).unwrap();
        assert!(!ledger.is_exempt(UserId(10)));
        assert!(matches!(
            ledger.remove_exempt(UserId(10)),
            Err(Error::NotExempt(UserId(10)))
        ));
    }
}
