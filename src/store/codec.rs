// Persistence codec — the state snapshot on disk.
//
// One JSON document holds every monitored conversation: decimal chat id ->
// { uid2dhash, dhash_mar_count, dhash_last_msg, white_list_users }. The
// field names are pinned by state files written by earlier deployments and
// stay as they are; each field defaults to empty when absent. Saves go
// through a sibling temp file and a rename so a crash mid-write can never
// truncate the previous snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hash::Fingerprint;

use super::ledger::RepostLedger;
use super::models::{ChatId, MediaId, MessageId, UserId};

// -- Serde types for the snapshot document --

/// Wire form of one conversation's ledger. BTreeMaps keep the emitted key
/// order deterministic, so consecutive snapshots diff cleanly.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatRecord {
    #[serde(rename = "uid2dhash", default)]
    media_fingerprints: BTreeMap<String, Fingerprint>,
    #[serde(rename = "dhash_mar_count", default)]
    occurrence_counts: BTreeMap<Fingerprint, u64>,
    #[serde(rename = "dhash_last_msg", default)]
    last_messages: BTreeMap<Fingerprint, i64>,
    #[serde(rename = "white_list_users", default)]
    exempt_senders: BTreeMap<String, bool>,
}

impl ChatRecord {
    fn from_ledger(ledger: &RepostLedger) -> Self {
        let media_fingerprints = ledger
            .media_fingerprints
            .iter()
            .map(|(id, fp)| (id.as_str().to_string(), *fp))
            .collect();

        let mut occurrence_counts = BTreeMap::new();
        let mut last_messages = BTreeMap::new();
        for (fp, record) in &ledger.occurrences {
            occurrence_counts.insert(*fp, record.count);
            if let Some(message) = record.last_message {
                last_messages.insert(*fp, message.0);
            }
        }

        let exempt_senders = ledger
            .exempt_senders
            .iter()
            .map(|user| (user.0.to_string(), true))
            .collect();

        Self {
            media_fingerprints,
            occurrence_counts,
            last_messages,
            exempt_senders,
        }
    }

    fn into_ledger(self) -> Result<RepostLedger, String> {
        let mut ledger = RepostLedger::new();
        for (fp, count) in self.occurrence_counts {
            ledger.occurrences.entry(fp).or_default().count = count;
        }
        for (fp, message) in self.last_messages {
            ledger.occurrences.entry(fp).or_default().last_message = Some(MessageId(message));
        }
        for (media, fp) in self.media_fingerprints {
            // A memoized media object always has an occurrence record, even
            // out of a hand-edited file; the count stays whatever the count
            // map said (zero when it said nothing).
            ledger.occurrences.entry(fp).or_default();
            ledger.media_fingerprints.insert(MediaId::new(media), fp);
        }
        for user in self.exempt_senders.into_keys() {
            // Presence on the list is what exempts; the boolean value is
            // legacy padding.
            let id: i64 = user
                .parse()
                .map_err(|_| format!("whitelist key {user:?} is not a numeric user id"))?;
            ledger.exempt_senders.insert(UserId(id));
        }
        Ok(ledger)
    }
}

/// Serialize a snapshot and atomically replace the state file.
pub fn save_state(path: &Path, snapshot: &HashMap<ChatId, RepostLedger>) -> Result<(), Error> {
    let document: BTreeMap<String, ChatRecord> = snapshot
        .iter()
        .map(|(chat, ledger)| (chat.0.to_string(), ChatRecord::from_ledger(ledger)))
        .collect();
    let json = serde_json::to_string_pretty(&document).map_err(|e| Error::StateIo {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::StateIo {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let tmp = sibling_tmp(path);
    fs::write(&tmp, json).map_err(|e| Error::StateIo {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| Error::StateIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Load the on-disk snapshot. A missing file is an empty start, not an
/// error. Anything else that goes wrong is one, so accumulated counters are
/// never silently reset by a half-readable file.
pub fn load_state(path: &Path) -> Result<HashMap<ChatId, RepostLedger>, Error> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => {
            return Err(Error::StateIo {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let document: BTreeMap<String, ChatRecord> =
        serde_json::from_str(&raw).map_err(|e| Error::CorruptState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut ledgers = HashMap::with_capacity(document.len());
    for (key, record) in document {
        let chat: i64 = key.parse().map_err(|_| Error::CorruptState {
            path: path.to_path_buf(),
            reason: format!("chat key {key:?} is not an integer id"),
        })?;
        let ledger = record.into_ledger().map_err(|reason| Error::CorruptState {
            path: path.to_path_buf(),
            reason,
        })?;
        ledgers.insert(ChatId(chat), ledger);
    }
    Ok(ledgers)
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
