// ConversationRegistry — which chats are monitored, and their ledgers.
//
// An explicitly constructed value owned by the process and handed to the
// detector and the saver; nothing here is global. Each ledger sits behind
// its own mutex so distinct chats proceed fully in parallel while events
// within one chat serialize. The outer map takes a read lock on the hot
// path and a write lock only for enable/disable. No lock is held across an
// await that could block on anything but these locks themselves.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::Error;

use super::ledger::RepostLedger;
use super::models::{ChatId, UserId};

/// Whether an administrative operation changed anything. The command layer
/// phrases its confirmation text off this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminOutcome {
    Changed,
    Unchanged,
}

impl AdminOutcome {
    pub fn changed(self) -> bool {
        matches!(self, AdminOutcome::Changed)
    }
}

#[derive(Default)]
pub struct ConversationRegistry {
    chats: RwLock<HashMap<ChatId, Arc<Mutex<RepostLedger>>>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from loaded ledgers at process start.
    pub fn from_ledgers(ledgers: HashMap<ChatId, RepostLedger>) -> Self {
        let chats = ledgers
            .into_iter()
            .map(|(chat, ledger)| (chat, Arc::new(Mutex::new(ledger))))
            .collect();
        Self {
            chats: RwLock::new(chats),
        }
    }

    pub async fn is_monitored(&self, chat: ChatId) -> bool {
        self.chats.read().await.contains_key(&chat)
    }

    /// The ledger of a monitored chat, or None when unmonitored.
    pub async fn get(&self, chat: ChatId) -> Option<Arc<Mutex<RepostLedger>>> {
        self.chats.read().await.get(&chat).cloned()
    }

    /// Start monitoring a chat. Idempotent: an existing ledger is returned
    /// untouched, never reset.
    pub async fn enable(&self, chat: ChatId) -> (Arc<Mutex<RepostLedger>>, AdminOutcome) {
        let mut chats = self.chats.write().await;
        match chats.get(&chat) {
            Some(ledger) => (Arc::clone(ledger), AdminOutcome::Unchanged),
            None => {
                let ledger = Arc::new(Mutex::new(RepostLedger::new()));
                chats.insert(chat, Arc::clone(&ledger));
                (ledger, AdminOutcome::Changed)
            }
        }
    }

    /// Stop monitoring a chat and discard its accumulated state. The next
    /// enable starts from an empty ledger.
    pub async fn disable(&self, chat: ChatId) -> AdminOutcome {
        match self.chats.write().await.remove(&chat) {
            Some(_) => AdminOutcome::Changed,
            None => AdminOutcome::Unchanged,
        }
    }

    /// Exempt a sender in a monitored chat.
    pub async fn add_exempt(&self, chat: ChatId, sender: UserId) -> Result<AdminOutcome, Error> {
        let ledger = self.get(chat).await.ok_or(Error::NotMonitored(chat))?;
        let mut ledger = ledger.lock().await;
        if ledger.add_exempt(sender) {
            Ok(AdminOutcome::Changed)
        } else {
            Ok(AdminOutcome::Unchanged)
        }
    }

    /// Withdraw a sender's exemption in a monitored chat. An exemption that
    /// never existed reports Unchanged rather than an error.
    pub async fn remove_exempt(
        &self,
        chat: ChatId,
        sender: UserId,
    ) -> Result<AdminOutcome, Error> {
        let ledger = self.get(chat).await.ok_or(Error::NotMonitored(chat))?;
        let mut ledger = ledger.lock().await;
        match ledger.remove_exempt(sender) {
            Ok(()) => Ok(AdminOutcome::Changed),
            Err(Error::NotExempt(_)) => Ok(AdminOutcome::Unchanged),
            Err(e) => Err(e),
        }
    }

    /// Clone every ledger into the plain map the persistence codec
    /// serializes. The outer read lock is held for the whole walk, so
    /// membership cannot shift mid-snapshot, and each inner lock is held
    /// just long enough to clone. Every ledger is internally consistent;
    /// cross-chat skew is bounded by the walk itself.
    pub async fn snapshot(&self) -> HashMap<ChatId, RepostLedger> {
        let chats = self.chats.read().await;
        let mut snapshot = HashMap::with_capacity(chats.len());
        for (chat, ledger) in chats.iter() {
            snapshot.insert(*chat, ledger.lock().await.clone());
        }
        snapshot
    }

    pub async fn monitored_count(&self) -> usize {
        self.chats.read().await.len()
    }
}
