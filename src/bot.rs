// The bot service: long-poll loop, command routing, and the saver task.
//
// Each incoming message is dispatched to its own task; ordering within a
// chat comes from the ledger locks, not the dispatcher. Permission checks
// live here (the core performs none). All snapshot writes funnel through
// one saver task, so a single save is ever in flight regardless of how the
// write was triggered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regex_lite::Regex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::detect::{ImageEvent, RepostDetector};
use crate::store::{codec, ChatId, ConversationRegistry, MediaId, MessageId, UserId};
use crate::telegram::client::BotClient;
use crate::telegram::types::{Message, PeerRef};

/// How long each getUpdates call parks server-side.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Enable,
    Disable,
    AddWhitelist,
    RemoveWhitelist,
    Save,
}

/// Compiled `/cmd` patterns. Telegram clients append the bot's username in
/// group chats (`/enable@dejaview_bot`), so both forms must match.
struct CommandSet {
    patterns: Vec<(Command, Regex)>,
}

impl CommandSet {
    fn new(bot_username: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for (command, name) in [
            (Command::Enable, "enable"),
            (Command::Disable, "disable"),
            (Command::AddWhitelist, "add_whitelist"),
            (Command::RemoveWhitelist, "remove_whitelist"),
            (Command::Save, "save"),
        ] {
            // Usernames are [A-Za-z0-9_], so splicing one in is safe.
            let pattern = format!(r"^/{name}(@{bot_username})?(\s|$)");
            let regex = Regex::new(&pattern)
                .with_context(|| format!("Failed to build command pattern for /{name}"))?;
            patterns.push((command, regex));
        }
        Ok(Self { patterns })
    }

    fn parse(&self, text: &str) -> Option<Command> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(command, _)| *command)
    }
}

/// Everything the per-message tasks share.
struct Bot {
    client: BotClient,
    registry: Arc<ConversationRegistry>,
    detector: RepostDetector,
    commands: CommandSet,
    operators: Vec<UserId>,
    save_tx: mpsc::Sender<()>,
}

/// Run the bot until interrupted. Loads the snapshot, starts the saver,
/// long-polls for updates, and writes a final snapshot on the way out.
pub async fn run(config: Config) -> Result<()> {
    let ledgers = codec::load_state(&config.state_path)?;
    info!(
        chats = ledgers.len(),
        path = %config.state_path.display(),
        "State loaded"
    );

    let registry = Arc::new(ConversationRegistry::from_ledgers(ledgers));
    let client = BotClient::new(&config.api_url, &config.bot_token)?;

    let me = client
        .get_me()
        .await
        .context("getMe failed; check TELEGRAM_BOT_TOKEN")?;
    let username = me.username.context("bot account has no username")?;
    info!(username = %username, "Connected to Telegram");

    let (save_tx, save_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let saver = tokio::spawn(run_saver(
        Arc::clone(&registry),
        config.state_path.clone(),
        Duration::from_secs(config.save_interval_secs),
        save_rx,
        shutdown_rx,
    ));

    let bot = Arc::new(Bot {
        detector: RepostDetector::new(Arc::clone(&registry), config.repost_threshold),
        registry,
        client,
        commands: CommandSet::new(&username)?,
        operators: config.operators.clone(),
        save_tx,
    });

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut offset = 0i64;
    loop {
        let polled = tokio::select! {
            result = bot.client.get_updates(offset, POLL_TIMEOUT_SECS) => result,
            _ = &mut interrupt => {
                info!("Shutdown signal received");
                break;
            }
        };

        let updates = match polled {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "getUpdates failed, backing off");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let bot = Arc::clone(&bot);
            tokio::spawn(async move {
                if let Err(e) = bot.handle_message(message).await {
                    warn!(error = %e, "Message handling failed");
                }
            });
        }
    }

    // Wake the saver for its final write and wait it out.
    let _ = shutdown_tx.send(true);
    if let Err(e) = saver.await {
        error!(error = %e, "Saver task panicked");
    }
    Ok(())
}

impl Bot {
    async fn handle_message(&self, message: Message) -> Result<()> {
        let Some(peer) = PeerRef::from_chat(&message.chat) else {
            debug!(
                chat = message.chat.id,
                kind = %message.chat.kind,
                "Ignoring unsupported chat type"
            );
            return Ok(());
        };

        if let Some(text) = message.text.as_deref() {
            if let Some(command) = self.commands.parse(text) {
                return self.handle_command(command, peer, &message).await;
            }
        }
        if message.photo.is_some() {
            return self.handle_photo(peer, &message).await;
        }
        Ok(())
    }

    async fn handle_photo(&self, peer: PeerRef, message: &Message) -> Result<()> {
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };
        // The largest rendition carries the most signal for the hash.
        let Some(photo) = message
            .photo
            .as_ref()
            .and_then(|sizes| sizes.iter().max_by_key(|p| p.width * p.height))
        else {
            return Ok(());
        };

        let chat = peer.conversation_id();
        let event = ImageEvent {
            chat,
            sender: UserId(from.id),
            media: MediaId::new(photo.file_unique_id.clone()),
            message: MessageId(message.message_id),
        };

        let client = &self.client;
        let file_id = photo.file_id.clone();
        let outcome = self
            .detector
            .process(
                &event,
                |prior| peer.permalink(prior),
                || async move { client.download_photo(&file_id).await },
            )
            .await;

        match outcome {
            Ok(Some(reply)) => {
                self.client
                    .send_message(chat, &reply.text, Some(reply.reply_to))
                    .await?;
            }
            Ok(None) => {}
            Err(e) => {
                // Abandoned event: nothing was recorded, nothing is sent.
                debug!(error = %e, media = %event.media, "Image event abandoned");
            }
        }
        Ok(())
    }

    async fn handle_command(
        &self,
        command: Command,
        peer: PeerRef,
        message: &Message,
    ) -> Result<()> {
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };
        let sender = UserId(from.id);
        let chat = peer.conversation_id();
        let reply_to = Some(MessageId(message.message_id));

        match command {
            Command::Enable | Command::Disable => {
                if !peer.is_channel() {
                    self.client
                        .send_message(
                            chat,
                            "Repost monitoring only works in groups and channels.",
                            reply_to,
                        )
                        .await?;
                    return Ok(());
                }
                if !self.sender_is_chat_admin(chat, sender).await {
                    self.client
                        .send_message(
                            chat,
                            "Only this chat's creator or administrators can change monitoring.",
                            reply_to,
                        )
                        .await?;
                    return Ok(());
                }

                let text = if command == Command::Enable {
                    let (_, outcome) = self.registry.enable(chat).await;
                    if outcome.changed() {
                        info!(chat = chat.0, "Monitoring enabled");
                        "Repost monitoring enabled. Every image posted here will be checked."
                    } else {
                        "Repost monitoring is already enabled here."
                    }
                } else {
                    let outcome = self.registry.disable(chat).await;
                    if outcome.changed() {
                        info!(chat = chat.0, "Monitoring disabled, state discarded");
                        "Monitoring disabled. Everything remembered about this chat's images has been discarded."
                    } else {
                        "Monitoring was never enabled here."
                    }
                };
                self.client.send_message(chat, text, reply_to).await?;
            }
            Command::AddWhitelist => {
                let text = match self.registry.add_exempt(chat, sender).await {
                    Ok(outcome) if outcome.changed() => format!(
                        "User <code>{sender}</code> is now exempt from repost checks."
                    ),
                    Ok(_) => format!("User <code>{sender}</code> is already exempt."),
                    Err(_) => "Monitoring is not enabled here, so there is no exemption list."
                        .to_string(),
                };
                self.client.send_message(chat, &text, reply_to).await?;
            }
            Command::RemoveWhitelist => {
                let text = match self.registry.remove_exempt(chat, sender).await {
                    Ok(outcome) if outcome.changed() => format!(
                        "User <code>{sender}</code> is no longer exempt from repost checks."
                    ),
                    Ok(_) => format!("User <code>{sender}</code> was not exempt."),
                    Err(_) => "Monitoring is not enabled here, so there is no exemption list."
                        .to_string(),
                };
                self.client.send_message(chat, &text, reply_to).await?;
            }
            Command::Save => {
                // Operator-only, silently ignored for everyone else.
                if !self.operators.contains(&sender) {
                    debug!(sender = sender.0, "Ignoring /save from non-operator");
                    return Ok(());
                }
                // try_send: a second request while one is pending coalesces.
                let _ = self.save_tx.try_send(());
                self.client
                    .send_message(chat, "Snapshot requested.", reply_to)
                    .await?;
            }
        }
        Ok(())
    }

    /// A failed role lookup refuses the command rather than granting it.
    async fn sender_is_chat_admin(&self, chat: ChatId, user: UserId) -> bool {
        match self.client.get_chat_member(chat, user).await {
            Ok(member) => member.is_admin(),
            Err(e) => {
                warn!(error = %e, chat = chat.0, "getChatMember failed, refusing command");
                false
            }
        }
    }
}

/// The saver task, sole owner of snapshot writes. Ticks on the configured
/// interval, honors manual requests, and always writes once more on
/// shutdown before exiting.
async fn run_saver(
    registry: Arc<ConversationRegistry>,
    path: PathBuf,
    every: Duration,
    mut manual: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately and the state was just loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => save_snapshot(&registry, &path, "interval").await,
            Some(()) = manual.recv() => save_snapshot(&registry, &path, "manual").await,
            _ = shutdown.changed() => {
                save_snapshot(&registry, &path, "shutdown").await;
                return;
            }
        }
    }
}

async fn save_snapshot(registry: &ConversationRegistry, path: &Path, trigger: &str) {
    let snapshot = registry.snapshot().await;
    match codec::save_state(path, &snapshot) {
        Ok(()) => info!(chats = snapshot.len(), trigger, "State saved"),
        Err(e) => {
            // The bot keeps running on its in-memory state.
            error!(error = %e, trigger, "State save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_patterns_accept_both_forms() {
        let commands = CommandSet::new("dejaview_bot").unwrap();
        assert_eq!(commands.parse("/enable"), Some(Command::Enable));
        assert_eq!(commands.parse("/enable@dejaview_bot"), Some(Command::Enable));
        assert_eq!(commands.parse("/disable some trailing text"), Some(Command::Disable));
        assert_eq!(commands.parse("/add_whitelist"), Some(Command::AddWhitelist));
        assert_eq!(commands.parse("/remove_whitelist"), Some(Command::RemoveWhitelist));
        assert_eq!(commands.parse("/save"), Some(Command::Save));
    }

    #[test]
    fn command_patterns_reject_lookalikes() {
        let commands = CommandSet::new("dejaview_bot").unwrap();
        assert_eq!(commands.parse("/enabled"), None);
        assert_eq!(commands.parse("/enable@other_bot"), None);
        assert_eq!(commands.parse("enable"), None);
        assert_eq!(commands.parse("say /enable"), None);
    }
}
