// Telegram Bot API client: a thin reqwest wrapper over the handful of
// methods the bot uses. Long polling only, no webhook mode.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::store::{ChatId, MessageId, UserId};

use super::types::{ApiResponse, ChatMember, File, Message, Update, User};

/// Hosted Bot API endpoint. Point TELEGRAM_API_URL at a local bot-api
/// server to override it.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("dejaview/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Call a Bot API method with a JSON body and unwrap the envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &impl Serialize) -> Result<T> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        debug!(method, "Bot API call");

        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .with_context(|| format!("Bot API request failed: {method}"))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to deserialize {method} response"))?;

        if !envelope.ok {
            bail!(
                "Bot API {method} rejected: {}",
                envelope.description.as_deref().unwrap_or("no description")
            );
        }
        envelope
            .result
            .with_context(|| format!("Bot API {method} returned ok without a result"))
    }

    /// Identify the bot account. The username feeds the command matcher.
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for updates past `offset`. Parks server-side for up to
    /// `timeout_secs` when nothing is pending.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Send an HTML-formatted message, optionally as a reply.
    pub async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        let mut params = json!({
            "chat_id": chat.0,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(MessageId(id)) = reply_to {
            params["reply_to_message_id"] = json!(id);
        }
        self.call("sendMessage", &params).await
    }

    /// Resolve a file id to its server-side path.
    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call("getFile", &json!({ "file_id": file_id })).await
    }

    /// Download a file previously resolved with `get_file`.
    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, file_path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("File download request failed")?;
        if !response.status().is_success() {
            bail!("File download returned {}", response.status());
        }
        let bytes = response
            .bytes()
            .await
            .context("Failed to read file download body")?;
        Ok(bytes.to_vec())
    }

    /// Fetch the bytes of a photo by file id (getFile, then download).
    pub async fn download_photo(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.get_file(file_id).await?;
        let path = file
            .file_path
            .context("getFile returned no file_path")?;
        self.download_file(&path).await
    }

    /// Fetch one member's role in a chat.
    pub async fn get_chat_member(&self, chat: ChatId, user: UserId) -> Result<ChatMember> {
        self.call(
            "getChatMember",
            &json!({ "chat_id": chat.0, "user_id": user.0 }),
        )
        .await
    }
}
