// Telegram transport: Bot API types and the HTTP client. Everything
// platform-specific stays behind this boundary; the core layers only see
// resolved ids.

pub mod client;
pub mod types;
