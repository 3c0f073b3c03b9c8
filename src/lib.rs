// Dejaview: repost detection for Telegram group chats
//
// This is the library root. Each module corresponds to a major subsystem:
// perceptual hashing, the per-chat state layer, the detection state
// machine, and the Telegram transport feeding it.

pub mod bot;
pub mod config;
pub mod detect;
pub mod error;
pub mod hash;
pub mod status;
pub mod store;
pub mod telegram;
