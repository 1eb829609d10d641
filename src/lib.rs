//! trenerbot - Telegram workout planner
//!
//! Asks for a goal, level, workout format and body stats, then asks an LLM
//! for a 45–60 minute gym plan.

pub mod bot;
pub mod config;
pub mod dialogue;
pub mod generation;
pub mod prompt;
pub mod session;
pub mod workout;

pub use config::Config;
pub use dialogue::Conversation;
