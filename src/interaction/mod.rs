//! Event handling and user interactions for relay-bot.
//!
//! This module provides functionality for handling chat events:
//! - Tracking conversations and their history
//! - Answering direct messages and @-mentions
//! - Slash commands

pub mod chat_event;
pub mod command;
pub mod tracker;
