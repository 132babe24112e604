//! Core components, types, and utilities for the relay-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Conversation keys, message origins, and turns.
//! - The typed store and answer API failures.
//! - Mention stripping and reply chunking.

pub mod config;
pub mod error;
pub mod text;
pub mod types;
