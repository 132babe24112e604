//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the relay-bot:
//! - Chat services (e.g., Slack)
//! - History stores (in-memory, SurrealDB)
//! - The question-answering API
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod answer;
pub mod chat;
pub mod history;
