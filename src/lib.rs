//! Library root for `relay-bot`.
//!
//! Relay-bot is a Slack assistant that forwards questions to an external
//! question-answering API and replies with its answers:
//! - Answers direct messages and @-mentions
//! - Remembers recent exchanges per DM channel or mention thread
//! - Sends that history as context with each new question
//!
//! Conversation history lives in a pluggable store, either in memory or in
//! SurrealDB. The architecture is built around extensible traits that allow
//! for different implementations of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the relay-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with history store, answer, and chat clients
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting relay-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the default crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
