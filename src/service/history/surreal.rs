//! SurrealDB implementation for relay-bot history storage.
//!
//! Each turn is stored as one document in the configured table:
//! `{ conversation_key, question, answer, timestamp, sequence, conversation_id }`.
//!
//! `sequence` counts up per conversation and is the sort key. Timestamps are
//! clamped so they never go backwards within a conversation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::{
    RecordId, Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
    sql::Datetime,
};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::base::{
    config::Config,
    error::{StoreError, StoreResult},
    types::{ConversationKey, Turn},
};

use super::{GenericHistoryStore, HistoryStore};

// Extra methods on `HistoryStore` applied by the surreal implementation.

impl HistoryStore {
    /// Connects to the configured SurrealDB instance.
    pub async fn surreal(config: &Config) -> StoreResult<Self> {
        let client = SurrealHistoryStore::connect(config).await?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Creates a SurrealDB store on the embedded in-memory engine.
    pub async fn surreal_memory() -> StoreResult<Self> {
        let client = SurrealHistoryStore::embedded("chat_history").await?;
        Ok(Self::new(Arc::new(client)))
    }
}

// Structs.

/// A turn as persisted in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TurnDocument {
    #[serde(default, skip_serializing)]
    id: Option<RecordId>,
    conversation_key: String,
    question: String,
    answer: String,
    timestamp: Datetime,
    sequence: u64,
    #[serde(default)]
    conversation_id: Option<String>,
}

impl TurnDocument {
    fn into_turn(self, key: &ConversationKey) -> Turn {
        Turn {
            conversation_key: key.clone(),
            question: self.question,
            answer: self.answer,
            timestamp: self.timestamp.0,
            sequence: Some(self.sequence),
            conversation_id: self.conversation_id,
        }
    }
}

/// Position of the newest turn of a conversation.
#[derive(Debug, Deserialize)]
struct LatestTurn {
    sequence: u64,
    timestamp: Datetime,
}

/// SurrealDB history store implementation.
///
/// The connection is opened once and shared by every clone. Appends from this
/// process are serialized so each conversation's sequence numbers stay unique.
#[derive(Clone)]
pub struct SurrealHistoryStore {
    db: Surreal<Any>,
    table: String,
    append_lock: Arc<Mutex<()>>,
}

impl SurrealHistoryStore {
    /// Connects, authenticates, and defines the schema.
    #[instrument(name = "SurrealHistoryStore::connect", skip_all)]
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        info!("Connecting to SurrealDB at `{}` ...", config.db_endpoint);

        let db = any::connect(config.db_endpoint.as_str()).await.map_err(|e| StoreError::Connection(e.to_string()))?;

        // Authenticate with the database if credentials were provided.
        if let (Some(username), Some(password)) = (&config.db_username, &config.db_password) {
            db.signin(Root { username, password }).await.map_err(|e| StoreError::Connection(e.to_string()))?;
        }

        db.use_ns(&config.db_namespace)
            .use_db(&config.db_database)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self::with_db(db, &config.db_table);
        store.define_schema().await?;

        info!("Database initialized successfully, storing turns in `{}`.", store.table);

        Ok(store)
    }

    /// Creates a store on the embedded in-memory engine.
    pub async fn embedded(table: &str) -> StoreResult<Self> {
        let db = any::connect("mem://").await.map_err(|e| StoreError::Connection(e.to_string()))?;
        db.use_ns("relay").use_db("bot").await.map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self::with_db(db, table);
        store.define_schema().await?;

        Ok(store)
    }

    fn with_db(db: Surreal<Any>, table: &str) -> Self {
        Self {
            db,
            table: table.to_string(),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Defines the turn table and its lookup index.
    ///
    /// The table name is validated as an identifier when the configuration loads.
    async fn define_schema(&self) -> StoreResult<()> {
        let table = &self.table;

        self.db
            .query(format!("DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;"))
            .query(format!("DEFINE INDEX IF NOT EXISTS {table}_conversation_sequence ON TABLE {table} FIELDS conversation_key, sequence;"))
            .await?
            .check()?;

        Ok(())
    }

    /// The newest stored turn for `key`, if any.
    async fn latest(&self, key: &ConversationKey) -> StoreResult<Option<LatestTurn>> {
        let mut response = self
            .db
            .query("SELECT sequence, timestamp FROM type::table($table) WHERE conversation_key = $key ORDER BY sequence DESC LIMIT 1")
            .bind(("table", self.table.clone()))
            .bind(("key", key.to_string()))
            .await?;

        let latest: Vec<LatestTurn> = response.take(0)?;

        Ok(latest.into_iter().next())
    }
}

#[async_trait]
impl GenericHistoryStore for SurrealHistoryStore {
    #[instrument(name = "SurrealHistoryStore::append", skip(self, turn))]
    async fn append(&self, key: &ConversationKey, turn: Turn) -> StoreResult<()> {
        let _guard = self.append_lock.lock().await;

        let (sequence, timestamp) = match self.latest(key).await? {
            Some(latest) => (latest.sequence + 1, turn.timestamp.max(latest.timestamp.0)),
            None => (0, turn.timestamp),
        };

        let document = TurnDocument {
            id: None,
            conversation_key: key.to_string(),
            question: turn.question,
            answer: turn.answer,
            timestamp: Datetime::from(timestamp),
            sequence,
            conversation_id: turn.conversation_id,
        };

        self.db
            .query("CREATE type::table($table) CONTENT $document")
            .bind(("table", self.table.clone()))
            .bind(("document", document))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(name = "SurrealHistoryStore::fetch", skip(self))]
    async fn fetch(&self, key: &ConversationKey, max_turns: usize) -> StoreResult<Vec<Turn>> {
        if max_turns == 0 {
            return Ok(Vec::new());
        }

        let mut response = self
            .db
            .query("SELECT * FROM type::table($table) WHERE conversation_key = $key ORDER BY sequence DESC LIMIT $limit")
            .bind(("table", self.table.clone()))
            .bind(("key", key.to_string()))
            .bind(("limit", max_turns as i64))
            .await?;

        let documents: Vec<TurnDocument> = response.take(0)?;

        // Newest first from the query; callers want oldest first.
        let turns = documents.into_iter().rev().map(|document| document.into_turn(key)).collect();

        Ok(turns)
    }

    #[instrument(name = "SurrealHistoryStore::clear", skip(self))]
    async fn clear(&self, key: &ConversationKey) -> StoreResult<()> {
        self.db
            .query("DELETE type::table($table) WHERE conversation_key = $key")
            .bind(("table", self.table.clone()))
            .bind(("key", key.to_string()))
            .await?
            .check()?;

        Ok(())
    }
}

// Tests.
