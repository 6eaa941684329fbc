//! Conversation messages as seen by the graph
//!
//! Message storage is owned elsewhere; the orchestrator only needs to list a
//! conversation's messages to replay them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            content: content.into(),
            timestamp,
        }
    }
}

/// Read access to stored conversation messages
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// All messages of a conversation, oldest first
    async fn messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>>;
}
