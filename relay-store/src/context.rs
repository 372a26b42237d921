//! Conversation context store.
//!
//! Maps external chat handles to logical conversation ids and keeps an
//! append-only, index-ordered message log per conversation. History is
//! bounded by an estimated token budget: once a conversation exceeds
//! it, the oldest contiguous prefix of the log is evicted.

use crate::pool::StorePool;
use crate::types::{ConversationContext, ConversationMessage, MessageRole};
use relay_common::Result;
use rusqlite::params;
use std::time::Duration;

/// Store for chat-to-conversation mappings and message history.
#[derive(Clone)]
pub struct ContextStore {
    pool: StorePool,
    chars_per_token: u64,
}

impl ContextStore {
    /// Create a store estimating tokens as `content length / chars_per_token`.
    pub fn new(pool: StorePool, chars_per_token: u32) -> Self {
        Self {
            pool,
            chars_per_token: u64::from(chars_per_token.max(1)),
        }
    }

    /// Look up the conversation mapping for a chat handle.
    pub async fn get_context(&self, chat_handle: &str) -> Result<Option<ConversationContext>> {
        let chat_handle = chat_handle.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT chat_handle, conversation_id, last_used
                     FROM conversation_contexts WHERE chat_handle = ?1",
                    params![chat_handle],
                    |row| {
                        Ok(ConversationContext {
                            chat_handle: row.get(0)?,
                            conversation_id: row.get(1)?,
                            last_used: row.get(2)?,
                        })
                    },
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })
            .await
    }

    /// Upsert the mapping for a chat handle, refreshing `last_used`.
    pub async fn save_context(&self, chat_handle: &str, conversation_id: &str) -> Result<()> {
        let chat_handle = chat_handle.to_string();
        let conversation_id = conversation_id.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO conversation_contexts
                     (chat_handle, conversation_id, last_used) VALUES (?1, ?2, ?3)",
                    params![chat_handle, conversation_id, StorePool::now()],
                )
                .map(|_| ())
            })
            .await
    }

    /// Refresh `last_used` for a chat handle without touching the mapping.
    pub async fn touch(&self, chat_handle: &str) -> Result<()> {
        let chat_handle = chat_handle.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE conversation_contexts SET last_used = ?1 WHERE chat_handle = ?2",
                    params![StorePool::now(), chat_handle],
                )
                .map(|_| ())
            })
            .await
    }

    /// Append a message to a conversation's log.
    ///
    /// The next index is `max(existing) + 1` (or 0). Index assignment
    /// and insert are one SQL statement, so concurrent appends to the
    /// same conversation can never observe the same max and assign
    /// duplicate indices.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO conversation_messages
                     (conversation_id, role, content, timestamp, message_index)
                     SELECT ?1, ?2, ?3, ?4, COALESCE(MAX(message_index) + 1, 0)
                     FROM conversation_messages WHERE conversation_id = ?1",
                    params![conversation_id, role.as_str(), content, StorePool::now()],
                )
                .map(|_| ())
            })
            .await
    }

    /// List a conversation's messages ascending by `message_index`.
    ///
    /// With a limit, returns the most recent `limit` messages (the
    /// tail), still in ascending order.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationMessage>> {
        let conversation_id = conversation_id.to_string();
        self.pool
            .with_conn(move |conn| {
                let map_row = |row: &rusqlite::Row<'_>| {
                    Ok(ConversationMessage {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        role: MessageRole::parse(&row.get::<_, String>(2)?),
                        content: row.get(3)?,
                        timestamp: row.get(4)?,
                        message_index: row.get(5)?,
                    })
                };

                let mut messages: Vec<ConversationMessage> = if let Some(limit) = limit {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, timestamp, message_index
                         FROM conversation_messages WHERE conversation_id = ?1
                         ORDER BY message_index DESC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![conversation_id, limit as i64], map_row)?;
                    rows.collect::<rusqlite::Result<_>>()?
                } else {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, timestamp, message_index
                         FROM conversation_messages WHERE conversation_id = ?1
                         ORDER BY message_index ASC",
                    )?;
                    let rows = stmt.query_map(params![conversation_id], map_row)?;
                    rows.collect::<rusqlite::Result<_>>()?
                };

                // The limited query selects the tail in descending order.
                if limit.is_some() {
                    messages.reverse();
                }
                Ok(messages)
            })
            .await
    }

    /// Number of messages in a conversation's log.
    pub async fn message_count(&self, conversation_id: &str) -> Result<usize> {
        let conversation_id = conversation_id.to_string();
        self.pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM conversation_messages WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get::<_, i64>(0),
                )
                .map(|n| n as usize)
            })
            .await
    }

    /// Estimate a conversation's cost in abstract tokens: total content
    /// length divided by the chars-per-token constant. A deliberately
    /// cheap approximation, not a real tokenizer.
    pub async fn token_estimate(&self, conversation_id: &str) -> Result<u64> {
        let conversation_id = conversation_id.to_string();
        let total_chars = self
            .pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(LENGTH(content)), 0)
                     FROM conversation_messages WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get::<_, i64>(0),
                )
            })
            .await?;
        Ok(total_chars as u64 / self.chars_per_token)
    }

    /// Evict the oldest messages until the conversation fits the budget.
    ///
    /// No-op when already under budget. Otherwise walks the log
    /// newest-first, accumulating estimated cost until the next message
    /// would exceed the budget, then deletes everything below the
    /// oldest retained index. The retained set is always a contiguous
    /// trailing window, and at least the newest message survives even
    /// when it alone exceeds the budget. Returns rows deleted.
    pub async fn truncate_to_budget(
        &self,
        conversation_id: &str,
        max_tokens: u64,
    ) -> Result<usize> {
        if self.token_estimate(conversation_id).await? <= max_tokens {
            return Ok(0);
        }

        let conversation_id = conversation_id.to_string();
        let chars_per_token = self.chars_per_token;
        let deleted = self
            .pool
            .with_conn(move |conn| {
                let cutoff = {
                    let mut stmt = conn.prepare(
                        "SELECT message_index, LENGTH(content)
                         FROM conversation_messages WHERE conversation_id = ?1
                         ORDER BY message_index DESC",
                    )?;
                    let rows = stmt.query_map(params![conversation_id], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                    })?;

                    let mut kept_tokens: u64 = 0;
                    let mut cutoff: Option<i64> = None;
                    for row in rows {
                        let (index, content_len) = row?;
                        let msg_tokens = content_len as u64 / chars_per_token;
                        if cutoff.is_some() && kept_tokens + msg_tokens > max_tokens {
                            break;
                        }
                        kept_tokens += msg_tokens;
                        cutoff = Some(index);
                    }
                    cutoff
                };

                match cutoff {
                    Some(keep_from) if keep_from > 0 => conn.execute(
                        "DELETE FROM conversation_messages
                         WHERE conversation_id = ?1 AND message_index < ?2",
                        params![conversation_id, keep_from],
                    ),
                    _ => Ok(0),
                }
            })
            .await?;

        if deleted > 0 {
            tracing::info!(deleted, "Evicted oldest messages over token budget");
        }
        Ok(deleted)
    }

    /// Delete context mappings idle past `max_idle`, cascading to any
    /// message log whose conversation no longer has a mapping. Returns
    /// the number of mappings removed.
    pub async fn clean_idle(&self, max_idle: Duration) -> Result<usize> {
        let cutoff = StorePool::now() - max_idle.as_secs() as i64;
        let removed = self
            .pool
            .with_conn(move |conn| {
                let tx = conn.transaction()?;

                let expired: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT conversation_id FROM conversation_contexts WHERE last_used < ?1",
                    )?;
                    let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
                    rows.collect::<rusqlite::Result<_>>()?
                };

                let removed = tx.execute(
                    "DELETE FROM conversation_contexts WHERE last_used < ?1",
                    params![cutoff],
                )?;

                // A conversation id may be shared by several chat
                // handles; only cascade once no mapping references it.
                for conversation_id in &expired {
                    tx.execute(
                        "DELETE FROM conversation_messages
                         WHERE conversation_id = ?1
                           AND NOT EXISTS (SELECT 1 FROM conversation_contexts
                                           WHERE conversation_id = ?1)",
                        params![conversation_id],
                    )?;
                }

                tx.commit()?;
                Ok(removed)
            })
            .await?;

        if removed > 0 {
            tracing::info!(removed, "Evicted idle conversation contexts");
        }
        Ok(removed)
    }
}
