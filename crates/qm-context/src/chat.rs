// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `ChatStore` collaborator (spec §4.3, §6): session and message
//! persistence. No message storage format is prescribed — this is a
//! schema-free JSON-file implementation of the interface contract.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use qm_core::{fsutil, Error, Result};
use serde::{Deserialize, Serialize};

use crate::closeable::Closeable;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub session_id: String,
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn save_session(&self, session: ChatSession) -> Result<()>;
    async fn load_session(&self, id: &str) -> Result<ChatSession>;
    async fn list_sessions(&self) -> Result<Vec<ChatSession>>;
    async fn delete_session(&self, id: &str) -> Result<()>;
    async fn save_message(&self, message: ChatMessage) -> Result<()>;
    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>>;
    fn as_closeable(&self) -> Option<&dyn Closeable> {
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChatFile {
    sessions: Vec<ChatSession>,
    messages: Vec<ChatMessage>,
}

/// A single JSON file holding every session and message for a project.
pub struct FileChatStore {
    path: PathBuf,
    data: RwLock<ChatFile>,
}

impl FileChatStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.is_file() {
            let bytes = std::fs::read(&path)?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                ChatFile::default()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            ChatFile::default()
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&*self.data.read())?;
        fsutil::atomic_write(&self.path, &bytes)
    }
}

#[async_trait]
impl ChatStore for FileChatStore {
    async fn save_session(&self, session: ChatSession) -> Result<()> {
        {
            let mut data = self.data.write();
            if let Some(existing) = data.sessions.iter_mut().find(|s| s.id == session.id) {
                *existing = session;
            } else {
                data.sessions.push(session);
            }
        }
        self.persist()
    }

    async fn load_session(&self, id: &str) -> Result<ChatSession> {
        self.data
            .read()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        Ok(self.data.read().sessions.clone())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        {
            let mut data = self.data.write();
            data.sessions.retain(|s| s.id != id);
            data.messages.retain(|m| m.session_id != id);
        }
        self.persist()
    }

    async fn save_message(&self, message: ChatMessage) -> Result<()> {
        {
            self.data.write().messages.push(message);
        }
        self.persist()
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .data
            .read()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    fn as_closeable(&self) -> Option<&dyn Closeable> {
        Some(self)
    }
}

impl Closeable for FileChatStore {
    fn close(&self) -> Result<()> {
        self.persist()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeChatStore {
        inner: Arc<RwLock<ChatFile>>,
    }

    impl FakeChatStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ChatStore for FakeChatStore {
        async fn save_session(&self, session: ChatSession) -> Result<()> {
            let mut data = self.inner.write();
            if let Some(existing) = data.sessions.iter_mut().find(|s| s.id == session.id) {
                *existing = session;
            } else {
                data.sessions.push(session);
            }
            Ok(())
        }

        async fn load_session(&self, id: &str) -> Result<ChatSession> {
            self.inner
                .read()
                .sessions
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))
        }

        async fn list_sessions(&self) -> Result<Vec<ChatSession>> {
            Ok(self.inner.read().sessions.clone())
        }

        async fn delete_session(&self, id: &str) -> Result<()> {
            let mut data = self.inner.write();
            data.sessions.retain(|s| s.id != id);
            data.messages.retain(|m| m.session_id != id);
            Ok(())
        }

        async fn save_message(&self, message: ChatMessage) -> Result<()> {
            self.inner.write().messages.push(message);
            Ok(())
        }

        async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
            Ok(self
                .inner
                .read()
                .messages
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
