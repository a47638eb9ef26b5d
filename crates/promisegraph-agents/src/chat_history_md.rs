//! Markdown-backed `ChatHistory`: one file per conversation, one blockquote
//! line per turn, flushed after every write.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::chat_history::ChatHistory;
use crate::errors::AgentError;
use crate::message::Message;

/// Appends each message as `> role: content` to a markdown file. Flushes
/// after every write so a crash loses at most the in-flight message.
pub struct ChatHistoryMd {
    path: PathBuf,
    // Serializes concurrent appends; `dialog_loop` only ever calls this one
    // turn at a time, but the file handle itself isn't `Sync` to share
    // without one.
    lock: Mutex<()>,
}

impl ChatHistoryMd {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChatHistory for ChatHistoryMd {
    async fn append(&self, message: &Message) -> Result<(), AgentError> {
        let _guard = self.lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AgentError::History(promisegraph::SharedError::new(e)))?;

        let line = format!("> {}: {}\n\n", message.role, message.content);
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::History(promisegraph::SharedError::new(e)))?;
        file.flush()
            .await
            .map_err(|e| AgentError::History(promisegraph::SharedError::new(e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_render_as_blockquotes_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHAT.md");
        let history = ChatHistoryMd::new(&path);

        history.append(&Message::user("hi")).await.unwrap();
        history.append(&Message::assistant("hello!")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "> user: hi\n\n> assistant: hello!\n\n");
    }
}
