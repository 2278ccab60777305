//! Newline-delimited JSON file as a message source.
//!
//! Each non-blank line is one message payload, delivered on a single topic
//! and partition 0 with offsets counting from 0.

use super::consumer::{ConsumerSession, InboundMessage};
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

pub struct ReplaySession {
    topic: String,
    lines: Lines<BufReader<File>>,
    next_offset: i64,
    committed: Option<i64>,
}

impl ReplaySession {
    pub async fn open(path: impl AsRef<Path>, topic: impl Into<String>) -> Result<Self> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self {
            topic: topic.into(),
            lines: BufReader::new(file).lines(),
            next_offset: 0,
            committed: None,
        })
    }

    /// Offset of the last marked message.
    pub fn committed(&self) -> Option<i64> {
        self.committed
    }
}

#[async_trait]
impl ConsumerSession for ReplaySession {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let offset = self.next_offset;
            self.next_offset += 1;
            return Ok(Some(InboundMessage {
                topic: self.topic.clone(),
                partition: 0,
                offset,
                key: None,
                headers: Vec::new(),
                payload: line.as_bytes().to_vec(),
            }));
        }
        Ok(None)
    }

    async fn mark(&mut self, message: &InboundMessage) -> Result<()> {
        debug!(offset = message.offset, "marked");
        self.committed = Some(message.offset);
        Ok(())
    }
}
