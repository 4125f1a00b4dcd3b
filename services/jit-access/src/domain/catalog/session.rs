//! 目录同步会话
//!
//! 分块必须从 0 开始严格按序到达，任何缺口或重复都会中止会话

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jit_errors::SynchronizationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::catalog::CatalogKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(jit_common::new_id())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Committed,
    Aborted,
}

/// 同步会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSession {
    pub id: SessionId,
    pub key: CatalogKey,
    pub version: String,
    pub state: SessionState,
    /// 已接受的分块，下标即序号
    pub chunks: Vec<Vec<u8>>,
    #[serde(default)]
    pub failure: Option<String>,
    pub opened_at: DateTime<Utc>,
}

impl CatalogSession {
    pub fn open(key: CatalogKey, version: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            key,
            version: version.into(),
            state: SessionState::Open,
            chunks: Vec::new(),
            failure: None,
            opened_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn next_sequence(&self) -> u64 {
        self.chunks.len() as u64
    }

    /// 接受一个分块，序号不符时中止会话
    pub fn accept_chunk(&mut self, sequence: u64, payload: Vec<u8>) -> Result<(), SynchronizationError> {
        if !self.is_open() {
            return Err(SynchronizationError::SessionClosed(self.id.to_string()));
        }
        let expected = self.next_sequence();
        if sequence != expected {
            let err = SynchronizationError::OutOfOrderChunk {
                expected,
                received: sequence,
            };
            self.abort(err.to_string());
            return Err(err);
        }
        self.chunks.push(payload);
        Ok(())
    }

    /// 按序拼接后的 SHA-256 (十六进制小写)
    pub fn checksum(&self) -> String {
        checksum_of(&self.chunks)
    }

    pub fn assemble(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.state = SessionState::Aborted;
        self.failure = Some(reason.into());
        self.chunks.clear();
    }

    pub fn mark_committed(&mut self) {
        self.state = SessionState::Committed;
        self.chunks.clear();
    }
}

/// 计算分块序列的校验和
pub fn checksum_of<I>(chunks: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.as_ref());
    }
    hex::encode(hasher.finalize())
}
