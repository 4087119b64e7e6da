use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use redis::{AsyncCommands, aio::MultiplexedConnection};

use crate::{
    config::ProgressConfig,
    error::StoreError,
    schema::{Cursor, RecoverySnapshot},
};

use super::ProgressStore;

/// Redis-backed progress store.
///
/// Keys:
/// - `{prefix}:cursor`   → cursor as JSON
/// - `{prefix}:snapshot` → recovery snapshot as gzip-compressed JSON
///
/// Draining deletes the snapshot and writes its cursor inside one
/// MULTI/EXEC: a snapshot and its promoted cursor never coexist.
pub struct RedisProgressStore {
    con: MultiplexedConnection,
    cursor_key: String,
    snapshot_key: String,
}

impl RedisProgressStore {
    pub async fn connect(cfg: &ProgressConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(cfg.redis_url.as_str())?;
        let con = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            con,
            cursor_key: format!("{}:cursor", cfg.key_prefix),
            snapshot_key: format!("{}:snapshot", cfg.key_prefix),
        })
    }
}

fn encode_cursor(cursor: &Cursor) -> Result<String, StoreError> {
    serde_json::to_string(cursor).map_err(|e| StoreError::Integrity(e.to_string()))
}

fn compress(snapshot: &RecoverySnapshot) -> Result<Vec<u8>, StoreError> {
    let json = serde_json::to_vec(snapshot).map_err(|e| StoreError::Integrity(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| StoreError::Integrity(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StoreError::Integrity(e.to_string()))
}

fn decompress(data: &[u8]) -> Result<RecoverySnapshot, StoreError> {
    let mut json = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut json)
        .map_err(|e| StoreError::Integrity(format!("corrupt snapshot: {e}")))?;

    serde_json::from_slice(&json).map_err(|e| StoreError::Integrity(format!("corrupt snapshot: {e}")))
}

#[async_trait::async_trait]
impl ProgressStore for RedisProgressStore {

    async fn load_cursor(&self) -> Result<Cursor, StoreError> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.get(&self.cursor_key).await?;

        match raw {
            None => Ok(Cursor::Start),
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::Integrity(format!("corrupt cursor: {e}"))),
        }
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.set(&self.cursor_key, encode_cursor(cursor)?).await?;
        Ok(())
    }

    async fn stage_snapshot(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.set(&self.snapshot_key, compress(snapshot)?).await?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<RecoverySnapshot>, StoreError> {
        let mut con = self.con.clone();
        let raw: Option<Vec<u8>> = con.get(&self.snapshot_key).await?;

        raw.map(|data| decompress(&data)).transpose()
    }

    async fn drain_snapshot(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(&self.snapshot_key)
            .ignore()
            .set(&self.cursor_key, encode_cursor(cursor)?)
            .ignore()
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}
