//! Pluggable storage backends for fog snapshots.
//!
//! The engine never talks to a database or network directly: hosts hand
//! it a [`FogStorage`] implementation and the persistence systems route
//! snapshot bytes through it. [`MemoryStorage`] is the in-process
//! reference backend, used by local sessions and tests.
//!
//! 雾效快照的可插拔存储后端；引擎本身不直接访问数据库或网络。

use async_channel::{Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::persistence::{PersistenceError, SessionKey};

/// Snapshot byte store keyed by session. Implementations fan saved
/// payloads out to every live subscriber of the same key, which is how
/// participant clients observe host edits.
/// 按会话键保存快照字节的存储接口，保存时向同键订阅者广播
pub trait FogStorage: Send + Sync + 'static {
    /// 保存快照字节并广播给订阅者
    /// Persist snapshot bytes and broadcast them to subscribers
    fn save(&self, key: &SessionKey, bytes: &[u8]) -> Result<(), PersistenceError>;

    /// 读取某会话最近保存的快照字节
    /// Fetch the most recently saved snapshot bytes for a session
    fn load(&self, key: &SessionKey) -> Result<Vec<u8>, PersistenceError>;

    /// 订阅该会话后续保存的快照
    /// Subscribe to snapshots saved for this session from now on
    fn subscribe(&self, key: &SessionKey) -> Receiver<Vec<u8>>;
}

#[derive(Default)]
struct MemoryStorageInner {
    entries: HashMap<SessionKey, Vec<u8>>,
    subscribers: HashMap<SessionKey, Vec<Sender<Vec<u8>>>>,
}

/// In-memory [`FogStorage`] backend. Keeps the latest payload per key
/// and pushes saves to subscribers over unbounded channels.
/// 内存实现：按键保留最新快照并通过无界通道推送给订阅者
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FogStorage for MemoryStorage {
    fn save(&self, key: &SessionKey, bytes: &[u8]) -> Result<(), PersistenceError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| PersistenceError::StorageFailed("storage lock poisoned".into()))?;
        inner.entries.insert(key.clone(), bytes.to_vec());
        if let Some(senders) = inner.subscribers.get_mut(key) {
            // Channels are unbounded, so the only send failure is a
            // dropped receiver; prune those as we go.
            senders.retain(|sender| {
                !matches!(sender.try_send(bytes.to_vec()), Err(TrySendError::Closed(_)))
            });
        }
        Ok(())
    }

    fn load(&self, key: &SessionKey) -> Result<Vec<u8>, PersistenceError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| PersistenceError::StorageFailed("storage lock poisoned".into()))?;
        inner
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(key.clone()))
    }

    fn subscribe(&self, key: &SessionKey) -> Receiver<Vec<u8>> {
        let (tx, rx) = async_channel::unbounded();
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.entry(key.clone()).or_default().push(tx);
        }
        rx
    }
}
