//! 持久化存储 - 端口层
//!
//! 页面每次跳转都会销毁自动机实例，只有这里的键值能跨实例保留：
//! - 作业ID映射（JSON 对象）
//! - 自动批改运行标志
//!
//! 写入是"后写者胜"，没有事务；两个键都是追加/幂等写，足够使用。

pub mod file;
pub mod local_storage;
pub mod memory;

pub use file::FileStore;
pub use local_storage::LocalStorageStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::StoreError;

/// 字符串键值存储
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: DurableStore + ?Sized> DurableStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

/// 自动批改运行标志
///
/// 读失败一律视为"未运行"，写失败只记录日志。
#[derive(Clone)]
pub struct ActiveFlag<S> {
    store: S,
    key: String,
}

impl<S: DurableStore> ActiveFlag<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn is_active(&self) -> bool {
        match self.store.get(&self.key).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!("⚠️ 读取自动批改状态失败，按未运行处理: {}", e);
                false
            }
        }
    }

    pub async fn activate(&self) {
        self.write(true).await;
    }

    pub async fn clear(&self) {
        self.write(false).await;
    }

    async fn write(&self, active: bool) {
        let value = if active { "true" } else { "false" };
        match self.store.set(&self.key, value).await {
            Ok(()) => debug!("自动批改状态 -> {}", value),
            Err(e) => warn!("⚠️ 保存自动批改状态失败: {}", e),
        }
    }
}
