use async_trait::async_trait;

use super::DurableStore;
use crate::error::StoreError;
use crate::infrastructure::JsExecutor;

/// 页面的 `window.localStorage`
///
/// 与页面内的批改脚本使用同一组键，两边可以共享ID映射和运行状态。
#[derive(Clone)]
pub struct LocalStorageStore {
    executor: JsExecutor,
}

impl LocalStorageStore {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }
}

fn js_string(value: &str) -> String {
    // 字符串序列化不会失败
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl DurableStore for LocalStorageStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let js_code = format!("window.localStorage.getItem({})", js_string(key));
        self.executor
            .eval_as::<Option<String>>(js_code)
            .await
            .map_err(|e| StoreError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let js_code = format!(
            "window.localStorage.setItem({}, {}); true",
            js_string(key),
            js_string(value)
        );
        self.executor
            .eval(js_code)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let js_code = format!("window.localStorage.removeItem({}); true", js_string(key));
        self.executor
            .eval(js_code)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}
