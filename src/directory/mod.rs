//! 作业ID目录
//!
//! 维护"作业名称 → 作业ID"的映射，持久化在 [`DurableStore`] 中。
//! 作业名称来自配置的固定顺序（教学大纲顺序），ID 是页面定位该作业所需的不透明键。

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::DurableStore;

/// 单个作业
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub name: String,
    pub identifier: String,
}

impl WorkItem {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: normalize(&name.into()),
            identifier: identifier.into(),
        }
    }
}

impl Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> ID {}", self.name, self.identifier)
    }
}

/// 查找下一个作业失败的三种情况，调用方必须区分处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// 当前作业不在配置列表中
    NotFound { current: String },
    /// 当前已经是最后一个作业
    EndOfSequence { last: String },
    /// 下一个作业还没有记录ID
    Unmapped { next: String },
}

/// 作业ID目录
pub struct UnitDirectory<S> {
    store: S,
    key: String,
}

impl<S: DurableStore> UnitDirectory<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// 读取完整映射
    ///
    /// 读取失败或内容损坏都按"没有历史记录"处理。
    pub async fn entries(&self) -> BTreeMap<String, String> {
        self.load().await.unwrap_or_default()
    }

    /// 读取映射；存储读取失败时返回 None，写入方据此放弃本次写入
    ///
    /// 内容损坏按空映射处理，之后的写入会用新内容替换它。
    async fn load(&self) -> Option<BTreeMap<String, String>> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Some(BTreeMap::new()),
            Err(e) => {
                warn!("⚠️ 读取ID映射失败: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                warn!("⚠️ ID映射内容无效，按空映射处理: {}", e);
                Some(BTreeMap::new())
            }
        }
    }

    /// 写入前读取映射，读取失败时不写入，避免用空映射覆盖已有记录
    async fn load_for_update(&self) -> Option<BTreeMap<String, String>> {
        let mapping = self.load().await;
        if mapping.is_none() {
            warn!("⚠️ 无法读取已有ID映射，跳过本次记录");
        }
        mapping
    }

    async fn save(&self, mapping: &BTreeMap<String, String>) -> bool {
        let raw = match serde_json::to_string(mapping) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ 序列化ID映射失败: {}", e);
                return false;
            }
        };
        match self.store.set(&self.key, &raw).await {
            Ok(()) => {
                debug!("ID映射已保存: {:?}", mapping);
                true
            }
            Err(e) => {
                warn!("⚠️ 保存ID映射失败: {}", e);
                false
            }
        }
    }

    /// 查询单个作业的ID
    pub async fn lookup(&self, name: &str) -> Option<String> {
        self.entries().await.remove(&normalize(name))
    }

    /// 仅当该作业还没有记录时写入，返回是否发生了写入
    pub async fn record_if_absent(&self, name: &str, identifier: &str) -> bool {
        let name = normalize(name);
        let Some(mut mapping) = self.load_for_update().await else {
            return false;
        };
        if mapping.contains_key(&name) {
            return false;
        }
        mapping.insert(name.clone(), identifier.to_string());
        let written = self.save(&mapping).await;
        if written {
            info!("📝 自动记录: {} -> ID {}", name, identifier);
        }
        written
    }

    /// 手动记录，会覆盖已有的ID
    pub async fn record(&self, name: &str, identifier: &str) -> bool {
        let name = normalize(name);
        let Some(mut mapping) = self.load_for_update().await else {
            return false;
        };
        mapping.insert(name.clone(), identifier.to_string());
        let written = self.save(&mapping).await;
        if written {
            info!("📝 已记录: {} -> ID {}", name, identifier);
        }
        written
    }

    /// 批量发现：按枚举顺序对每个候选执行"不存在才写入"，返回新记录的数量
    ///
    /// 同名候选只保留第一次出现的那个。这个取舍来自观察到的页面行为，
    /// 使用前请按实际的批改安排确认。
    pub async fn discover(&self, candidates: &[WorkItem]) -> usize {
        let Some(mut mapping) = self.load_for_update().await else {
            return 0;
        };
        let mut seen = HashSet::new();
        let mut new_count = 0;

        for candidate in candidates {
            let name = normalize(&candidate.name);
            if !seen.insert(name.clone()) {
                continue;
            }
            if mapping.contains_key(&name) {
                continue;
            }
            info!("📝 记录: {} -> ID {}", name, candidate.identifier);
            mapping.insert(name, candidate.identifier.clone());
            new_count += 1;
        }

        if new_count > 0 && !self.save(&mapping).await {
            return 0;
        }
        new_count
    }

    /// 在配置顺序中查找 `current` 之后的下一个作业
    pub async fn resolve_next(
        &self,
        current: &str,
        sequence: &[String],
    ) -> Result<WorkItem, ResolveError> {
        let current = normalize(current);
        let position = sequence
            .iter()
            .position(|name| normalize(name) == current)
            .ok_or_else(|| ResolveError::NotFound {
                current: current.clone(),
            })?;

        let next = match sequence.get(position + 1) {
            Some(next) => normalize(next),
            None => return Err(ResolveError::EndOfSequence { last: current }),
        };

        match self.lookup(&next).await {
            Some(identifier) => Ok(WorkItem {
                name: next,
                identifier,
            }),
            None => Err(ResolveError::Unmapped { next }),
        }
    }

    /// 按配置顺序列出所有作业及其ID（未记录的为 None）
    pub async fn entries_in_order(&self, sequence: &[String]) -> Vec<(String, Option<String>)> {
        let mapping = self.entries().await;
        sequence
            .iter()
            .map(|name| {
                let name = normalize(name);
                let identifier = mapping.get(&name).cloned();
                (name, identifier)
            })
            .collect()
    }
}

/// 作业名称统一小写
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
