//! 页面适配层 - 端口层
//!
//! 自动机只通过 [`SurfaceAdapter`] 读写宿主页面。页面会在两次轮询之间被外部脚本
//! 或用户任意修改，所以这里的每个方法都重新读取页面，不缓存任何结果。

pub mod location;
pub mod moodle;
pub mod units;

pub use location::{next_unit_location, query_param, PageKind};
pub use moodle::MoodleSurface;
pub use units::{candidates_from_links, identify_unit, unit_name_from_text, LinkInfo, UnitSnapshot};

use async_trait::async_trait;
use url::Url;

use crate::directory::WorkItem;
use crate::error::AppResult;

/// 写入/点击这类操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceAction {
    Done,
    NotFound,
}

impl SurfaceAction {
    pub fn from_found(found: bool) -> Self {
        if found {
            SurfaceAction::Done
        } else {
            SurfaceAction::NotFound
        }
    }
}

/// 宿主页面能力
///
/// `Err` 只表示与页面通信失败（例如浏览器断开）；元素不存在用 `None` /
/// [`SurfaceAction::NotFound`] 表示。
#[async_trait]
pub trait SurfaceAdapter: Send + Sync {
    /// 提交时间文本
    async fn read_timing_text(&self) -> AppResult<Option<String>>;

    /// 分数输入框是否已经出现
    async fn has_score_field(&self) -> AppResult<bool>;

    async fn write_score(&self, value: f64) -> AppResult<SurfaceAction>;

    /// 点击"保存并显示下一个"
    async fn trigger_commit_and_advance(&self) -> AppResult<SurfaceAction>;

    /// 当前作业是否已经没有学生（固定提示语）
    async fn is_unit_exhausted(&self) -> AppResult<bool>;

    async fn current_unit_name(&self) -> AppResult<Option<String>>;

    /// 从列表页的链接中枚举作业
    async fn enumerate_candidate_units(&self) -> AppResult<Vec<WorkItem>>;

    async fn current_location(&self) -> AppResult<Url>;

    async fn navigate_to(&self, location: &Url) -> AppResult<()>;

    /// 向操作员显示一条通知
    async fn notify(&self, message: &str) -> AppResult<()>;
}
