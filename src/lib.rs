//! # Moodle Grading Assistant
//!
//! 连接已打开的浏览器，在 Moodle 批改页面上根据提交时间自动评分，
//! 逐个学生保存并跳转，当前作业批改完后切换到下一个作业。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//!
//! ### ② 适配层（Surface / Store）
//! - `surface/` - 批改页面的读写能力（`SurfaceAdapter`），Moodle 的具体实现
//! - `store/` - 跨页面持久化的键值存储（localStorage / 文件 / 内存）
//!
//! ### ③ 业务层（Grading / Directory）
//! - `grading/` - 提交时间解析、分数规则
//! - `directory/` - 作业名称到作业ID的映射，计算下一个作业
//!
//! ### ④ 流程层（Automaton）
//! - `automaton/` - 自动批改状态机：轮询、评分、提交、切换作业
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/` - 命令分发，监听页面变化并在新页面上重建状态机
//!
//! ## 模块结构

pub mod automaton;
pub mod browser;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod grading;
pub mod infrastructure;
pub mod orchestrator;
pub mod store;
pub mod surface;
pub mod utils;

// 重新导出常用类型
pub use automaton::{GradingAutomaton, RunOutcome, StopReason};
pub use browser::connect_to_browser_and_page;
pub use config::Config;
pub use directory::{UnitDirectory, WorkItem};
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use orchestrator::App;
