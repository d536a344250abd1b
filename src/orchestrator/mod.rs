//! 编排层（Orchestration Layer）
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::App (命令分发、页面监听)
//!     ↓
//! automaton::GradingAutomaton (每个页面一个实例)
//!     ↓
//! grading / directory (解析、评分、作业ID目录)
//!     ↓
//! surface / store (页面适配、持久化存储)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```

pub mod app;

pub use app::App;
