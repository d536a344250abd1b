//! 评分能力：提交时间解析 + 分数规则
//!
//! 两者都是纯函数，不会失败；所有"失败时怎么办"的决定都交给自动机。

pub mod rules;
pub mod timing;

pub use rules::{format_score, ScoreRule, ScoreRules};
pub use timing::{parse_submission_days, UNSPECIFIED_LATE_DAYS};

use std::fmt::Display;

/// 一次轮询读到的提交时间（每次重新计算，不缓存）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTiming {
    pub raw_text: String,
    pub day_offset: Option<i64>,
}

impl SubmissionTiming {
    pub fn from_text(raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let day_offset = parse_submission_days(&raw_text);
        Self {
            raw_text,
            day_offset,
        }
    }
}

/// 一次评分的结果
#[derive(Debug, Clone, PartialEq)]
pub struct GradeReport {
    pub text: String,
    pub days: i64,
    pub score: f64,
}

impl Display for GradeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[天数 {} 分数 {}] {}",
            self.days,
            format_score(self.score),
            self.text
        )
    }
}
