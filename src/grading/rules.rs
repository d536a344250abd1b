//! 分数规则引擎

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 单条分数规则：提前天数 >= `min_days` 时给 `score` 分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRule {
    pub min_days: i64,
    pub score: f64,
}

impl ScoreRule {
    pub const fn new(min_days: i64, score: f64) -> Self {
        Self { min_days, score }
    }
}

/// 按 `min_days` 严格降序排列的规则序列，最后一条是兜底规则
///
/// 只能通过 [`ScoreRules::new`] 构造，所以空规则和乱序规则在启动时就会被拒绝。
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRules {
    rules: Vec<ScoreRule>,
}

impl ScoreRules {
    pub fn new(rules: Vec<ScoreRule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::EmptyScoreRules);
        }
        for (index, pair) in rules.windows(2).enumerate() {
            if pair[1].min_days >= pair[0].min_days {
                return Err(ConfigError::UnsortedScoreRules {
                    index: index + 1,
                    min_days: pair[1].min_days,
                });
            }
        }
        Ok(Self { rules })
    }

    /// 根据提交天数计算分数
    ///
    /// 返回第一条 `min_days <= days` 的规则分数；都不满足时使用最后一条。
    pub fn score(&self, days: i64) -> f64 {
        self.rules
            .iter()
            .find(|rule| days >= rule.min_days)
            .unwrap_or_else(|| self.floor())
            .score
    }

    fn floor(&self) -> &ScoreRule {
        // new() 保证非空
        &self.rules[self.rules.len() - 1]
    }

    pub fn rules(&self) -> &[ScoreRule] {
        &self.rules
    }
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            rules: vec![
                ScoreRule::new(40, 100.0),
                ScoreRule::new(20, 95.0),
                ScoreRule::new(0, 90.0),
            ],
        }
    }
}

/// 分数写入页面时的格式（保留两位小数）
pub fn format_score(score: f64) -> String {
    format!("{:.2}", score)
}
