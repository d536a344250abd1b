//! 提交时间解析
//!
//! 页面上只会出现几种固定的英文措辞，这里是一个封闭文法：
//! 识别不了就返回 `None`，绝不猜测分数。

use regex::Regex;
use std::sync::OnceLock;

fn overdue_days() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"overdue by:\s*(\d+)\s+days?\b").expect("valid regex"))
}

fn late_days() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+days?\b.*late").expect("valid regex"))
}

fn any_days() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+days?\b").expect("valid regex"))
}

fn hour_unit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bhours?\b").expect("valid regex"))
}

fn day_unit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bdays?\b").expect("valid regex"))
}

/// 逾期但提取不到天数时使用的默认值
///
/// 这是有意保留的行为：改掉它会改变已有的评分结果。
pub const UNSPECIFIED_LATE_DAYS: i64 = -1;

/// 解析提交时间文本，返回带符号的天数
///
/// - 提前提交返回正数
/// - 逾期返回负数
/// - 只有小时没有天数返回 0
/// - 无法识别返回 `None`
///
/// # 示例
/// - "Assignment was submitted 52 days 21 hours early" → 52
/// - "Assignment is overdue by: 7 days 13 hours" → -7
/// - "Assignment was submitted 4 days 5 hours late" → -4
pub fn parse_submission_days(text: &str) -> Option<i64> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    if text.contains("overdue") {
        return Some(
            first_number(overdue_days(), &text)
                .map(|days| -days)
                .unwrap_or(UNSPECIFIED_LATE_DAYS),
        );
    }

    if text.contains("late") {
        return Some(
            first_number(late_days(), &text)
                .map(|days| -days)
                .unwrap_or(UNSPECIFIED_LATE_DAYS),
        );
    }

    if text.contains("early") {
        if let Some(days) = first_number(any_days(), &text) {
            return Some(days);
        }
    }

    if hour_unit().is_match(&text) && !day_unit().is_match(&text) {
        return Some(0);
    }

    None
}

fn first_number(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
