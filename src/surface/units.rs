//! 从页面链接中识别作业
//!
//! JS 只负责把原始数据（链接文本、href、标题）搬回来，识别逻辑都在这里，方便测试。

use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::location::{query_param, UNIT_ID_PARAM};
use crate::directory::WorkItem;

/// 页面上的一个链接
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkInfo {
    pub text: String,
    pub href: String,
}

/// 识别当前作业所需的页面快照
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSnapshot {
    /// 面包屑中 `title` 以 "Assignment:" 开头的链接标题
    pub assignment_title: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkInfo>,
}

fn unit_pattern(prefix: &str) -> Option<Regex> {
    Regex::new(&format!("{}(\\d+)", regex::escape(&prefix.to_lowercase()))).ok()
}

/// 从文本中提取作业名称，例如 "Homework8 - essay" → "homework8"（前缀和数字之间不能有空格）
pub fn unit_name_from_text(prefix: &str, text: &str) -> Option<String> {
    let re = unit_pattern(prefix)?;
    let lower = text.to_lowercase();
    let caps = re.captures(&lower)?;
    Some(format!("{}{}", prefix.to_lowercase(), &caps[1]))
}

fn identifier_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    query_param(&url, UNIT_ID_PARAM).filter(|id| !id.is_empty())
}

/// 把页面链接转换为候选作业，保持枚举顺序；没有 `id` 参数的链接跳过
pub fn candidates_from_links(prefix: &str, links: &[LinkInfo]) -> Vec<WorkItem> {
    links
        .iter()
        .filter_map(|link| {
            let name = unit_name_from_text(prefix, &link.text)?;
            let identifier = identifier_from_href(&link.href)?;
            Some(WorkItem::new(name, identifier))
        })
        .collect()
}

/// 识别当前作业，依次尝试：
/// 1. 面包屑链接标题 "Assignment: homework8"
/// 2. 列表中 `id` 与当前地址相同的链接
/// 3. 第一个文本匹配的链接
pub fn identify_unit(prefix: &str, snapshot: &UnitSnapshot, current_id: Option<&str>) -> Option<String> {
    if let Some(name) = snapshot
        .assignment_title
        .as_deref()
        .and_then(|title| unit_name_from_text(prefix, title))
    {
        return Some(name);
    }

    if let Some(current_id) = current_id {
        if let Some(item) = candidates_from_links(prefix, &snapshot.links)
            .into_iter()
            .find(|item| item.identifier == current_id)
        {
            return Some(item.name);
        }
    }

    snapshot
        .links
        .iter()
        .find_map(|link| unit_name_from_text(prefix, &link.text))
}
