//! 页面地址相关的纯函数

use url::Url;

/// 作业ID所在的查询参数
pub const UNIT_ID_PARAM: &str = "id";
/// 学生选择参数，切换作业时必须清掉
pub const STUDENT_PARAM: &str = "userid";

/// 页面类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// 课程页面，包含所有作业的链接
    CourseListing,
    /// 批改页面
    Grader,
    Other,
}

impl PageKind {
    pub fn classify(url: &Url) -> Self {
        let path = url.path();
        if path.contains("/course/view.php") {
            return PageKind::CourseListing;
        }
        if path.contains("/mod/assign/view.php")
            && query_param(url, "action").as_deref() == Some("grader")
        {
            return PageKind::Grader;
        }
        PageKind::Other
    }
}

/// 读取查询参数
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// 构造下一个作业的地址：替换作业ID、去掉学生参数，其余参数保持不变
pub fn next_unit_location(base: &Url, identifier: &str) -> Url {
    let pairs: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != UNIT_ID_PARAM && key != STUDENT_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = base.clone();
    next.set_fragment(None);
    {
        let mut query = next.query_pairs_mut();
        query.clear();
        query.append_pair(UNIT_ID_PARAM, identifier);
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
    }
    next
}
