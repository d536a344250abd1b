use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 批改流程错误
    #[error("批改错误: {0}")]
    Grading(#[from] GradingError),
    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面地址无法解析
    #[error("无法解析页面地址: {url}")]
    InvalidLocation { url: String },
}

/// 批改流程错误
///
/// 全部在自动机边界处被转换为一次操作员通知并清除运行标志，
/// 不会继续向外传播。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradingError {
    /// 提交时间文本存在但无法解析
    #[error("无法解析提交时间: \"{text}\"，需要手动处理")]
    ParseFailure { text: String },
    /// 单次轮询中缺少必需的页面元素
    #[error("未找到页面元素: {element}")]
    SurfaceNotFound { element: String },
    /// 轮询次数耗尽
    #[error("等待评分表单超时 (已尝试 {attempts} 次)")]
    Timeout { attempts: u32 },
    /// 下一个作业没有记录ID
    #[error("未找到 {unit} 的ID映射，请先访问该作业页面，程序会自动记录ID")]
    UnmappedUnit { unit: String },
    /// 已经是最后一个作业
    #[error("{last} 已经是最后一个作业")]
    SequenceExhausted { last: String },
    /// 当前作业不在配置列表中
    #[error("当前作业 {unit} 不在配置列表中")]
    UnitNotInSequence { unit: String },
    /// 无法识别当前作业
    #[error("无法识别当前作业，请手动切换")]
    UnitUnidentified,
    /// 页面地址中缺少作业ID
    #[error("当前页面地址中没有作业ID")]
    MissingIdentifier,
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读取失败
    #[error("读取键 {key} 失败: {reason}")]
    ReadFailed { key: String, reason: String },
    /// 写入失败
    #[error("写入键 {key} 失败: {reason}")]
    WriteFailed { key: String, reason: String },
    /// 存储文件损坏
    #[error("存储文件 {path} 内容无效: {source}")]
    Corrupted {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 文件读写失败
    #[error("存储文件 {path} 读写失败: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 分数规则为空
    #[error("分数规则不能为空")]
    EmptyScoreRules,
    /// 分数规则未按 min_days 严格降序排列
    #[error("分数规则必须按 min_days 严格降序排列 (第 {index} 条: {min_days})")]
    UnsortedScoreRules { index: usize, min_days: i64 },
    /// 作业列表为空
    #[error("作业列表不能为空")]
    EmptyUnitSequence,
    /// 作业列表中有重复项
    #[error("作业列表中存在重复项: {name}")]
    DuplicateUnit { name: String },
    /// 轮询次数上限为 0
    #[error("最大轮询次数必须大于 0")]
    ZeroAttemptBudget,
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件 {path} 失败: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("解析配置文件 {path} 失败: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建导航错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }
}

impl GradingError {
    /// 缺少页面元素
    pub fn not_found(element: impl Into<String>) -> Self {
        GradingError::SurfaceNotFound {
            element: element.into(),
        }
    }

    /// 是否属于"本次轮询重试即可"的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, GradingError::SurfaceNotFound { .. })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_surface_not_found_is_retryable() {
        assert!(GradingError::not_found("分数输入框").is_retryable());
        assert!(!GradingError::Timeout { attempts: 60 }.is_retryable());
        assert!(!GradingError::ParseFailure {
            text: "???".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_unmapped_unit_message_tells_operator_to_visit() {
        let msg = GradingError::UnmappedUnit {
            unit: "homework9".to_string(),
        }
        .to_string();
        assert!(msg.contains("homework9"));
        assert!(msg.contains("请先访问该作业页面"));
    }
}
