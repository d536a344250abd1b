//! 程序配置
//!
//! 三层叠加：默认值 → TOML 配置文件（可选，字段都可省略）→ 环境变量。
//! 加载完成后统一校验，配置错误在启动时暴露，不会拖到批改过程中。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::automaton::{AutomatonSettings, PollPolicy};
use crate::error::ConfigError;
use crate::grading::{ScoreRule, ScoreRules};

/// 持久化存储后端
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// 页面的 localStorage，与页面内脚本共享
    LocalStorage,
    /// 本地 JSON 文件
    File,
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 找不到已打开的 Moodle 页面时打开的地址
    pub target_url: String,
    /// 用于识别 Moodle 标签页的地址片段
    pub page_url_pattern: String,
    /// 分数规则（按 min_days 降序）
    pub score_rules: Vec<ScoreRule>,
    /// 需要批改的作业列表（按顺序）
    pub unit_sequence: Vec<String>,
    /// 作业名称前缀，页面链接按 "<前缀><编号>" 识别
    pub unit_prefix: String,
    /// 轮询间隔
    pub poll_interval_ms: u64,
    /// 最大轮询次数
    pub max_poll_attempts: u32,
    /// 写入分数后的固定等待
    pub settle_delay_ms: u64,
    /// 新页面加载后开始处理前的等待
    pub resume_delay_ms: u64,
    /// 检查页面地址变化的间隔
    pub page_watch_interval_ms: u64,
    /// 作业ID映射的存储键
    pub directory_key: String,
    /// 自动批改状态的存储键
    pub active_key: String,
    pub store_backend: StoreBackend,
    /// `StoreBackend::File` 使用的文件
    pub store_file: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 2001,
            target_url: "https://moodle.maynoothuniversity.ie/my/".to_string(),
            page_url_pattern: "moodle".to_string(),
            score_rules: ScoreRules::default().rules().to_vec(),
            unit_sequence: (8..=14).map(|n| format!("homework{}", n)).collect(),
            unit_prefix: "homework".to_string(),
            poll_interval_ms: 1000,
            max_poll_attempts: 60,
            settle_delay_ms: 300,
            resume_delay_ms: 800,
            page_watch_interval_ms: 1000,
            directory_key: "moodle_homework_id_mapping".to_string(),
            active_key: "moodle_auto_grading_active".to_string(),
            store_backend: StoreBackend::LocalStorage,
            store_file: PathBuf::from("grading_state.json"),
            verbose_logging: false,
        }
    }
}

/// 配置文件内容，所有字段可省略
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    browser_debug_port: Option<u16>,
    target_url: Option<String>,
    page_url_pattern: Option<String>,
    score_rules: Option<Vec<ScoreRule>>,
    unit_sequence: Option<Vec<String>>,
    unit_prefix: Option<String>,
    poll_interval_ms: Option<u64>,
    max_poll_attempts: Option<u32>,
    settle_delay_ms: Option<u64>,
    resume_delay_ms: Option<u64>,
    page_watch_interval_ms: Option<u64>,
    directory_key: Option<String>,
    active_key: Option<String>,
    store_backend: Option<StoreBackend>,
    store_file: Option<PathBuf>,
    verbose_logging: Option<bool>,
}

macro_rules! overlay {
    ($target:expr, $source:expr, $($field:ident),+ $(,)?) => {
        $(if let Some(value) = $source.$field { $target.$field = value; })+
    };
}

impl Config {
    /// 加载配置：文件不存在时只使用默认值和环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            if path.exists() {
                config.apply_file(path)?;
            }
        }
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_toml(&content, path)
    }

    fn apply_toml(&mut self, content: &str, path: &Path) -> Result<(), ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;
        overlay!(
            self,
            file,
            browser_debug_port,
            target_url,
            page_url_pattern,
            score_rules,
            unit_sequence,
            unit_prefix,
            poll_interval_ms,
            max_poll_attempts,
            settle_delay_ms,
            resume_delay_ms,
            page_watch_interval_ms,
            directory_key,
            active_key,
            store_backend,
            store_file,
            verbose_logging,
        );
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse("BROWSER_DEBUG_PORT", "u16")? {
            self.browser_debug_port = v;
        }
        if let Ok(v) = std::env::var("TARGET_URL") {
            self.target_url = v;
        }
        if let Some(v) = env_parse("POLL_INTERVAL_MS", "u64")? {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("MAX_POLL_ATTEMPTS", "u32")? {
            self.max_poll_attempts = v;
        }
        if let Some(v) = env_parse("SETTLE_DELAY_MS", "u64")? {
            self.settle_delay_ms = v;
        }
        if let Ok(v) = std::env::var("UNIT_SEQUENCE") {
            self.unit_sequence = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("STORE_FILE") {
            self.store_backend = StoreBackend::File;
            self.store_file = PathBuf::from(v);
        }
        if let Some(v) = env_parse("VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        Ok(())
    }

    /// 启动时校验
    pub fn validate(&self) -> Result<(), ConfigError> {
        ScoreRules::new(self.score_rules.clone())?;
        if self.unit_sequence.is_empty() {
            return Err(ConfigError::EmptyUnitSequence);
        }
        let mut seen = HashSet::new();
        for name in &self.unit_sequence {
            if !seen.insert(name.trim().to_lowercase()) {
                return Err(ConfigError::DuplicateUnit { name: name.clone() });
            }
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::ZeroAttemptBudget);
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn automaton_settings(&self) -> Result<AutomatonSettings, ConfigError> {
        Ok(AutomatonSettings {
            rules: ScoreRules::new(self.score_rules.clone())?,
            sequence: self.unit_sequence.clone(),
            policy: self.poll_policy(),
            directory_key: self.directory_key.clone(),
            active_key: self.active_key.clone(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
