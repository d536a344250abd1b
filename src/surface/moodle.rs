//! Moodle 批改页面的 [`SurfaceAdapter`] 实现
//!
//! 所有读写都通过 [`JsExecutor`] 在页面中执行，选择器与页面内批改脚本保持一致。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use url::Url;

use super::location::{query_param, UNIT_ID_PARAM};
use super::units::{candidates_from_links, identify_unit, LinkInfo, UnitSnapshot};
use super::{SurfaceAction, SurfaceAdapter};
use crate::directory::WorkItem;
use crate::error::{AppError, AppResult, BrowserError};
use crate::grading::format_score;
use crate::infrastructure::JsExecutor;

/// 在文档和同源 iframe 中查找分数输入框的 JS 函数
const FIND_GRADE_INPUT_JS: &str = r#"
    const findGradeInput = () => {
        const selectors = [
            'input[name="grade"]#id_grade',
            'input[name="grade"]',
            'input[id*="grade"]',
            'input[type="text"][name*="grade"]',
            '#id_grade'
        ];
        const search = (doc) => {
            for (const selector of selectors) {
                const element = doc.querySelector(selector);
                if (element) return element;
            }
            return null;
        };
        const found = search(document);
        if (found) return found;
        for (const iframe of document.querySelectorAll('iframe')) {
            try {
                const doc = iframe.contentDocument || iframe.contentWindow.document;
                const element = search(doc);
                if (element) return element;
            } catch (e) {
                // 跨域 iframe 无法访问
            }
        }
        return null;
    };
"#;

/// 快捷键计数器所在的全局变量
const SHORTCUT_COUNTER: &str = "__gradingAssistantShortcutPresses";

/// Moodle 页面适配器
#[derive(Clone)]
pub struct MoodleSurface {
    executor: JsExecutor,
    unit_prefix: String,
}

impl MoodleSurface {
    pub fn new(executor: JsExecutor, unit_prefix: impl Into<String>) -> Self {
        Self {
            executor,
            unit_prefix: unit_prefix.into(),
        }
    }

    async fn read_links(&self) -> AppResult<Vec<LinkInfo>> {
        self.executor
            .eval_as(
                r#"
                Array.from(document.querySelectorAll('a')).map(a => ({
                    text: (a.textContent || '').trim(),
                    href: a.href || ''
                }))
                "#,
            )
            .await
    }

    async fn eval_bool(&self, js_code: impl Into<String>) -> AppResult<bool> {
        let value = self.executor.eval(js_code).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// 注册 Ctrl+Enter 快捷键（每个页面只注册一次）
    ///
    /// 按键只会累加页面上的计数器，由宿主轮询 [`Self::take_shortcut_presses`] 处理。
    pub async fn install_shortcut(&self) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                if (window.__gradingAssistantShortcutInstalled) return false;
                window.__gradingAssistantShortcutInstalled = true;
                window.{counter} = 0;
                document.addEventListener('keydown', (e) => {{
                    if (e.ctrlKey && e.key === 'Enter') {{
                        e.preventDefault();
                        window.{counter} += 1;
                    }}
                }});
                return true;
            }})()
            "#,
            counter = SHORTCUT_COUNTER
        );
        if self.eval_bool(js_code).await? {
            info!("⌨️ 快捷键已注册: Ctrl+Enter");
        }
        Ok(())
    }

    /// 读取并清零快捷键按下次数
    pub async fn take_shortcut_presses(&self) -> AppResult<u64> {
        let js_code = format!(
            r#"
            (() => {{
                const count = window.{counter} || 0;
                window.{counter} = 0;
                return count;
            }})()
            "#,
            counter = SHORTCUT_COUNTER
        );
        let value = self.executor.eval(js_code).await?;
        Ok(value.as_u64().unwrap_or(0))
    }
}

#[async_trait]
impl SurfaceAdapter for MoodleSurface {
    async fn read_timing_text(&self) -> AppResult<Option<String>> {
        let value = self
            .executor
            .eval(
                r#"
                (() => {
                    const el = document.querySelector('.earlysubmission, .latesubmission, .ontime, .overdue');
                    return el ? el.textContent.trim() : null;
                })()
                "#,
            )
            .await?;
        let text = match value {
            JsonValue::String(text) => Some(text),
            _ => None,
        };
        debug!("提交时间文本: {:?}", text);
        Ok(text)
    }

    async fn has_score_field(&self) -> AppResult<bool> {
        self.eval_bool(format!(
            "(() => {{ {} return findGradeInput() !== null; }})()",
            FIND_GRADE_INPUT_JS
        ))
        .await
    }

    async fn write_score(&self, value: f64) -> AppResult<SurfaceAction> {
        let score = serde_json::to_string(&format_score(value))?;
        let js_code = format!(
            r#"
            (() => {{
                {find}
                const input = findGradeInput();
                if (!input) return false;
                input.value = {score};
                input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                input.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            find = FIND_GRADE_INPUT_JS,
            score = score
        );
        let found = self.eval_bool(js_code).await?;
        if found {
            info!("✏️ 已填充分数: {}", format_score(value));
        }
        Ok(SurfaceAction::from_found(found))
    }

    async fn trigger_commit_and_advance(&self) -> AppResult<SurfaceAction> {
        let found = self
            .eval_bool(
                r#"
                (() => {
                    const button = document.querySelector('button[name="saveandshownext"]');
                    if (!button) return false;
                    button.click();
                    return true;
                })()
                "#,
            )
            .await?;
        if found {
            info!("➡️ 已点击\"保存并显示下一个\"");
        }
        Ok(SurfaceAction::from_found(found))
    }

    async fn is_unit_exhausted(&self) -> AppResult<bool> {
        self.eval_bool(
            r#"
            Array.from(document.querySelectorAll('h3'))
                .some(h => (h.textContent || '').includes('No users selected'))
            "#,
        )
        .await
    }

    async fn current_unit_name(&self) -> AppResult<Option<String>> {
        let mut snapshot: UnitSnapshot = self
            .executor
            .eval_as(
                r#"
                (() => {
                    const link = document.querySelector('a[title^="Assignment:"]');
                    return { assignmentTitle: link ? link.title : null, links: [] };
                })()
                "#,
            )
            .await?;
        snapshot.links = self.read_links().await?;

        let location = self.current_location().await?;
        let current_id = query_param(&location, UNIT_ID_PARAM);
        let name = identify_unit(&self.unit_prefix, &snapshot, current_id.as_deref());
        debug!("识别到作业: {:?}", name);
        Ok(name)
    }

    async fn enumerate_candidate_units(&self) -> AppResult<Vec<WorkItem>> {
        let links = self.read_links().await?;
        let candidates = candidates_from_links(&self.unit_prefix, &links);
        debug!("找到的作业列表: {:?}", candidates);
        Ok(candidates)
    }

    async fn current_location(&self) -> AppResult<Url> {
        let href = match self.executor.current_url().await? {
            Some(href) => href,
            None => self.executor.eval_as::<String>("window.location.href").await?,
        };
        Url::parse(&href).map_err(|_| AppError::Browser(BrowserError::InvalidLocation { url: href }))
    }

    async fn navigate_to(&self, location: &Url) -> AppResult<()> {
        info!("🔀 跳转到: {}", location);
        self.executor.goto(location.as_str()).await
    }

    async fn notify(&self, message: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const old = document.getElementById('grading-assistant-toast');
                if (old) old.remove();
                const toast = document.createElement('div');
                toast.id = 'grading-assistant-toast';
                toast.textContent = {message};
                toast.style.cssText = 'position:fixed;bottom:20px;left:20px;z-index:99999;'
                    + 'background:#fff;border:2px solid #0066cc;border-radius:8px;padding:12px;'
                    + 'white-space:pre-line;font-family:Arial,sans-serif;font-size:13px;';
                document.body.appendChild(toast);
                setTimeout(() => toast.remove(), 8000);
                return true;
            }})()
            "#,
            message = serde_json::to_string(message)?
        );
        self.executor.eval(js_code).await?;
        Ok(())
    }
}
