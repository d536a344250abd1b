//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：连接浏览器、创建 JsExecutor、选择持久化存储
//! 2. **命令分发**：把命令行子命令映射到自动机操作
//! 3. **页面监听**：每次页面地址变化都丢弃旧的自动机实例，在新页面上重建
//!    （只通过持久化存储继承运行状态和作业ID目录）
//! 4. **资源管理**：持有 Browser，保证其生命周期覆盖整个运行过程

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::automaton::{GradingAutomaton, RunOutcome, Step};
use crate::browser;
use crate::cli::Command;
use crate::config::{Config, StoreBackend};
use crate::infrastructure::JsExecutor;
use crate::store::{DurableStore, FileStore, LocalStorageStore};
use crate::surface::{MoodleSurface, PageKind, SurfaceAdapter};
use crate::utils::logging::{log_run_finished, log_startup, truncate_text};

type Automaton = GradingAutomaton<MoodleSurface, Arc<dyn DurableStore>>;

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    surface: MoodleSurface,
    store: Arc<dyn DurableStore>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        // 连接浏览器
        let (browser, page) = browser::connect_to_browser_and_page(
            config.browser_debug_port,
            &config.target_url,
            &config.page_url_pattern,
        )
        .await
        .context("无法连接到浏览器，请确认浏览器以 --remote-debugging-port 启动")?;

        // 创建 JsExecutor（持有 page）
        let executor = JsExecutor::new(page);
        let surface = MoodleSurface::new(executor.clone(), config.unit_prefix.clone());

        let store: Arc<dyn DurableStore> = match config.store_backend {
            StoreBackend::LocalStorage => Arc::new(LocalStorageStore::new(executor)),
            StoreBackend::File => {
                info!("💾 使用文件存储: {}", config.store_file.display());
                Arc::new(FileStore::new(&config.store_file))
            }
        };

        Ok(Self {
            config,
            _browser: browser,
            surface,
            store,
        })
    }

    /// 为当前页面创建一个新的自动机实例
    fn automaton(&self) -> Result<Automaton> {
        let settings = self.config.automaton_settings()?;
        Ok(GradingAutomaton::new(
            self.surface.clone(),
            self.store.clone(),
            settings,
        ))
    }

    /// 执行命令
    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Watch => self.watch().await,
            Command::Start => {
                let mut automaton = self.automaton()?;
                if let Step::Finished(outcome) = automaton.start_auto_run().await {
                    report_outcome(&outcome);
                    if outcome.is_terminal() {
                        return Ok(());
                    }
                }
                self.watch().await
            }
            Command::Stop => {
                self.automaton()?.stop().await;
                Ok(())
            }
            Command::Grade => {
                let report = self.automaton()?.grade_once().await?;
                info!("✓ 已填充分数 {}", report);
                Ok(())
            }
            Command::GradeNext => {
                let report = self.automaton()?.grade_and_advance().await?;
                info!("✓ 已评分并跳转 {}", report);
                Ok(())
            }
            Command::NextUnit => {
                let next = self.automaton()?.advance_to_next_unit().await?;
                info!("✓ 已切换到 {}", next);
                Ok(())
            }
            Command::ShowMap => {
                let text = self.automaton()?.directory_text().await;
                println!("作业ID映射:\n\n{}", text);
                Ok(())
            }
            Command::Scan => {
                let new_count = self.automaton()?.scan_listing().await?;
                info!("✓ 扫描完成，新记录 {} 个作业", new_count);
                Ok(())
            }
            Command::Record => {
                let item = self.automaton()?.pin_current_unit().await?;
                info!("✓ 已记录 {}", item);
                Ok(())
            }
        }
    }

    /// 监听页面变化，直到 Ctrl-C
    async fn watch(&self) -> Result<()> {
        info!("👀 开始监听页面 (Ctrl-C 退出)");
        let mut last_location: Option<Url> = None;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("收到 Ctrl-C，退出监听");
                    return Ok(());
                }
                result = self.supervise(&mut last_location) => result?,
            }
        }
    }

    /// 一次监听周期：检查地址变化和快捷键
    async fn supervise(&self, last_location: &mut Option<Url>) -> Result<()> {
        let location = match self.surface.current_location().await {
            Ok(location) => location,
            Err(e) => {
                // 页面跳转过程中执行上下文会短暂失效
                debug!("读取页面地址失败: {}", e);
                sleep(self.watch_interval()).await;
                return Ok(());
            }
        };

        if last_location.as_ref() != Some(&location) {
            *last_location = Some(location.clone());
            info!("🔄 检测到页面变化: {}", location);
            sleep(Duration::from_millis(self.config.resume_delay_ms)).await;
            self.on_page_load(&location).await?;
        } else if PageKind::classify(&location) == PageKind::Grader {
            self.handle_shortcut().await?;
        }

        sleep(self.watch_interval()).await;
        Ok(())
    }

    /// 新页面加载：相当于页面脚本的初始化
    async fn on_page_load(&self, location: &Url) -> Result<()> {
        let mut automaton = self.automaton()?;
        match PageKind::classify(location) {
            PageKind::CourseListing => {
                info!("📚 检测到课程页面，扫描作业...");
                if let Err(e) = automaton.scan_listing().await {
                    warn!("⚠️ 扫描作业失败: {}", e);
                }
            }
            PageKind::Grader => {
                if let Err(e) = automaton.record_current_unit().await {
                    debug!("无法记录当前作业: {}", e);
                }
                if let Err(e) = self.surface.install_shortcut().await {
                    warn!("⚠️ 注册快捷键失败: {}", e);
                }
                let outcome = automaton.resume().await;
                report_outcome(&outcome);
            }
            PageKind::Other => {
                debug!("不在批改页面（action != grader），跳过");
            }
        }
        Ok(())
    }

    /// 处理 Ctrl+Enter：评分并跳转下一个
    async fn handle_shortcut(&self) -> Result<()> {
        let presses = match self.surface.take_shortcut_presses().await {
            Ok(presses) => presses,
            Err(e) => {
                debug!("读取快捷键状态失败: {}", e);
                return Ok(());
            }
        };
        if presses == 0 {
            return Ok(());
        }
        info!("⌨️ Ctrl+Enter: 评分并跳转下一个");
        let mut automaton = self.automaton()?;
        // 失败已通过页面通知操作员，这里不中断监听
        if let Ok(report) = automaton.grade_and_advance().await {
            info!("✓ {}", truncate_text(&report.to_string(), 120));
        }
        Ok(())
    }

    fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.config.page_watch_interval_ms)
    }
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Idle => debug!("没有进行中的自动批改"),
        RunOutcome::Navigated => debug!("页面已跳转，在新页面上继续"),
        RunOutcome::CrossedUnit { to } => info!("➡️ 已切换到下一个作业: {}", to),
        RunOutcome::Completed { last } => {
            log_run_finished(&format!("🎉 所有作业批改完成！最后一个作业: {}", last))
        }
        RunOutcome::Stopped(reason) => log_run_finished(&format!("🛑 自动批改结束: {}", reason)),
    }
}
