//! 批改自动机 - 流程层
//!
//! 每次轮询都重新读取页面状态，然后决定：等待、评分、在作业内前进、
//! 跨作业跳转或停止。页面跳转会销毁实例，跨实例只依赖持久化存储中的
//! 运行标志和作业ID目录。

pub mod state;

pub use state::{AutomatonState, RunOutcome, StopReason, Step};

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::directory::{ResolveError, UnitDirectory, WorkItem};
use crate::error::{AppError, AppResult, GradingError};
use crate::grading::{format_score, GradeReport, ScoreRules, SubmissionTiming};
use crate::store::{ActiveFlag, DurableStore};
use crate::surface::location::UNIT_ID_PARAM;
use crate::surface::{next_unit_location, query_param, SurfaceAction, SurfaceAdapter};

/// 轮询策略
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// 两次轮询之间的间隔
    pub interval: Duration,
    /// 等待页面元素的最大轮询次数
    pub max_attempts: u32,
    /// 写入分数后、点击保存前的固定等待
    pub settle_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
            settle_delay: Duration::from_millis(300),
        }
    }
}

/// 构造自动机所需的配置
#[derive(Debug, Clone)]
pub struct AutomatonSettings {
    pub rules: ScoreRules,
    /// 按顺序批改的作业名称
    pub sequence: Vec<String>,
    pub policy: PollPolicy,
    pub directory_key: String,
    pub active_key: String,
}

/// 批改自动机
pub struct GradingAutomaton<A, S> {
    surface: A,
    directory: UnitDirectory<S>,
    flag: ActiveFlag<S>,
    rules: ScoreRules,
    sequence: Vec<String>,
    policy: PollPolicy,
    state: AutomatonState,
    attempts: u32,
    /// 本实例创建时的页面地址，地址变化即视为实例被销毁
    origin: Option<Url>,
    /// 上一次提交的学生，页面换到下一个学生之前不再评分
    last_commit: Option<CommitMark>,
}

/// 提交时页面上的学生：地址加提交时间文本
#[derive(Debug, Clone, PartialEq)]
struct CommitMark {
    location: Option<Url>,
    text: String,
}

impl<A, S> GradingAutomaton<A, S>
where
    A: SurfaceAdapter,
    S: DurableStore + Clone,
{
    pub fn new(surface: A, store: S, settings: AutomatonSettings) -> Self {
        Self {
            surface,
            directory: UnitDirectory::new(store.clone(), settings.directory_key),
            flag: ActiveFlag::new(store, settings.active_key),
            rules: settings.rules,
            sequence: settings.sequence,
            policy: settings.policy,
            state: AutomatonState::Idle,
            attempts: 0,
            origin: None,
            last_commit: None,
        }
    }

    pub fn state(&self) -> AutomatonState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn directory(&self) -> &UnitDirectory<S> {
        &self.directory
    }

    pub async fn is_active(&self) -> bool {
        self.flag.is_active().await
    }

    fn enter(&mut self, next: AutomatonState) {
        if self.state != next {
            debug!("状态: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    // ========== 自动批改 ==========

    /// 新页面加载后调用：运行标志开启时继续自动批改
    pub async fn resume(&mut self) -> RunOutcome {
        if !self.flag.is_active().await {
            return RunOutcome::Idle;
        }
        info!("🤖 检测到自动批改进行中，继续...");
        self.run().await
    }

    /// 开启自动批改并立即执行一次轮询（通常是一次"评分并前进"）
    ///
    /// 之后的轮询交给 [`Self::run`]。
    pub async fn start_auto_run(&mut self) -> Step {
        info!("🚀 启动自动批改模式");
        self.flag.activate().await;
        self.attempts = 0;
        self.capture_origin().await;
        self.enter(AutomatonState::AwaitingSurface);
        self.tick().await
    }

    /// 停止自动批改（协作式：进行中的轮询在下一次检查时退出）
    pub async fn stop(&mut self) {
        self.flag.clear().await;
        self.enter(AutomatonState::Stopped);
        info!("🛑 自动批改已停止");
        self.announce("自动批改已停止").await;
    }

    /// 轮询直到本次运行结束或页面跳转
    pub async fn run(&mut self) -> RunOutcome {
        if self.origin.is_none() {
            self.capture_origin().await;
        }
        if matches!(self.state, AutomatonState::Idle | AutomatonState::Stopped) {
            self.attempts = 0;
            self.enter(AutomatonState::AwaitingSurface);
        }
        loop {
            match self.tick().await {
                Step::Continue => sleep(self.policy.interval).await,
                Step::Finished(outcome) => return outcome,
            }
        }
    }

    /// 执行一次轮询
    pub async fn tick(&mut self) -> Step {
        if !self.flag.is_active().await {
            debug!("运行标志已清除");
            return Step::Finished(self.halt(StopReason::Cancelled).await);
        }

        if self.location_changed().await {
            debug!("页面地址已变化，交给新页面继续");
            self.enter(AutomatonState::Idle);
            return Step::Finished(RunOutcome::Navigated);
        }

        self.enter(AutomatonState::AwaitingSurface);

        match self.surface.is_unit_exhausted().await {
            Ok(true) => return Step::Finished(self.cross_unit().await),
            Ok(false) => {}
            Err(e) => return self.miss("页面", Some(e)).await,
        }

        let ready = match self.surface.has_score_field().await {
            Ok(ready) => ready,
            Err(e) => return self.miss("分数输入框", Some(e)).await,
        };
        if !ready {
            return self.miss("分数输入框", None).await;
        }
        let text = match self.surface.read_timing_text().await {
            Ok(Some(text)) => text,
            Ok(None) => return self.miss("提交时间", None).await,
            Err(e) => return self.miss("提交时间", Some(e)).await,
        };

        let mark = CommitMark {
            location: self.surface.current_location().await.ok(),
            text,
        };
        if self.last_commit.as_ref() == Some(&mark) {
            // 保存后页面还停留在刚提交的学生上
            return self.miss("下一个学生", None).await;
        }

        self.enter(AutomatonState::Grading);
        match self.grade_and_commit(&mark.text).await {
            Ok(report) => {
                info!("✓ 自动批改 {}", report);
                self.last_commit = Some(mark);
                self.attempts = 0;
                self.enter(AutomatonState::Advancing);
                Step::Continue
            }
            Err(AppError::Grading(e)) if e.is_retryable() => {
                self.miss(&e.to_string(), None).await
            }
            Err(AppError::Grading(e)) => {
                Step::Finished(self.halt(StopReason::Failed(e)).await)
            }
            Err(e) => self.miss("页面", Some(e)).await,
        }
    }

    /// 本次轮询没有找到必需元素：计数，超过上限则超时停止
    async fn miss(&mut self, element: &str, cause: Option<AppError>) -> Step {
        self.attempts += 1;
        if let Some(cause) = cause {
            warn!("⚠️ 读取页面失败: {}", cause);
        }
        debug!(
            "正在查找{}... ({}/{})",
            element, self.attempts, self.policy.max_attempts
        );
        if self.attempts >= self.policy.max_attempts {
            let attempts = self.attempts;
            return Step::Finished(
                self.halt(StopReason::Failed(GradingError::Timeout { attempts }))
                    .await,
            );
        }
        self.enter(AutomatonState::AwaitingSurface);
        Step::Continue
    }

    /// 当前作业没有学生了：找下一个作业并跳转
    async fn cross_unit(&mut self) -> RunOutcome {
        self.enter(AutomatonState::UnitExhausted);
        info!("📭 检测到\"No users selected\"，当前作业批改完成");

        let current = match self.surface.current_unit_name().await {
            Ok(Some(name)) => name,
            Ok(None) => return self.halt(StopReason::Failed(GradingError::UnitUnidentified)).await,
            Err(e) => return self.halt(StopReason::Browser(e.to_string())).await,
        };

        let next = match self.directory.resolve_next(&current, &self.sequence).await {
            Ok(next) => next,
            Err(ResolveError::EndOfSequence { last }) => return self.complete(last).await,
            Err(ResolveError::Unmapped { next }) => {
                return self
                    .halt(StopReason::Failed(GradingError::UnmappedUnit { unit: next }))
                    .await
            }
            Err(ResolveError::NotFound { current }) => {
                return self
                    .halt(StopReason::Failed(GradingError::UnitNotInSequence {
                        unit: current,
                    }))
                    .await
            }
        };

        self.enter(AutomatonState::CrossingUnit);
        let message = format!("当前作业批改完成！\n即将切换到: {}\n自动批改将继续...", next.name);
        self.announce(&message).await;

        match self.navigate_to_unit(&next).await {
            Ok(()) => {
                self.enter(AutomatonState::Idle);
                RunOutcome::CrossedUnit { to: next }
            }
            Err(e) => self.halt(StopReason::Browser(e.to_string())).await,
        }
    }

    async fn navigate_to_unit(&self, next: &WorkItem) -> AppResult<()> {
        let location = self.surface.current_location().await?;
        let target = next_unit_location(&location, &next.identifier);
        self.surface.navigate_to(&target).await
    }

    /// 停止运行：清除运行标志并通知操作员
    async fn halt(&mut self, reason: StopReason) -> RunOutcome {
        self.flag.clear().await;
        self.enter(AutomatonState::Stopped);
        match &reason {
            StopReason::Cancelled => {
                info!("🛑 {}", reason);
                self.announce(&reason.to_string()).await;
            }
            _ => {
                error!("❌ 自动批改中止: {}", reason);
                self.announce(&format!("自动批改已中止\n\n{}", reason)).await;
            }
        }
        RunOutcome::Stopped(reason)
    }

    /// 最后一个作业完成：正常结束
    async fn complete(&mut self, last: String) -> RunOutcome {
        self.flag.clear().await;
        self.enter(AutomatonState::Stopped);
        info!("🎉 所有作业批改完成！(最后一个: {})", last);
        self.announce("所有作业批改完成！").await;
        RunOutcome::Completed { last }
    }

    async fn announce(&self, message: &str) {
        if let Err(e) = self.surface.notify(message).await {
            warn!("⚠️ 显示通知失败: {}", e);
        }
    }

    async fn capture_origin(&mut self) {
        self.origin = self.surface.current_location().await.ok();
    }

    async fn location_changed(&self) -> bool {
        match (&self.origin, self.surface.current_location().await) {
            (Some(origin), Ok(location)) => *origin != location,
            _ => false,
        }
    }

    // ========== 评分 ==========

    /// 解析提交时间并计算分数
    pub fn evaluate(&self, text: &str) -> Result<GradeReport, GradingError> {
        let timing = SubmissionTiming::from_text(text);
        let days = timing.day_offset.ok_or_else(|| GradingError::ParseFailure {
            text: timing.raw_text.clone(),
        })?;
        let score = self.rules.score(days);
        debug!("计算结果 - 天数: {} 分数: {}", days, format_score(score));
        Ok(GradeReport {
            text: timing.raw_text,
            days,
            score,
        })
    }

    async fn read_report(&self) -> AppResult<GradeReport> {
        let text = self
            .surface
            .read_timing_text()
            .await?
            .ok_or_else(|| GradingError::not_found("提交时间"))?;
        Ok(self.evaluate(&text)?)
    }

    async fn write(&self, report: &GradeReport) -> AppResult<()> {
        match self.surface.write_score(report.score).await? {
            SurfaceAction::Done => Ok(()),
            SurfaceAction::NotFound => Err(GradingError::not_found("分数输入框").into()),
        }
    }

    /// 写分 → 固定等待 → 保存并显示下一个
    ///
    /// 等待期间不检查停止请求，避免和页面自身的异步更新抢跑。
    async fn grade_and_commit(&self, text: &str) -> AppResult<GradeReport> {
        let report = self.evaluate(text)?;
        self.write(&report).await?;
        sleep(self.policy.settle_delay).await;
        match self.surface.trigger_commit_and_advance().await? {
            SurfaceAction::Done => Ok(report),
            SurfaceAction::NotFound => {
                Err(GradingError::not_found("\"保存并显示下一个\"按钮").into())
            }
        }
    }

    // ========== 手动操作 ==========

    /// 仅填充分数，不提交
    pub async fn grade_once(&mut self) -> AppResult<GradeReport> {
        let result = async {
            let report = self.read_report().await?;
            self.write(&report).await?;
            Ok::<_, AppError>(report)
        }
        .await;
        self.report_manual("填充分数", result).await
    }

    /// 评分并跳转到下一个学生（单次，不进入轮询）
    pub async fn grade_and_advance(&mut self) -> AppResult<GradeReport> {
        self.enter(AutomatonState::Grading);
        let result = match self.surface.read_timing_text().await {
            Ok(Some(text)) => self.grade_and_commit(&text).await,
            Ok(None) => Err(GradingError::not_found("提交时间").into()),
            Err(e) => Err(e),
        };
        if result.is_ok() {
            self.enter(AutomatonState::Advancing);
        }
        self.enter(AutomatonState::Idle);
        self.report_manual("评分并跳转", result).await
    }

    /// 手动切换到下一个作业
    pub async fn advance_to_next_unit(&mut self) -> AppResult<WorkItem> {
        let result = async {
            let current = self
                .surface
                .current_unit_name()
                .await?
                .ok_or(GradingError::UnitUnidentified)?;
            let next = self
                .directory
                .resolve_next(&current, &self.sequence)
                .await
                .map_err(|e| match e {
                    ResolveError::NotFound { current } => {
                        GradingError::UnitNotInSequence { unit: current }
                    }
                    ResolveError::EndOfSequence { last } => GradingError::SequenceExhausted { last },
                    ResolveError::Unmapped { next } => GradingError::UnmappedUnit { unit: next },
                })?;
            info!("➡️ 切换到: {}", next);
            self.navigate_to_unit(&next).await?;
            Ok::<_, AppError>(next)
        }
        .await;
        self.report_manual("切换作业", result).await
    }

    async fn report_manual<T>(&self, action: &str, result: AppResult<T>) -> AppResult<T> {
        if let Err(e) = &result {
            warn!("⚠️ {}失败: {}", action, e);
            self.announce(&format!("{}失败\n\n{}", action, e)).await;
        }
        result
    }

    // ========== 作业ID目录 ==========

    /// 访问作业页面时自动记录其ID（已有记录则不覆盖）
    pub async fn record_current_unit(&self) -> AppResult<Option<WorkItem>> {
        let Some(item) = self.current_unit().await? else {
            return Ok(None);
        };
        self.directory
            .record_if_absent(&item.name, &item.identifier)
            .await;
        Ok(Some(item))
    }

    /// 手动记录当前作业ID（覆盖已有记录）
    pub async fn pin_current_unit(&self) -> AppResult<WorkItem> {
        let item = self
            .current_unit()
            .await?
            .ok_or(GradingError::UnitUnidentified)?;
        self.directory.record(&item.name, &item.identifier).await;
        self.announce(&format!("已记录: {}", item)).await;
        Ok(item)
    }

    async fn current_unit(&self) -> AppResult<Option<WorkItem>> {
        let Some(name) = self.surface.current_unit_name().await? else {
            return Ok(None);
        };
        let location = self.surface.current_location().await?;
        match query_param(&location, UNIT_ID_PARAM) {
            Some(identifier) => Ok(Some(WorkItem::new(name, identifier))),
            None => Err(GradingError::MissingIdentifier.into()),
        }
    }

    /// 扫描课程页面上的作业链接并记录新发现的ID
    pub async fn scan_listing(&self) -> AppResult<usize> {
        info!("🔍 扫描课程页面的作业...");
        let candidates = self.surface.enumerate_candidate_units().await?;
        if candidates.is_empty() {
            info!("未找到任何作业");
            return Ok(0);
        }
        let new_count = self.directory.discover(&candidates).await;
        if new_count > 0 {
            info!("✓ 成功记录 {} 个作业ID", new_count);
            let listing = self.directory_text().await;
            self.announce(&format!(
                "已记录 {} 个作业ID！\n\n{}\n\n现在可以开始批改，程序会自动切换作业。",
                new_count, listing
            ))
            .await;
        } else {
            info!("所有作业ID已记录");
        }
        Ok(new_count)
    }

    /// 按配置顺序列出作业ID
    pub async fn directory_listing(&self) -> Vec<(String, Option<String>)> {
        self.directory.entries_in_order(&self.sequence).await
    }

    /// 作业ID映射的文本形式，用于展示
    pub async fn directory_text(&self) -> String {
        let listing = self.directory_listing().await;
        let lines: Vec<String> = listing
            .iter()
            .map(|(name, id)| match id {
                Some(id) => format!("{}: {}", name, id),
                None => format!("{}: (未记录)", name),
            })
            .collect();
        if lines.is_empty() {
            "暂无ID映射记录".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests;
