use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::*;
use crate::grading::ScoreRule;
use crate::store::MemoryStore;

const DIRECTORY_KEY: &str = "moodle_homework_id_mapping";
const ACTIVE_KEY: &str = "moodle_auto_grading_active";

/// 模拟的批改页面
///
/// `students` 是待批改学生的提交时间文本，保存一次弹出一个；
/// 学生为空时页面显示 "No users selected"。
#[derive(Default)]
struct FakePage {
    students: VecDeque<String>,
    /// 前 N 次检查时分数输入框还没加载出来
    field_delay: u32,
    field_checks: u32,
    unit: Option<String>,
    location: Option<Url>,
    candidates: Vec<WorkItem>,
    /// 保存后页面地址变成这个
    location_after_commit: Option<Url>,
    /// 保存后页面仍停留在当前学生上（页面响应慢）
    stuck_after_commit: bool,
    written: Vec<f64>,
    commits: u32,
    navigations: Vec<Url>,
    notices: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeSurface {
    page: Arc<Mutex<FakePage>>,
}

impl FakeSurface {
    fn grader(unit: &str, id: &str, students: &[&str]) -> Self {
        let page = FakePage {
            students: students.iter().map(|s| s.to_string()).collect(),
            unit: Some(unit.to_string()),
            location: Some(
                Url::parse(&format!(
                    "https://moodle.example.ie/mod/assign/view.php?id={}&action=grader&userid=5",
                    id
                ))
                .unwrap(),
            ),
            ..Default::default()
        };
        Self {
            page: Arc::new(Mutex::new(page)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakePage) -> R) -> R {
        f(&mut self.page.lock().unwrap())
    }
}

#[async_trait]
impl SurfaceAdapter for FakeSurface {
    async fn read_timing_text(&self) -> AppResult<Option<String>> {
        Ok(self.with(|p| p.students.front().cloned()))
    }

    async fn has_score_field(&self) -> AppResult<bool> {
        Ok(self.with(|p| {
            p.field_checks += 1;
            p.field_checks > p.field_delay && !p.students.is_empty()
        }))
    }

    async fn write_score(&self, value: f64) -> AppResult<SurfaceAction> {
        Ok(self.with(|p| {
            if p.students.is_empty() {
                return SurfaceAction::NotFound;
            }
            p.written.push(value);
            SurfaceAction::Done
        }))
    }

    async fn trigger_commit_and_advance(&self) -> AppResult<SurfaceAction> {
        Ok(self.with(|p| {
            if p.students.is_empty() {
                return SurfaceAction::NotFound;
            }
            if !p.stuck_after_commit {
                p.students.pop_front();
            }
            p.commits += 1;
            if let Some(next) = p.location_after_commit.take() {
                p.location = Some(next);
            }
            SurfaceAction::Done
        }))
    }

    async fn is_unit_exhausted(&self) -> AppResult<bool> {
        Ok(self.with(|p| p.students.is_empty()))
    }

    async fn current_unit_name(&self) -> AppResult<Option<String>> {
        Ok(self.with(|p| p.unit.clone()))
    }

    async fn enumerate_candidate_units(&self) -> AppResult<Vec<WorkItem>> {
        Ok(self.with(|p| p.candidates.clone()))
    }

    async fn current_location(&self) -> AppResult<Url> {
        self.with(|p| p.location.clone())
            .ok_or_else(|| AppError::Other("no location".to_string()))
    }

    async fn navigate_to(&self, location: &Url) -> AppResult<()> {
        self.with(|p| p.navigations.push(location.clone()));
        Ok(())
    }

    async fn notify(&self, message: &str) -> AppResult<()> {
        self.with(|p| p.notices.push(message.to_string()));
        Ok(())
    }
}

fn settings(max_attempts: u32) -> AutomatonSettings {
    AutomatonSettings {
        rules: ScoreRules::new(vec![
            ScoreRule::new(40, 100.0),
            ScoreRule::new(20, 95.0),
            ScoreRule::new(0, 90.0),
        ])
        .unwrap(),
        sequence: vec![
            "homework8".to_string(),
            "homework9".to_string(),
            "homework10".to_string(),
        ],
        policy: PollPolicy {
            interval: Duration::ZERO,
            max_attempts,
            settle_delay: Duration::ZERO,
        },
        directory_key: DIRECTORY_KEY.to_string(),
        active_key: ACTIVE_KEY.to_string(),
    }
}

fn automaton(
    surface: &FakeSurface,
    store: &MemoryStore,
) -> GradingAutomaton<FakeSurface, MemoryStore> {
    GradingAutomaton::new(surface.clone(), store.clone(), settings(5))
}

async fn active(store: &MemoryStore) -> bool {
    ActiveFlag::new(store.clone(), ACTIVE_KEY).is_active().await
}

#[tokio::test]
async fn test_start_performs_exactly_one_grade_and_advance() {
    let surface = FakeSurface::grader(
        "homework8",
        "801",
        &[
            "Assignment was submitted 52 days 21 hours early",
            "Assignment was submitted 25 days early",
        ],
    );
    let store = MemoryStore::new();
    assert!(!active(&store).await);

    let mut automaton = automaton(&surface, &store);
    let step = automaton.start_auto_run().await;

    assert_eq!(step, Step::Continue);
    assert!(active(&store).await);
    assert_eq!(automaton.state(), AutomatonState::Advancing);
    surface.with(|p| {
        assert_eq!(p.written, vec![100.0]);
        assert_eq!(p.commits, 1);
    });
}

#[tokio::test]
async fn test_cleared_flag_stops_on_next_tick_without_writing() {
    let surface = FakeSurface::grader("homework8", "801", &["Assignment was submitted 3 days late"]);
    surface.with(|p| p.field_delay = 3);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    // 输入框还没出现，处于轮询中
    assert_eq!(automaton.start_auto_run().await, Step::Continue);
    assert_eq!(automaton.state(), AutomatonState::AwaitingSurface);

    // 操作员在另一个上下文中点击了停止
    ActiveFlag::new(store.clone(), ACTIVE_KEY).clear().await;
    surface.with(|p| p.field_delay = 0);

    assert_eq!(
        automaton.tick().await,
        Step::Finished(RunOutcome::Stopped(StopReason::Cancelled))
    );
    assert_eq!(automaton.state(), AutomatonState::Stopped);
    surface.with(|p| {
        assert!(p.written.is_empty());
        assert_eq!(p.notices, vec!["自动批改已停止".to_string()]);
    });
}

#[tokio::test]
async fn test_stop_clears_flag_and_notifies() {
    let surface = FakeSurface::grader("homework8", "801", &[]);
    let store = MemoryStore::new();
    ActiveFlag::new(store.clone(), ACTIVE_KEY).activate().await;

    let mut automaton = automaton(&surface, &store);
    automaton.stop().await;

    assert!(!active(&store).await);
    assert_eq!(automaton.state(), AutomatonState::Stopped);
    surface.with(|p| assert_eq!(p.notices.len(), 1));
}

#[tokio::test]
async fn test_student_left_in_place_after_commit_is_not_regraded() {
    let surface = FakeSurface::grader(
        "homework8",
        "801",
        &["Assignment was submitted 52 days early", "Assignment was submitted 1 day early"],
    );
    surface.with(|p| p.stuck_after_commit = true);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    assert_eq!(automaton.start_auto_run().await, Step::Continue);

    // 页面一直没有切换到下一个学生：每次轮询只计数，不再写分和保存
    let outcome = automaton.run().await;
    assert_eq!(
        outcome,
        RunOutcome::Stopped(StopReason::Failed(GradingError::Timeout { attempts: 5 }))
    );
    surface.with(|p| {
        assert_eq!(p.written, vec![100.0]);
        assert_eq!(p.commits, 1);
    });
}

#[tokio::test]
async fn test_grading_continues_once_page_moves_on() {
    let surface = FakeSurface::grader(
        "homework8",
        "801",
        &["Assignment was submitted 52 days early", "Assignment was submitted 1 day early"],
    );
    surface.with(|p| p.stuck_after_commit = true);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    assert_eq!(automaton.start_auto_run().await, Step::Continue);
    assert_eq!(automaton.tick().await, Step::Continue);
    assert_eq!(automaton.tick().await, Step::Continue);
    assert_eq!(automaton.attempts(), 2);

    // 页面终于切换到下一个学生
    surface.with(|p| {
        p.stuck_after_commit = false;
        p.students.pop_front();
    });
    assert_eq!(automaton.tick().await, Step::Continue);
    assert_eq!(automaton.attempts(), 0);
    surface.with(|p| {
        assert_eq!(p.written, vec![100.0, 90.0]);
        assert_eq!(p.commits, 2);
    });
}

#[tokio::test]
async fn test_exhausted_unit_with_unmapped_next_halts() {
    let surface = FakeSurface::grader("homework8", "801", &[]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);
    automaton.directory().record_if_absent("homework8", "801").await;
    let before = store.get(DIRECTORY_KEY).await.unwrap();

    ActiveFlag::new(store.clone(), ACTIVE_KEY).activate().await;
    let outcome = automaton.resume().await;

    assert_eq!(
        outcome,
        RunOutcome::Stopped(StopReason::Failed(GradingError::UnmappedUnit {
            unit: "homework9".to_string()
        }))
    );
    assert!(!active(&store).await);
    assert_eq!(store.get(DIRECTORY_KEY).await.unwrap(), before);
    surface.with(|p| {
        assert!(p.navigations.is_empty());
        assert_eq!(p.notices.len(), 1);
        assert!(p.notices[0].contains("homework9"));
    });
}

#[tokio::test]
async fn test_grades_cohort_then_crosses_to_next_unit() {
    let surface = FakeSurface::grader(
        "homework8",
        "801",
        &[
            "Assignment was submitted 52 days 21 hours early",
            "Assignment was submitted 25 days 1 hour early",
            "Assignment is overdue by: 7 days 13 hours",
        ],
    );
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);
    automaton.directory().record_if_absent("homework9", "902").await;

    assert_eq!(automaton.start_auto_run().await, Step::Continue);
    let outcome = automaton.run().await;

    assert_eq!(
        outcome,
        RunOutcome::CrossedUnit {
            to: WorkItem::new("homework9", "902")
        }
    );
    // 跨作业后标志保持开启，由新页面继续
    assert!(active(&store).await);
    assert_eq!(automaton.state(), AutomatonState::Idle);
    surface.with(|p| {
        assert_eq!(p.written, vec![100.0, 95.0, 90.0]);
        assert_eq!(p.navigations.len(), 1);
        let target = &p.navigations[0];
        assert_eq!(query_param(target, "id").as_deref(), Some("902"));
        assert_eq!(query_param(target, "action").as_deref(), Some("grader"));
        assert_eq!(query_param(target, "userid"), None);
    });
}

#[tokio::test]
async fn test_last_unit_completes_and_clears_flag() {
    let surface = FakeSurface::grader("homework10", "1001", &[]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    ActiveFlag::new(store.clone(), ACTIVE_KEY).activate().await;
    let outcome = automaton.resume().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            last: "homework10".to_string()
        }
    );
    assert!(outcome.is_terminal());
    assert!(!active(&store).await);
}

#[tokio::test]
async fn test_unknown_unit_halts() {
    let surface = FakeSurface::grader("homework3", "301", &[]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    ActiveFlag::new(store.clone(), ACTIVE_KEY).activate().await;
    assert_eq!(
        automaton.resume().await,
        RunOutcome::Stopped(StopReason::Failed(GradingError::UnitNotInSequence {
            unit: "homework3".to_string()
        }))
    );
}

#[tokio::test]
async fn test_missing_surface_times_out() {
    let surface = FakeSurface::grader("homework8", "801", &["Assignment was submitted 1 day early"]);
    surface.with(|p| p.field_delay = u32::MAX);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    ActiveFlag::new(store.clone(), ACTIVE_KEY).activate().await;
    let outcome = automaton.resume().await;

    assert_eq!(
        outcome,
        RunOutcome::Stopped(StopReason::Failed(GradingError::Timeout { attempts: 5 }))
    );
    assert!(!active(&store).await);
    surface.with(|p| {
        assert_eq!(p.field_checks, 5);
        assert!(p.written.is_empty());
    });
}

#[tokio::test]
async fn test_late_surface_is_retried_within_budget() {
    let surface = FakeSurface::grader("homework8", "801", &["Assignment was submitted 21 days early"]);
    surface.with(|p| p.field_delay = 3);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    ActiveFlag::new(store.clone(), ACTIVE_KEY).activate().await;
    automaton.run_ticks_until_grade().await;

    surface.with(|p| assert_eq!(p.written, vec![95.0]));
    assert_eq!(automaton.attempts(), 0);
}

impl GradingAutomaton<FakeSurface, MemoryStore> {
    async fn run_ticks_until_grade(&mut self) {
        for _ in 0..10 {
            assert_eq!(self.tick().await, Step::Continue);
            if self.state() == AutomatonState::Advancing {
                return;
            }
        }
        panic!("never graded");
    }
}

#[tokio::test]
async fn test_unparseable_timing_halts_without_guessing() {
    let surface = FakeSurface::grader("homework8", "801", &["gibberish"]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    let step = automaton.start_auto_run().await;

    assert_eq!(
        step,
        Step::Finished(RunOutcome::Stopped(StopReason::Failed(
            GradingError::ParseFailure {
                text: "gibberish".to_string()
            }
        )))
    );
    assert!(!active(&store).await);
    surface.with(|p| {
        assert!(p.written.is_empty());
        assert_eq!(p.commits, 0);
        assert!(p.notices[0].contains("需要手动处理"));
    });
}

#[tokio::test]
async fn test_location_change_hands_over_to_new_instance() {
    let surface = FakeSurface::grader(
        "homework8",
        "801",
        &["Assignment was submitted 1 day early", "Assignment was submitted 2 days early"],
    );
    surface.with(|p| {
        p.location_after_commit = Some(
            Url::parse("https://moodle.example.ie/mod/assign/view.php?id=801&action=grader&userid=6")
                .unwrap(),
        )
    });
    let store = MemoryStore::new();

    let mut first = automaton(&surface, &store);
    assert_eq!(first.start_auto_run().await, Step::Continue);
    assert_eq!(first.run().await, RunOutcome::Navigated);
    assert!(active(&store).await);

    // 新页面上的实例只能从存储中得知运行状态
    let mut second = automaton(&surface, &store);
    let outcome = second.resume().await;
    assert!(matches!(
        outcome,
        RunOutcome::Stopped(StopReason::Failed(GradingError::UnmappedUnit { .. }))
    ));
    surface.with(|p| assert_eq!(p.written, vec![90.0, 90.0]));
}

#[tokio::test]
async fn test_resume_without_flag_is_idle() {
    let surface = FakeSurface::grader("homework8", "801", &["Assignment was submitted 1 day early"]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    assert_eq!(automaton.resume().await, RunOutcome::Idle);
    assert_eq!(automaton.state(), AutomatonState::Idle);
    surface.with(|p| assert!(p.written.is_empty()));
}

#[tokio::test]
async fn test_grade_once_fills_without_commit() {
    let surface = FakeSurface::grader("homework8", "801", &["Assignment was submitted 4 days 5 hours late"]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    let report = automaton.grade_once().await.unwrap();
    assert_eq!(report.days, -4);
    assert_eq!(report.score, 90.0);
    surface.with(|p| {
        assert_eq!(p.written, vec![90.0]);
        assert_eq!(p.commits, 0);
    });
    assert!(!active(&store).await);
}

#[tokio::test]
async fn test_grade_and_advance_is_one_shot() {
    let surface = FakeSurface::grader(
        "homework8",
        "801",
        &["Assignment was submitted 45 days early", "Assignment was submitted 1 day early"],
    );
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    let report = automaton.grade_and_advance().await.unwrap();
    assert_eq!(report.score, 100.0);
    assert_eq!(automaton.state(), AutomatonState::Idle);
    surface.with(|p| {
        assert_eq!(p.written, vec![100.0]);
        assert_eq!(p.commits, 1);
    });
    assert!(!active(&store).await);
}

#[tokio::test]
async fn test_manual_grade_without_timing_is_reported() {
    let surface = FakeSurface::grader("homework8", "801", &[]);
    let store = MemoryStore::new();
    let mut automaton = automaton(&surface, &store);

    let err = automaton.grade_and_advance().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Grading(GradingError::SurfaceNotFound { .. })
    ));
    surface.with(|p| assert_eq!(p.notices.len(), 1));
}

#[tokio::test]
async fn test_advance_to_next_unit_reports_distinct_failures() {
    let store = MemoryStore::new();

    let surface = FakeSurface::grader("homework8", "801", &[]);
    let mut automaton = automaton(&surface, &store);
    assert!(matches!(
        automaton.advance_to_next_unit().await,
        Err(AppError::Grading(GradingError::UnmappedUnit { .. }))
    ));

    automaton.directory().record_if_absent("homework9", "902").await;
    let next = automaton.advance_to_next_unit().await.unwrap();
    assert_eq!(next, WorkItem::new("homework9", "902"));
    surface.with(|p| assert_eq!(p.navigations.len(), 1));

    let last = FakeSurface::grader("homework10", "1001", &[]);
    let mut automaton = GradingAutomaton::new(last, store.clone(), settings(5));
    assert!(matches!(
        automaton.advance_to_next_unit().await,
        Err(AppError::Grading(GradingError::SequenceExhausted { .. }))
    ));
}

#[tokio::test]
async fn test_record_current_unit_does_not_overwrite() {
    let surface = FakeSurface::grader("homework8", "801", &[]);
    let store = MemoryStore::new();
    let automaton = automaton(&surface, &store);

    automaton.directory().record_if_absent("homework8", "111").await;
    let item = automaton.record_current_unit().await.unwrap();
    assert_eq!(item, Some(WorkItem::new("homework8", "801")));
    assert_eq!(
        automaton.directory().lookup("homework8").await.as_deref(),
        Some("111")
    );

    let pinned = automaton.pin_current_unit().await.unwrap();
    assert_eq!(pinned.identifier, "801");
    assert_eq!(
        automaton.directory().lookup("homework8").await.as_deref(),
        Some("801")
    );
}

#[tokio::test]
async fn test_scan_listing_records_new_units() {
    let surface = FakeSurface::grader("homework8", "801", &[]);
    surface.with(|p| {
        p.candidates = vec![
            WorkItem::new("homework8", "801"),
            WorkItem::new("homework9", "902"),
            WorkItem::new("homework9", "999"),
        ]
    });
    let store = MemoryStore::new();
    let automaton = automaton(&surface, &store);

    assert_eq!(automaton.scan_listing().await.unwrap(), 2);
    assert_eq!(automaton.scan_listing().await.unwrap(), 0);
    assert_eq!(
        automaton.directory_listing().await,
        vec![
            ("homework8".to_string(), Some("801".to_string())),
            ("homework9".to_string(), Some("902".to_string())),
            ("homework10".to_string(), None),
        ]
    );
    assert!(automaton.directory_text().await.contains("homework10: (未记录)"));
}
