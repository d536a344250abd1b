//! 命令行接口
//!
//! 每个子命令对应页面控制面板上的一个按钮。

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Moodle 作业批改助手：根据提交时间自动评分、切换学生和作业
#[derive(Debug, Parser)]
#[command(name = "moodle-grading-assistant", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// 配置文件路径（TOML）
    #[arg(long, short, global = true, env = "GRADING_CONFIG", default_value = "grading.toml")]
    pub config: PathBuf,

    /// 浏览器调试端口，覆盖配置文件
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// 显示详细日志
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// 监听页面变化：记录作业ID、响应快捷键、在新页面上继续自动批改（默认）
    Watch,
    /// 自动批改所有学生，并在作业完成后切换到下一个作业
    Start,
    /// 停止自动批改
    Stop,
    /// 仅填充分数
    Grade,
    /// 评分并跳转到下一个学生
    GradeNext,
    /// 切换到下一个作业
    NextUnit,
    /// 查看作业ID映射
    ShowMap,
    /// 扫描当前课程页面上的作业ID
    Scan,
    /// 手动记录当前作业ID（覆盖已有记录）
    Record,
}

impl Cli {
    pub fn selected_command(&self) -> Command {
        self.command.unwrap_or(Command::Watch)
    }
}
