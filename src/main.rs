use anyhow::Result;
use clap::Parser;

use moodle_grading_assistant::cli::Cli;
use moodle_grading_assistant::config::Config;
use moodle_grading_assistant::orchestrator::App;
use moodle_grading_assistant::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::load(Some(&cli.config))?;
    if let Some(port) = cli.port {
        config.browser_debug_port = port;
    }

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    app.run(cli.selected_command()).await?;

    Ok(())
}
