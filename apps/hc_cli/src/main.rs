// apps/hc_cli/src/main.rs

//! HydroCouple 命令行界面
//!
//! 读取耦合配置并驱动多个水文内核同步运行。
//!
//! # 退出码
//!
//! 只有驱动到达 Done 状态时返回 0；否则返回非零，并在标准错误输出
//! `"<类别>: <消息>"`。

mod commands;

use clap::{Parser, Subcommand};
use hc_driver::{CouplerError, ErrorCategory};
use std::path::Path;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// HydroCouple 多内核水文耦合命令行工具
#[derive(Parser)]
#[command(name = "hc_cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HydroCouple multi-kernel hydrological coupling driver", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，缺省时使用配置中的 log_level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行耦合模拟
    Run(commands::run::RunArgs),
    /// 按耦合策略生成映射表
    Map(commands::map::MapArgs),
    /// 验证配置（不启动内核）
    Validate(commands::validate::ValidateArgs),
    /// 显示配置信息
    Info(commands::info::InfoArgs),
}

impl Commands {
    fn config_path(&self) -> &Path {
        match self {
            Self::Run(args) => &args.config,
            Self::Map(args) => &args.config,
            Self::Validate(args) => &args.config,
            Self::Info(args) => &args.config,
        }
    }
}

/// 只读取配置中的 log_level，不做完整解析
fn config_log_level(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("log_level")?.as_str().map(str::to_string)
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .or_else(|| config_log_level(cli.command.config_path()))
        .unwrap_or_else(|| "info".to_string());
    if let Err(e) = init_logging(&level) {
        eprintln!("无法初始化日志: {e}");
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Map(args) => commands::map::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Info(args) => commands::info::execute(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CouplerError>() {
                Some(err) => eprintln!("{}", err.report()),
                None => eprintln!("{}: {e:#}", ErrorCategory::Configuration),
            }
            ExitCode::FAILURE
        }
    }
}
