// apps/hc_cli/src/commands/run.rs

//! 运行耦合模拟命令

use anyhow::Result;
use clap::Args;
use hc_config::CouplingConfig;
use hc_driver::{CouplerError, LoggingListener, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// 耦合配置文件
    pub config: PathBuf,

    /// 逐步输出内核单步与交换事件（debug 级别）
    #[arg(long)]
    pub verbose_events: bool,

    /// 将运行摘要写入 JSON 文件
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== HydroCouple run: {} ===", args.config.display());

    let config = CouplingConfig::from_file(&args.config).map_err(CouplerError::from)?;

    let mut listener = LoggingListener::new("coupler");
    if args.verbose_events {
        listener = listener.verbose();
    }
    let mut driver = Orchestrator::new(config)?.with_listener(Arc::new(listener));

    let outcome = driver.run();

    let written = match (&args.summary, driver.summary()) {
        (Some(path), Some(summary)) => summary.write_json(path),
        _ => Ok(()),
    };

    // 运行本身的失败优先于摘要写出的失败
    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => {
            if let Err(write_err) = written {
                warn!("{}", write_err);
            }
            return Err(err.into());
        }
    };
    println!("{summary}");
    written?;
    Ok(())
}
