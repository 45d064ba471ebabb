// apps/hc_cli/src/commands/map.rs

//! 映射表生成命令
//!
//! 按配置中 `mapping` 段选择的耦合策略生成映射表，供随后的运行读取。

use anyhow::Result;
use clap::Args;
use hc_config::CouplingConfig;
use hc_driver::{generate_mappings, CouplerError};
use std::path::PathBuf;
use tracing::info;

/// 映射生成参数
#[derive(Args)]
pub struct MapArgs {
    /// 耦合配置文件
    pub config: PathBuf,
}

/// 执行映射生成命令
pub fn execute(args: MapArgs) -> Result<()> {
    info!("=== HydroCouple mapping: {} ===", args.config.display());

    let config = CouplingConfig::from_file(&args.config).map_err(CouplerError::from)?;
    let written = generate_mappings(&config)?;

    println!("生成映射表 {} 个:", written.len());
    for path in &written {
        println!("  ✓ {}", path.display());
    }
    Ok(())
}
