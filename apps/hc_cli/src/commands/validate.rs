// apps/hc_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 检查配置字段、引用的路径以及所有映射表文件，不启动任何内核。

use anyhow::{bail, Context, Result};
use clap::Args;
use hc_config::CouplingConfig;
use hc_foundation::ValidationReport;
use hc_mapping::{MappingTable, TableFormat};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 耦合配置文件
    pub config: PathBuf,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

fn base_dir(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    if parent.is_absolute() {
        Ok(parent.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(parent))
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== HydroCouple 配置验证 ===");
    println!("检查配置文件: {}", args.config.display());

    let content = std::fs::read_to_string(&args.config)
        .with_context(|| format!("无法读取配置文件 {}", args.config.display()))?;
    let config: CouplingConfig = serde_json::from_str(&content)
        .context("JSON 解析错误")?;
    let config = config.with_base_dir(base_dir(&args.config)?);

    let mut report = config.validation_report();
    report.merge(config.check_paths());
    check_mappings(&config, &mut report);

    print_report(&report, args.strict)
}

fn check_mappings(config: &CouplingConfig, report: &mut ValidationReport) {
    let paths = config.paths();
    for e in &config.exchanges {
        let path = paths.resolve(&e.mapping);
        if !path.is_file() {
            continue;
        }
        let format = TableFormat::default().reversed(e.reverse);
        match MappingTable::read_with(&path, format) {
            Ok(table) if table.is_empty() => {
                report.add_warning(format!("exchanges.{}.mapping", e.name), "映射表为空");
            }
            Ok(table) => {
                println!(
                    "  ✓ {}: {} 对, 源索引 ≤ {}, 目标索引 ≤ {}",
                    e.name,
                    table.len(),
                    table.max_source().unwrap_or(0),
                    table.max_target().unwrap_or(0)
                );
            }
            Err(err) => report.add_error(format!("exchanges.{}.mapping", e.name), err.to_string()),
        }
    }
}

fn print_report(report: &ValidationReport, strict: bool) -> Result<()> {
    println!("\n=== 验证结果 ===");

    for err in &report.errors {
        error!("  ✗ {}", err);
        println!("  ✗ {}", err);
    }
    for warning in &report.warnings {
        warn!("  ⚠ {}", warning);
        println!("  ⚠ {}", warning);
    }

    let success = if strict {
        report.is_valid_strict()
    } else {
        report.is_valid()
    };

    if success {
        println!("\n✓ 验证通过");
        Ok(())
    } else {
        println!("\n✗ 验证失败");
        bail!(
            "验证失败：发现 {} 个错误，{} 个警告",
            report.errors.len(),
            report.warnings.len()
        )
    }
}
