// apps/hc_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 显示内核、耦合顺序、粗步长、外迭代、映射生成与交换声明。

use anyhow::Result;
use clap::Args;
use hc_config::CouplingConfig;
use hc_driver::CouplerError;
use std::path::PathBuf;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 耦合配置文件
    pub config: PathBuf,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    let config = CouplingConfig::from_file(&args.config).map_err(CouplerError::from)?;
    let paths = config.paths();

    println!("配置: {}", args.config.display());
    println!("基准目录: {}", config.base_dir().display());
    println!(
        "模拟时段: [{}, {}]，粗步长 {}，共 {} 步",
        config.start_time,
        config.end_time,
        config.coarse_time_step(),
        config.coarse_steps()
    );

    println!("\n内核 ({}):", config.kernels.len());
    for k in &config.kernels {
        println!(
            "  {:<12} {:<10} dt={:<8} {}",
            k.name,
            k.kind,
            k.time_step,
            k.library_path(&paths).display()
        );
    }
    println!("\n耦合顺序: {}", config.ordered_kernel_names().join(" -> "));
    if let Some(it) = &config.iteration {
        let max = it
            .max_iterations
            .map_or_else(|| "由内核提供".to_string(), |n| n.to_string());
        println!(
            "外迭代: {} (求解器 {})，伙伴 [{}]，最大迭代 {}",
            it.kernel,
            it.solution_id,
            it.partners.join(", "),
            max
        );
    }
    if let Some(m) = &config.mapping {
        println!(
            "映射生成: {} <- {} -> {}",
            m.strategy,
            paths.resolve(&m.input).display(),
            paths.resolve(&m.output_dir).display()
        );
    }

    println!("\n交换 ({}):", config.exchanges.len());
    for e in &config.exchanges {
        println!(
            "  {:<16} {} -> {} [{}, {:?}{}] {}",
            e.name,
            e.source,
            e.target,
            e.aggregation,
            e.direction,
            if e.log { ", logged" } else { "" },
            paths.resolve(&e.mapping).display()
        );
    }
    Ok(())
}
