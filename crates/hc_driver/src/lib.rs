// crates/hc_driver/src/lib.rs

//! HydroCouple Driver Layer (Layer 4)
//!
//! 耦合驱动层。按配置初始化全部内核、构建交换计划，以错步调度推进
//! 同步时间循环，并保证每个已初始化的内核在任何路径上恰好终止一次。
//!
//! # 模块概览
//!
//! - [`orchestrator`]: 驱动主体与运行循环
//! - [`generate`]: 运行前按耦合策略生成映射表
//! - [`schedule`]: 不同步长内核的错步调度
//! - [`plan`]: 交换计划与活动单元数守卫
//! - [`state`]: 驱动状态机
//! - [`events`]: 事件与监听器
//! - [`summary`]: 运行摘要
//! - [`error`]: 错误类型与错误类别
//!
//! # 示例
//!
//! ```no_run
//! use hc_config::CouplingConfig;
//! use hc_driver::Orchestrator;
//!
//! let config = CouplingConfig::from_file("coupling.json")?;
//! let mut driver = Orchestrator::new(config)?;
//! let summary = driver.run()?;
//! println!("{summary}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod generate;
pub mod orchestrator;
pub mod plan;
pub mod schedule;
pub mod state;
pub mod summary;

/// 层级标识
pub const LAYER: u8 = 4;

pub use error::{CouplerError, ErrorCategory};
pub use events::{DriverEvent, EventDispatcher, EventListener, FnListener, LoggingListener};
pub use generate::{build_strategy, generate_mappings};
pub use orchestrator::Orchestrator;
pub use plan::{ActiveGuard, ExchangePlan};
pub use schedule::{ScheduledStep, StaggeredSchedule};
pub use state::DriverState;
pub use summary::{KernelStats, RunSummary};
