// crates/hc_config/src/lib.rs

//! HydroCouple Config Layer (Layer 2)
//!
//! 耦合配置层。一次性从 JSON 文件加载运行参数、内核声明和交换声明，
//! 加载后不可变。
//!
//! # 模块概览
//!
//! - [`coupling`]: `CouplingConfig` 顶层配置与校验
//! - [`kernel`]: 内核声明与引擎类别
//! - [`exchange`]: 交换声明（端点、聚合、换算、方向）
//! - [`mapping`]: 运行前的映射表生成（策略选择与预处理输入）
//! - [`paths`]: 基于显式基准目录的路径解析
//! - [`error`]: 配置错误类型
//!
//! # 设计原则
//!
//! 1. **不修改进程工作目录**: 所有相对路径都以配置文件所在目录为基准显式解析
//! 2. **启动前失败**: 所有配置问题在任何内核初始化之前报告

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coupling;
pub mod error;
pub mod exchange;
pub mod kernel;
pub mod mapping;
pub mod paths;

/// 层级标识
pub const LAYER: u8 = 2;

pub use coupling::{CouplingConfig, ExchangeLogConfig, IterationConfig, LogSinkKind};
pub use error::ConfigError;
pub use exchange::{AggregationKind, ConversionConfig, Direction, EndpointConfig, ExchangeConfig};
pub use kernel::{EngineKind, KernelConfig};
pub use mapping::{MappingGenerationConfig, StrategyInput, StrategyKind};
pub use paths::PathResolver;
