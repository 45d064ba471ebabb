// crates/hc_exchange/src/lib.rs

//! HydroCouple Exchange Layer (Layer 3)
//!
//! 交换层。经映射表读取源视图、聚合、换算后原地写入目标视图，并可选地
//! 记录写入的值。
//!
//! # 模块概览
//!
//! - [`engine`]: 交换描述、预处理计划与 `apply`
//! - [`collector`]: 交换记录（CSV 文件或内存）
//! - [`error`]: 交换错误类型
//!
//! # 聚合语义
//!
//! | 方式 | 行为 |
//! |------|------|
//! | identity | 一对一复制，映射表长度必须等于源长度 |
//! | sum | 共享目标的源求和，未映射的目标保持不变 |
//! | broadcast | 一个源写入所有映射到的目标 |
//! | average | 共享目标的源加权平均 |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collector;
pub mod engine;
pub mod error;

/// 层级标识
pub const LAYER: u8 = 3;

pub use collector::{CsvSink, ExchangeCollector, ExchangeSink, LoggedRow, MemorySink};
pub use engine::{apply, Conversion, ExchangeReport, ExchangeSpec, ExchangeViews, PreparedExchange};
pub use error::ExchangeError;
