// crates/hc_foundation/src/lib.rs

//! HydroCouple Foundation Layer (Layer 1)
//!
//! 基础层，为耦合驱动的各个 crate 提供共用的错误类型、验证报告和时间容差工具。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `HcError` 与 `HcResult`
//! - [`validation`]: 验证报告（错误与警告）
//! - [`time`]: 浮点时间比较与步数整除检查
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: hc_cli
//! Layer 4: hc_driver
//! Layer 3: hc_exchange
//! Layer 2: hc_config, hc_kernel, hc_mapping
//! Layer 1: hc_foundation (本层)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod time;
pub mod validation;

/// 层级标识
pub const LAYER: u8 = 1;

pub use error::{HcError, HcResult};
pub use time::{steps_in, time_reached, TIME_TOLERANCE};
pub use validation::{ValidationReport, ValidationIssue};
