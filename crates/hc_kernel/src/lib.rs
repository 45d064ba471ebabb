// crates/hc_kernel/src/lib.rs

//! HydroCouple Kernel Layer (Layer 2)
//!
//! 内核适配层。每个外部数值引擎包装为一个 [`KernelAdapter`]，统一提供
//! 生命周期管理、按名称取得变量视图以及单步求解的调用顺序检查。
//!
//! # 模块概览
//!
//! - [`engine`]: `XmiEngine` 引擎契约 trait 与原始数组描述
//! - [`adapter`]: 生命周期状态机与调用顺序检查
//! - [`view`]: 指向内核内存的非拥有变量视图
//! - [`accessors`]: 各引擎类别的逻辑变量名表与地址组合
//! - [`dylib`]: 通过共享库加载的 BMI/XMI 引擎
//! - [`memory`]: 进程内引擎（测试与演练）
//! - [`error`]: 内核错误类型
//!
//! # 生命周期
//!
//! ```text
//! Uninitialized ──initialize──> Initialized ──finalize──> Finalized
//!                                   │
//!                 Idle ─prepare─> Prepared ─advance─> Advanced ─finalize_time_step─> Idle
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessors;
pub mod adapter;
pub mod dylib;
pub mod engine;
pub mod error;
pub mod memory;
pub mod view;

/// 层级标识
pub const LAYER: u8 = 2;

pub use accessors::{resolve_address, VariableAddress};
pub use adapter::{KernelAdapter, LifecycleState, StepPhase};
pub use dylib::DylibEngine;
pub use engine::{ElementType, RawArray, XmiEngine};
pub use error::{EngineError, KernelError};
pub use memory::{CallLog, MemoryEngine, StepContext};
pub use view::{VariableView, ViewElement};
