// crates/hc_driver/src/error.rs

//! 驱动层错误类型
//!
//! [`CouplerError`] 汇总各层错误；[`ErrorCategory`] 给出命令行输出使用的
//! 错误类别。

use crate::state::DriverState;
use hc_config::ConfigError;
use hc_exchange::ExchangeError;
use hc_kernel::KernelError;
use hc_mapping::MappingError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 配置错误，任何内核启动之前
    Configuration,
    /// 映射错误
    Mapping,
    /// 内核生命周期错误
    KernelLifecycle,
    /// 求解发散
    SolverDivergence,
    /// 交换记录或运行摘要输出错误
    Output,
    /// 运行被取消
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "ConfigurationError",
            Self::Mapping => "MappingError",
            Self::KernelLifecycle => "KernelLifecycleError",
            Self::SolverDivergence => "SolverDivergenceError",
            Self::Output => "OutputError",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// 耦合驱动错误
#[derive(Debug, Error)]
pub enum CouplerError {
    /// 配置错误
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// 映射错误
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// 内核错误
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// 其他交换错误（别名、步长、记录输出）
    #[error(transparent)]
    Exchange(ExchangeError),

    /// 非法状态转换
    #[error("驱动状态不能从 {from} 转换到 {to}")]
    InvalidTransition {
        /// 当前状态
        from: DriverState,
        /// 目标状态
        to: DriverState,
    },

    /// 运行产物写出失败
    #[error("无法写出 {}: {message}", path.display())]
    Output {
        /// 目标文件
        path: PathBuf,
        /// 原因
        message: String,
    },

    /// 运行被取消
    #[error("运行在 t={time} 被取消")]
    Cancelled {
        /// 取消时的模拟时间
        time: f64,
    },
}

impl From<ExchangeError> for CouplerError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Mapping(e) => Self::Mapping(e),
            ExchangeError::Kernel(e) => Self::Kernel(e),
            other => Self::Exchange(other),
        }
    }
}

impl CouplerError {
    /// 错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Mapping(_) => ErrorCategory::Mapping,
            Self::Kernel(e) if e.is_divergence() => ErrorCategory::SolverDivergence,
            Self::Kernel(_) | Self::InvalidTransition { .. } => ErrorCategory::KernelLifecycle,
            Self::Exchange(ExchangeError::AliasedViews { .. }) => ErrorCategory::Mapping,
            Self::Exchange(ExchangeError::InvalidTimeStep { .. }) => ErrorCategory::Configuration,
            Self::Exchange(_) | Self::Output { .. } => ErrorCategory::Output,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// 命令行输出格式 `"<类别>: <消息>"`
    pub fn report(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}
