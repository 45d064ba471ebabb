// crates/hc_kernel/src/error.rs

//! 内核层错误类型
//!
//! [`EngineError`] 由引擎实现返回，只描述引擎本身的失败；[`KernelError`]
//! 由适配器返回，附带内核名称和生命周期上下文。

use crate::engine::ElementType;
use std::path::PathBuf;
use thiserror::Error;

/// 引擎调用错误
#[derive(Debug, Error)]
pub enum EngineError {
    /// 共享库或其依赖无法加载
    #[error("无法加载 {}: {reason}", path.display())]
    Load {
        /// 库路径
        path: PathBuf,
        /// 原因
        reason: String,
    },

    /// 引擎函数返回非零代码
    #[error("引擎函数 {function} 返回 {code}: {message}")]
    Call {
        /// 函数名
        function: String,
        /// 返回码
        code: i32,
        /// 引擎报告的最后错误
        message: String,
    },

    /// 变量不存在
    #[error("变量不存在: {0}")]
    VariableNotFound(String),

    /// 求解失败
    #[error("求解失败: {0}")]
    Solve(String),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 内核适配器错误
#[derive(Debug, Error)]
pub enum KernelError {
    /// 加载失败，或重复初始化
    #[error("内核 '{kernel}' 加载失败: {reason}")]
    Load {
        /// 内核名称
        kernel: String,
        /// 原因
        reason: String,
    },

    /// 变量地址无法解析
    #[error("内核 '{kernel}' 中找不到变量 '{address}'")]
    VariableNotFound {
        /// 内核名称
        kernel: String,
        /// 变量地址
        address: String,
    },

    /// 变量地址组成不完整
    #[error("变量 '{variable}' 地址无效: {reason}")]
    InvalidAddress {
        /// 逻辑变量名
        variable: String,
        /// 原因
        reason: String,
    },

    /// 调用顺序错误
    #[error("内核 '{kernel}' 在状态 {state} 下不允许调用 {operation}")]
    InvalidLifecycle {
        /// 内核名称
        kernel: String,
        /// 调用的操作
        operation: &'static str,
        /// 当前状态
        state: String,
    },

    /// 求解发散
    #[error("内核 '{kernel}' 在 t={time} 求解发散: {message}")]
    SolverDivergence {
        /// 内核名称
        kernel: String,
        /// 发散时的模拟时间
        time: f64,
        /// 引擎信息
        message: String,
    },

    /// 引擎调用失败
    #[error("内核 '{kernel}' 引擎错误: {source}")]
    Engine {
        /// 内核名称
        kernel: String,
        /// 底层错误
        #[source]
        source: EngineError,
    },

    /// 视图所属的会话已结束
    #[error("变量视图 '{address}' 已失效（内核已终止）")]
    ViewExpired {
        /// 变量地址
        address: String,
    },

    /// 元素类型不匹配
    #[error("变量 '{address}' 类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        /// 变量地址
        address: String,
        /// 期望类型
        expected: ElementType,
        /// 实际类型
        actual: ElementType,
    },

    /// 列号超出范围
    #[error("变量 '{address}' 列号 {column} 超出范围 0..{cols}")]
    ColumnOutOfRange {
        /// 变量地址
        address: String,
        /// 列号
        column: usize,
        /// 列数
        cols: usize,
    },

    /// 元素索引越界
    #[error("变量 '{address}' 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 变量地址
        address: String,
        /// 索引
        index: usize,
        /// 长度
        len: usize,
    },
}

impl KernelError {
    /// 将引擎错误附上内核上下文
    pub fn from_engine(kernel: &str, time: f64, err: EngineError) -> Self {
        match err {
            EngineError::Load { path, reason } => Self::Load {
                kernel: kernel.to_string(),
                reason: format!("{}: {reason}", path.display()),
            },
            EngineError::VariableNotFound(address) => Self::VariableNotFound {
                kernel: kernel.to_string(),
                address,
            },
            EngineError::Solve(message) => Self::SolverDivergence {
                kernel: kernel.to_string(),
                time,
                message,
            },
            other => Self::Engine {
                kernel: kernel.to_string(),
                source: other,
            },
        }
    }

    /// 是否为求解发散
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::SolverDivergence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let err = KernelError::from_engine("mf6", 2.0, EngineError::Solve("no convergence".into()));
        assert!(err.is_divergence());
        assert!(err.to_string().contains("t=2"));

        let err = KernelError::from_engine("mf6", 0.0, EngineError::VariableNotFound("GWF/X".into()));
        assert!(matches!(err, KernelError::VariableNotFound { ref address, .. } if address == "GWF/X"));

        let err = KernelError::from_engine(
            "msw",
            0.0,
            EngineError::Load {
                path: "libmsw.so".into(),
                reason: "missing".into(),
            },
        );
        assert!(matches!(err, KernelError::Load { .. }));
    }
}
