// crates/hc_exchange/src/error.rs

//! 交换层错误类型

use hc_kernel::KernelError;
use hc_mapping::MappingError;
use std::path::PathBuf;
use thiserror::Error;

/// 交换错误
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 映射错误（形状、索引、活动单元数）
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// 视图访问错误
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// 源与目标指向同一块内存
    #[error("交换 '{exchange}' 的源与目标内存重叠")]
    AliasedViews {
        /// 交换名称
        exchange: String,
    },

    /// 除以步长时步长无效
    #[error("交换 '{exchange}' 步长无效: {dt}")]
    InvalidTimeStep {
        /// 交换名称
        exchange: String,
        /// 步长
        dt: f64,
    },

    /// 交换记录写入失败
    #[error("交换记录 {} 写入失败: {message}", path.display())]
    Collector {
        /// 输出文件
        path: PathBuf,
        /// 错误描述
        message: String,
    },

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
