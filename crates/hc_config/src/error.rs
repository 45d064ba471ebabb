// crates/hc_config/src/error.rs

//! 配置层错误类型

use hc_foundation::ValidationReport;
use std::path::PathBuf;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),

    /// 引用了未声明的内核
    #[error("'{context}' 引用了未声明的内核 '{kernel}'")]
    UnknownKernel {
        /// 引用位置
        context: String,
        /// 内核名称
        kernel: String,
    },

    /// 路径不存在
    #[error("路径不存在 '{key}': {}", path.display())]
    PathNotFound {
        /// 配置键
        key: String,
        /// 解析后的路径
        path: PathBuf,
    },

    /// 校验失败（汇总）
    #[error("配置校验失败: {0}")]
    Validation(ValidationReport),
}

impl ConfigError {
    /// 创建无效值错误
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid_value("kernels[0].time_step", -1.0, "必须为正");
        assert!(err.to_string().contains("time_step"));
    }

    #[test]
    fn test_path_not_found_display() {
        let err = ConfigError::PathNotFound {
            key: "kernels[0].library".into(),
            path: PathBuf::from("/opt/libmf6.so"),
        };
        assert!(err.to_string().contains("/opt/libmf6.so"));
    }
}
