// crates/hc_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `HcError` 枚举和 `HcResult` 类型别名。各层在自己的 crate 中定义
//! 领域错误（配置、内核、映射、交换），本模块只包含跨层共用的基础错误。
//!
//! # 示例
//!
//! ```
//! use hc_foundation::error::{HcError, HcResult};
//!
//! fn first_line(text: &str) -> HcResult<&str> {
//!     text.lines()
//!         .next()
//!         .ok_or_else(|| HcError::parse("map.tsv", 1, "缺少表头"))
//! }
//!
//! assert!(first_line("").is_err());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type HcResult<T> = Result<T, HcError>;

/// HydroCouple 基础错误类型
#[derive(Error, Debug)]
pub enum HcError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 文件解析错误
    #[error("文件解析错误: {file} 第{line}行: {message}")]
    Parse {
        /// 文件路径
        file: PathBuf,
        /// 行号（从 1 开始）
        line: usize,
        /// 错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl HcError {
    /// 创建 IO 错误
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 创建文件不存在错误
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 创建解析错误
    pub fn parse(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HcError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found() {
        let err = HcError::file_not_found("/path/to/table.tsv");
        assert!(err.to_string().contains("/path/to/table.tsv"));
    }

    #[test]
    fn test_parse_error_mentions_line() {
        let err = HcError::parse("map.tsv", 7, "非数字");
        let msg = err.to_string();
        assert!(msg.contains("map.tsv"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: HcError = io_err.into();
        assert!(matches!(err, HcError::Io { source: Some(_), .. }));
    }
}
