// crates/hc_foundation/src/validation.rs

//! 运行时验证工具
//!
//! 提供验证报告，用于在启动任何内核之前一次性收集配置和映射文件中的问题。
//!
//! # 示例
//!
//! ```
//! use hc_foundation::validation::ValidationReport;
//!
//! let mut report = ValidationReport::new();
//! report.add_error("kernels", "至少需要一个内核");
//! assert!(!report.is_valid());
//! ```

use std::fmt;

/// 验证报告
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    /// 错误列表
    pub errors: Vec<ValidationIssue>,
    /// 警告列表
    pub warnings: Vec<ValidationIssue>,
}

/// 单条验证消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// 相关字段或对象
    pub field: String,
    /// 描述
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationReport {
    /// 创建空的验证报告
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加错误
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// 添加警告
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// 合并另一个报告
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// 是否有错误
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 是否有警告
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 是否通过（无错误）
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 严格模式下是否通过（无错误且无警告）
    pub fn is_valid_strict(&self) -> bool {
        self.is_valid() && !self.has_warnings()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 个错误, {} 个警告",
            self.errors.len(),
            self.warnings.len()
        )?;
        for e in &self.errors {
            write!(f, "\n  错误 {e}")?;
        }
        for w in &self.warnings {
            write!(f, "\n  警告 {w}")?;
        }
        Ok(())
    }
}
