// crates/hc_mapping/src/error.rs

//! 映射层错误类型

use hc_foundation::HcError;
use std::path::PathBuf;
use thiserror::Error;

/// 映射错误
#[derive(Debug, Error)]
pub enum MappingError {
    /// 活动单元的标识符在目标离散化中不存在
    #[error("映射 '{table}' 中以下标识符在目标中不存在: {missing:?}")]
    UnknownIdentifier {
        /// 映射表名称
        table: String,
        /// 缺失的标识符（已排序去重）
        missing: Vec<i64>,
    },

    /// 运行期间活动单元数发生变化
    #[error("映射 '{table}' 活动单元数不一致: 期望 {expected}, 实际 {actual}")]
    InconsistentActiveCount {
        /// 映射表名称
        table: String,
        /// 构建时的活动单元数
        expected: usize,
        /// 当前活动单元数
        actual: usize,
    },

    /// 数组形状不匹配
    #[error("'{context}' 形状不匹配: 期望 {expected}, 实际 {actual}")]
    ShapeMismatch {
        /// 上下文
        context: String,
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 标识符不是整数
    #[error("单元 {index} 的标识符 {value} 不是整数")]
    NonIntegralIdentifier {
        /// 单元索引
        index: usize,
        /// 标识符值
        value: f64,
    },

    /// 目标标识符重复
    #[error("目标标识符重复: {id}")]
    DuplicateIdentifier {
        /// 重复的标识符
        id: i64,
    },

    /// 映射表索引超出视图范围
    #[error("映射 '{table}' 的{side}索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 映射表名称
        table: String,
        /// 源或目标
        side: &'static str,
        /// 索引
        index: usize,
        /// 有效长度
        len: usize,
    },

    /// 同一目标被多次写入
    #[error("映射 '{table}' 目标索引 {target} 出现多次，{aggregation} 聚合要求目标唯一")]
    ConflictingTarget {
        /// 映射表名称
        table: String,
        /// 目标索引
        target: usize,
        /// 聚合方式
        aggregation: String,
    },

    /// 活动地表单元位于非活动地下水单元之上
    #[error("单元 {unit} 位于非活动网格单元 (行 {row}, 列 {col}) 上")]
    InactiveCoupling {
        /// 地表单元编号
        unit: i64,
        /// 行
        row: usize,
        /// 列
        col: usize,
    },

    /// 表头不符合约定
    #[error("映射文件 {} 表头无效: {found:?}, 期望 {expected}", path.display())]
    InvalidHeader {
        /// 文件路径
        path: PathBuf,
        /// 实际表头
        found: Vec<String>,
        /// 期望表头
        expected: String,
    },

    /// 基础错误（IO、解析）
    #[error(transparent)]
    Foundation(#[from] HcError),
}

impl From<std::io::Error> for MappingError {
    fn from(err: std::io::Error) -> Self {
        Self::Foundation(HcError::from(err))
    }
}

impl MappingError {
    /// 创建形状不匹配错误
    pub fn shape_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_identifier_lists_ids() {
        let err = MappingError::UnknownIdentifier {
            table: "svat_basin".into(),
            missing: vec![4, 9],
        };
        let msg = err.to_string();
        assert!(msg.contains("[4, 9]"));
        assert!(msg.contains("svat_basin"));
    }

    #[test]
    fn test_io_conversion() {
        let err: MappingError = std::io::Error::new(std::io::ErrorKind::NotFound, "x").into();
        assert!(matches!(err, MappingError::Foundation(HcError::Io { .. })));
    }
}
