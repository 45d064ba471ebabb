// crates/hc_config/src/exchange.rs

//! 交换声明
//!
//! 一个交换描述一次有向、逐步的值传递：从源内核的某个变量经映射表写入
//! 目标内核的某个变量。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 交换方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// 在目标内核求解之前写入其边界输入
    #[default]
    BeforeSolve,
    /// 在源内核求解之后读取其输出
    AfterSolve,
}

/// 聚合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    /// 一对一复制
    Identity,
    /// 多对一求和
    #[default]
    Sum,
    /// 一对多广播
    Broadcast,
    /// 多对一平均
    Average,
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Sum => "sum",
            Self::Broadcast => "broadcast",
            Self::Average => "average",
        };
        f.pad(s)
    }
}

/// 交换端点：内核上的一个变量
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    /// 内核名称
    pub kernel: String,
    /// 逻辑变量名（如 `head`）或引擎原生变量名
    pub variable: String,
    /// 模型名（MODFLOW 6 地址组成部分）
    #[serde(default)]
    pub model: Option<String>,
    /// 程序包名（MODFLOW 6 地址组成部分）
    #[serde(default)]
    pub package: Option<String>,
    /// 二维数组中选取的列
    #[serde(default)]
    pub column: Option<usize>,
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.kernel)?;
        if let Some(model) = &self.model {
            write!(f, "{model}/")?;
        }
        if let Some(package) = &self.package {
            write!(f, "{package}/")?;
        }
        write!(f, "{}", self.variable)
    }
}

/// 单位与符号换算
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConversionConfig {
    /// 乘数（负值表示符号翻转）
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// 是否除以步长（体积转速率）
    #[serde(default)]
    pub divide_by_dt: bool,
}

fn default_factor() -> f64 {
    1.0
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            divide_by_dt: false,
        }
    }
}

/// 单个交换的声明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeConfig {
    /// 交换名称
    pub name: String,
    /// 源端点
    pub source: EndpointConfig,
    /// 目标端点
    pub target: EndpointConfig,
    /// 映射表文件
    pub mapping: PathBuf,
    /// 读取映射表时交换源列与目标列
    #[serde(default)]
    pub reverse: bool,
    /// 聚合方式
    #[serde(default)]
    pub aggregation: AggregationKind,
    /// 交换方向
    #[serde(default)]
    pub direction: Direction,
    /// 换算
    #[serde(default)]
    pub conversion: ConversionConfig,
    /// 活动掩码变量，其活动单元数在运行期间必须保持不变
    #[serde(default)]
    pub active_mask: Option<EndpointConfig>,
    /// 是否记录该交换写入的值
    #[serde(default)]
    pub log: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_exchange_defaults() {
        let json = r#"{
            "name": "recharge",
            "source": {"kernel": "msw", "variable": "volume"},
            "target": {"kernel": "mf6", "variable": "recharge", "model": "GWF_1", "package": "RCH_MSW"},
            "mapping": "exchanges/rch_svat.tsv"
        }"#;
        let ex: ExchangeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(ex.aggregation, AggregationKind::Sum);
        assert_eq!(ex.direction, Direction::BeforeSolve);
        assert!((ex.conversion.factor - 1.0).abs() < 1e-12);
        assert!(!ex.conversion.divide_by_dt);
        assert!(!ex.reverse);
        assert!(ex.active_mask.is_none());
    }

    #[test]
    fn test_direction_snake_case() {
        let d: Direction = serde_json::from_str("\"after_solve\"").unwrap();
        assert_eq!(d, Direction::AfterSolve);
    }

    #[test]
    fn test_endpoint_display() {
        let ep = EndpointConfig {
            kernel: "mf6".into(),
            variable: "X".into(),
            model: Some("GWF_1".into()),
            package: None,
            column: None,
        };
        assert_eq!(ep.to_string(), "mf6:GWF_1/X");
    }
}
