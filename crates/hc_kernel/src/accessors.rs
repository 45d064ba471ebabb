// crates/hc_kernel/src/accessors.rs

//! 逻辑变量名表
//!
//! 每种引擎类别有一张静态表，把耦合中使用的逻辑变量名映射到引擎原生
//! 变量名，并说明是否需要程序包以及默认选取的列。引擎的特化通过查表
//! 组合实现，适配器本身不随引擎类别变化。
//!
//! 表中找不到的名称按原生变量名处理。

use crate::error::KernelError;
use hc_config::{EndpointConfig, EngineKind};

/// 逻辑变量描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableSpec {
    /// 逻辑名
    pub logical: &'static str,
    /// 引擎原生名
    pub native: &'static str,
    /// 是否需要程序包
    pub needs_package: bool,
    /// 默认程序包
    pub default_package: Option<&'static str>,
    /// 默认选取的列
    pub column: Option<usize>,
}

const fn var(logical: &'static str, native: &'static str) -> VariableSpec {
    VariableSpec {
        logical,
        native,
        needs_package: false,
        default_package: None,
        column: None,
    }
}

const fn pkg_var(
    logical: &'static str,
    native: &'static str,
    default_package: Option<&'static str>,
    column: Option<usize>,
) -> VariableSpec {
    VariableSpec {
        logical,
        native,
        needs_package: true,
        default_package,
        column,
    }
}

/// 地下水模型
const MODFLOW6: &[VariableSpec] = &[
    var("head", "X"),
    pkg_var("recharge", "BOUND", None, Some(0)),
    pkg_var("recharge_nodes", "NODELIST", None, None),
    pkg_var("well_rate", "BOUND", None, Some(0)),
    pkg_var("well_nodes", "NODELIST", None, None),
    pkg_var("river_stage", "BOUND", None, Some(0)),
    pkg_var("river_conductance", "BOUND", None, Some(1)),
    pkg_var("river_bottom", "BOUND", None, Some(2)),
    pkg_var("river_nodes", "NODELIST", None, None),
    pkg_var("river_rhs", "RHS", None, None),
    pkg_var("river_hcof", "HCOF", None, None),
    pkg_var("river_nbound", "NBOUND", None, None),
    pkg_var("drain_elevation", "BOUND", None, Some(0)),
    pkg_var("storage", "SS", Some("STO"), None),
    pkg_var("storage_coefficient_flag", "ISTOR_COEF", Some("STO"), None),
    pkg_var("area", "AREA", Some("DIS"), None),
    pkg_var("top", "TOP", Some("DIS"), None),
    pkg_var("bottom", "BOT", Some("DIS"), None),
    pkg_var("idomain", "IDOMAIN", Some("DIS"), None),
];

/// 非饱和带 / 地表模型
const METASWAP: &[VariableSpec] = &[
    var("head", "dhgwmod"),
    var("volume", "dvsim"),
    var("storage", "dsc1sim"),
    var("ponding", "ts2dfmput"),
    var("sprinkling_demand", "ts2dfmputsp"),
    var("area", "ark"),
];

/// 地表水网络模型
const RIBASIM: &[VariableSpec] = &[
    var("level", "basin.level"),
    var("infiltration", "basin.infiltration"),
    var("drainage", "basin.drainage"),
    var("cumulative_infiltration", "basin.cumulative_infiltration"),
    var("cumulative_drainage", "basin.cumulative_drainage"),
    var("storage", "basin.storage"),
    var("subgrid_level", "basin.subgrid_level"),
    var("user_demand", "user_demand.demand"),
    var("user_realized", "user_demand.cumulative_inflow"),
];

/// 水动力模型
const DFLOW: &[VariableSpec] = &[
    var("water_level", "s1"),
    var("bed_level", "bl"),
    var("discharge", "q1"),
];

/// 引擎类别的变量表
pub fn table(kind: EngineKind) -> &'static [VariableSpec] {
    match kind {
        EngineKind::Modflow6 => MODFLOW6,
        EngineKind::Metaswap => METASWAP,
        EngineKind::Ribasim => RIBASIM,
        EngineKind::Dflow => DFLOW,
        EngineKind::Generic => &[],
    }
}

/// 查找逻辑变量
pub fn lookup(kind: EngineKind, logical: &str) -> Option<&'static VariableSpec> {
    table(kind).iter().find(|v| v.logical == logical)
}

/// 解析后的变量地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableAddress {
    /// 模型名（组合地址时的组件）
    pub component: Option<String>,
    /// 程序包名（组合地址时的子组件）
    pub subcomponent: Option<String>,
    /// 原生变量名
    pub variable: String,
    /// 选取的列
    pub column: Option<usize>,
}

impl VariableAddress {
    /// 直接使用原生地址
    pub fn plain(variable: impl Into<String>) -> Self {
        Self {
            component: None,
            subcomponent: None,
            variable: variable.into(),
            column: None,
        }
    }

    /// 选取一列
    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

/// 按 `COMPONENT/SUBCOMPONENT/VARIABLE` 大写拼接地址
pub fn compose_address(component: &str, subcomponent: Option<&str>, variable: &str) -> String {
    match subcomponent {
        Some(sub) => format!("{component}/{sub}/{variable}").to_uppercase(),
        None => format!("{component}/{variable}").to_uppercase(),
    }
}

/// 将交换端点解析为变量地址
pub fn resolve_address(kind: EngineKind, endpoint: &EndpointConfig) -> Result<VariableAddress, KernelError> {
    let spec = lookup(kind, &endpoint.variable);
    let native = spec.map(|s| s.native).unwrap_or(endpoint.variable.as_str());
    let column = endpoint.column.or(spec.and_then(|s| s.column));

    if kind != EngineKind::Modflow6 {
        return Ok(VariableAddress {
            component: None,
            subcomponent: None,
            variable: native.to_string(),
            column,
        });
    }

    let model = endpoint.model.clone().ok_or_else(|| KernelError::InvalidAddress {
        variable: endpoint.variable.clone(),
        reason: "地下水模型变量需要指定 model".to_string(),
    })?;
    let package = endpoint
        .package
        .clone()
        .or_else(|| spec.and_then(|s| s.default_package).map(str::to_string));
    if spec.map_or(false, |s| s.needs_package) && package.is_none() {
        return Err(KernelError::InvalidAddress {
            variable: endpoint.variable.clone(),
            reason: "该变量需要指定 package".to_string(),
        });
    }

    Ok(VariableAddress {
        component: Some(model),
        subcomponent: package,
        variable: native.to_string(),
        column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(variable: &str, model: Option<&str>, package: Option<&str>) -> EndpointConfig {
        EndpointConfig {
            kernel: "k".into(),
            variable: variable.into(),
            model: model.map(Into::into),
            package: package.map(Into::into),
            column: None,
        }
    }

    #[test]
    fn test_compose_address_uppercase() {
        assert_eq!(compose_address("gwf_1", Some("rch_msw"), "bound"), "GWF_1/RCH_MSW/BOUND");
        assert_eq!(compose_address("gwf_1", None, "x"), "GWF_1/X");
    }

    #[test]
    fn test_modflow_recharge_selects_first_column() {
        let addr = resolve_address(EngineKind::Modflow6, &endpoint("recharge", Some("GWF_1"), Some("RCH_MSW"))).unwrap();
        assert_eq!(addr.variable, "BOUND");
        assert_eq!(addr.column, Some(0));
        assert_eq!(addr.subcomponent.as_deref(), Some("RCH_MSW"));
    }

    #[test]
    fn test_modflow_default_package() {
        let addr = resolve_address(EngineKind::Modflow6, &endpoint("storage", Some("GWF_1"), None)).unwrap();
        assert_eq!(addr.subcomponent.as_deref(), Some("STO"));
        assert_eq!(addr.variable, "SS");
    }

    #[test]
    fn test_modflow_requires_model_and_package() {
        assert!(matches!(
            resolve_address(EngineKind::Modflow6, &endpoint("head", None, None)),
            Err(KernelError::InvalidAddress { .. })
        ));
        assert!(matches!(
            resolve_address(EngineKind::Modflow6, &endpoint("well_rate", Some("GWF_1"), None)),
            Err(KernelError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_other_kinds_use_native_names() {
        let addr = resolve_address(EngineKind::Metaswap, &endpoint("ponding", None, None)).unwrap();
        assert_eq!(addr, VariableAddress::plain("ts2dfmput"));

        let addr = resolve_address(EngineKind::Ribasim, &endpoint("level", None, None)).unwrap();
        assert_eq!(addr.variable, "basin.level");

        let addr = resolve_address(EngineKind::Generic, &endpoint("anything", None, None)).unwrap();
        assert_eq!(addr.variable, "anything");
    }

    #[test]
    fn test_ribasim_cumulative_names() {
        let addr = resolve_address(EngineKind::Ribasim, &endpoint("user_realized", None, None)).unwrap();
        assert_eq!(addr, VariableAddress::plain("user_demand.cumulative_inflow"));
        let addr = resolve_address(EngineKind::Ribasim, &endpoint("cumulative_drainage", None, None)).unwrap();
        assert_eq!(addr, VariableAddress::plain("basin.cumulative_drainage"));
        assert!(lookup(EngineKind::Ribasim, "cumulative_infiltration").is_some());
    }

    #[test]
    fn test_explicit_column_overrides_table() {
        let mut ep = endpoint("river_stage", Some("GWF_1"), Some("RIV_SYS1"));
        ep.column = Some(2);
        assert_eq!(resolve_address(EngineKind::Modflow6, &ep).unwrap().column, Some(2));
    }
}
