// crates/hc_config/src/mapping.rs

//! 映射生成配置
//!
//! 运行前由预处理数据生成映射表。配置选择一种耦合策略，并给出保存
//! 预处理数组的 JSON 输入文件；生成的 `<表名>.tsv` 写入 `output_dir`，
//! 交换声明中的 `mapping` 再引用这些文件。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 耦合策略类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// 地下水 ↔ 地表（node_svat，可选 well_svat）
    GroundwaterLandSurface,
    /// 地表水 ↔ 地下水（每个边界程序包一张 `<包名>_basin`）
    SurfaceWaterGroundwater,
    /// 地表 ↔ 地表水（svat_basin）
    LandSurfaceSurfaceWater,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GroundwaterLandSurface => "groundwater_land_surface",
            Self::SurfaceWaterGroundwater => "surface_water_groundwater",
            Self::LandSurfaceSurfaceWater => "land_surface_surface_water",
        };
        f.pad(s)
    }
}

/// 映射生成配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingGenerationConfig {
    /// 策略
    pub strategy: StrategyKind,
    /// 预处理数组（JSON）
    pub input: PathBuf,
    /// 地表模型耦合清单（每行 `mod_id svat layer`），缺省时内部索引为编号减一
    #[serde(default)]
    pub unit_listing: Option<PathBuf>,
    /// 映射表输出目录
    #[serde(default = "default_mapping_dir")]
    pub output_dir: PathBuf,
}

fn default_mapping_dir() -> PathBuf {
    PathBuf::from("exchanges")
}

/// 子单元网格
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubunitGridInput {
    /// 子单元数
    pub n_subunit: usize,
    /// 行数
    pub n_row: usize,
    /// 列数
    pub n_col: usize,
    /// `(subunit, row, col)` 行优先的地表单元编号，0 表示无
    pub units: Vec<i64>,
}

/// 井的位置（0 起始的行列，1 起始的层）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WellInput {
    /// 行
    pub row: usize,
    /// 列
    pub col: usize,
    /// 层
    pub layer: usize,
}

/// 与子流域耦合的边界程序包
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageInput {
    /// 程序包名
    pub name: String,
    /// 每个网格单元所属子流域，`null` 表示不属于任何子流域
    pub cell_basin: Vec<Option<f64>>,
    /// 网格单元上是否存在该程序包的边界
    pub active: Vec<bool>,
}

/// 预处理数组
///
/// 各策略只读取自己需要的字段。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StrategyInput {
    /// 地表单元网格
    #[serde(default)]
    pub grid: Option<SubunitGridInput>,
    /// 地下水顶层 idomain
    #[serde(default)]
    pub idomain_top: Vec<i32>,
    /// 灌溉抽水井
    #[serde(default)]
    pub wells: Vec<WellInput>,
    /// 子流域编号（地表水模型自然顺序）
    #[serde(default)]
    pub basin_ids: Vec<i64>,
    /// 边界程序包
    #[serde(default)]
    pub packages: Vec<PackageInput>,
    /// 每个网格单元所属子流域
    #[serde(default)]
    pub cell_basin: Vec<Option<f64>>,
}

impl StrategyInput {
    /// 从 JSON 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))
    }

    /// 检查策略所需字段是否齐全
    pub fn check_for(&self, strategy: StrategyKind) -> Result<(), ConfigError> {
        let need_grid = || {
            self.grid
                .as_ref()
                .map(|_| ())
                .ok_or_else(|| ConfigError::Missing(format!("{strategy}: grid")))
        };
        let need_basins = || {
            if self.basin_ids.is_empty() {
                Err(ConfigError::Missing(format!("{strategy}: basin_ids")))
            } else {
                Ok(())
            }
        };
        match strategy {
            StrategyKind::GroundwaterLandSurface => {
                need_grid()?;
                if self.idomain_top.is_empty() {
                    return Err(ConfigError::Missing(format!("{strategy}: idomain_top")));
                }
            }
            StrategyKind::SurfaceWaterGroundwater => {
                need_basins()?;
                if self.packages.is_empty() {
                    return Err(ConfigError::Missing(format!("{strategy}: packages")));
                }
            }
            StrategyKind::LandSurfaceSurfaceWater => {
                need_grid()?;
                need_basins()?;
                if self.cell_basin.is_empty() {
                    return Err(ConfigError::Missing(format!("{strategy}: cell_basin")));
                }
            }
        }
        Ok(())
    }
}

/// `null` 展开为 NaN
pub fn basin_values(cells: &[Option<f64>]) -> Vec<f64> {
    cells.iter().map(|c| c.unwrap_or(f64::NAN)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generation_config_defaults() {
        let cfg: MappingGenerationConfig = serde_json::from_str(
            r#"{"strategy": "land_surface_surface_water", "input": "prep/land.json"}"#,
        )
        .unwrap();
        assert_eq!(cfg.strategy, StrategyKind::LandSurfaceSurfaceWater);
        assert_eq!(cfg.output_dir, PathBuf::from("exchanges"));
        assert!(cfg.unit_listing.is_none());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = serde_json::from_str::<MappingGenerationConfig>(
            r#"{"strategy": "river_ocean", "input": "x.json"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_required_fields_per_strategy() {
        let input: StrategyInput = serde_json::from_str(
            r#"{"basin_ids": [1, 2], "packages": [{"name": "RIV", "cell_basin": [1.0, null], "active": [true, true]}]}"#,
        )
        .unwrap();
        assert!(input.check_for(StrategyKind::SurfaceWaterGroundwater).is_ok());
        assert!(matches!(
            input.check_for(StrategyKind::GroundwaterLandSurface),
            Err(ConfigError::Missing(ref m)) if m.contains("grid")
        ));

        let values = basin_values(&input.packages[0].cell_basin);
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
    }
}
