// crates/hc_driver/src/generate.rs

//! 映射表生成
//!
//! 按配置中的 `mapping` 段选择耦合策略，读取预处理数组，生成映射表并
//! 写入输出目录。运行本身只读取生成后的文件。

use crate::error::CouplerError;
use hc_config::mapping::{basin_values, SubunitGridInput};
use hc_config::{ConfigError, CouplingConfig, MappingGenerationConfig, PathResolver, StrategyInput, StrategyKind};
use hc_mapping::{
    BoundaryPackage, CouplingStrategy, GroundwaterLandSurface, LandSurfaceSurfaceWater, SubunitGrid,
    SurfaceWaterGroundwater, UnitLookup, WellLocation,
};
use std::path::PathBuf;
use tracing::info;

fn subunit_grid(input: &StrategyInput) -> Result<SubunitGrid, CouplerError> {
    let SubunitGridInput {
        n_subunit,
        n_row,
        n_col,
        units,
    } = input
        .grid
        .clone()
        .ok_or_else(|| ConfigError::Missing("mapping.input: grid".into()))?;
    Ok(SubunitGrid::new(n_subunit, n_row, n_col, units)?)
}

/// 由配置构建耦合策略
pub fn build_strategy(
    config: &MappingGenerationConfig,
    paths: &PathResolver,
) -> Result<CouplingStrategy, CouplerError> {
    let input = StrategyInput::from_file(paths.resolve(&config.input))?;
    input.check_for(config.strategy)?;

    let lookup = match &config.unit_listing {
        Some(listing) => Some(UnitLookup::read_unit_listing(paths.resolve(listing))?),
        None => None,
    };

    let strategy = match config.strategy {
        StrategyKind::GroundwaterLandSurface => {
            CouplingStrategy::GroundwaterLandSurface(GroundwaterLandSurface {
                grid: subunit_grid(&input)?,
                idomain_top: input.idomain_top,
                wells: input
                    .wells
                    .iter()
                    .map(|w| WellLocation {
                        row: w.row,
                        col: w.col,
                        layer: w.layer,
                    })
                    .collect(),
                lookup,
            })
        }
        StrategyKind::SurfaceWaterGroundwater => {
            CouplingStrategy::SurfaceWaterGroundwater(SurfaceWaterGroundwater {
                basin_ids: input.basin_ids,
                packages: input
                    .packages
                    .iter()
                    .map(|p| BoundaryPackage {
                        name: p.name.clone(),
                        cell_basin: basin_values(&p.cell_basin),
                        active: p.active.clone(),
                    })
                    .collect(),
            })
        }
        StrategyKind::LandSurfaceSurfaceWater => {
            CouplingStrategy::LandSurfaceSurfaceWater(LandSurfaceSurfaceWater {
                grid: subunit_grid(&input)?,
                basin_ids: input.basin_ids,
                cell_basin: basin_values(&input.cell_basin),
                lookup,
            })
        }
    };
    Ok(strategy)
}

/// 生成配置声明的全部映射表，返回写出的文件
pub fn generate_mappings(config: &CouplingConfig) -> Result<Vec<PathBuf>, CouplerError> {
    let generation = config
        .mapping
        .as_ref()
        .ok_or_else(|| ConfigError::Missing("mapping".into()))?;
    let paths = config.paths();

    info!(
        "Generating mappings with strategy '{}' from {}",
        generation.strategy,
        generation.input.display()
    );
    let strategy = build_strategy(generation, &paths)?;
    let written = strategy.write_exchanges(paths.resolve(&generation.output_dir))?;

    for e in &config.exchanges {
        let mapping = paths.resolve(&e.mapping);
        if !written.contains(&mapping) && !mapping.is_file() {
            tracing::warn!(
                "Exchange '{}' refers to {} which the strategy did not produce",
                e.name,
                mapping.display()
            );
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;

    fn config(dir: &std::path::Path, strategy: &str) -> CouplingConfig {
        let doc = json!({
            "end_time": 1.0,
            "kernels": [{"name": "gw", "library": "libgw.so", "time_step": 1.0}],
            "mapping": {"strategy": strategy, "input": "prep.json", "output_dir": "maps"}
        });
        CouplingConfig::from_json_str(&doc.to_string(), dir).unwrap()
    }

    #[test]
    fn test_surface_water_groundwater_tables() {
        let dir = tempfile::tempdir().unwrap();
        let prep = json!({
            "basin_ids": [20, 10],
            "packages": [
                {"name": "RIV", "cell_basin": [10.0, null, 20.0], "active": [true, true, true]},
                {"name": "DRN", "cell_basin": [20.0, 20.0, 20.0], "active": [false, true, false]}
            ]
        });
        std::fs::write(dir.path().join("prep.json"), prep.to_string()).unwrap();

        let written = generate_mappings(&config(dir.path(), "surface_water_groundwater")).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("maps/riv_basin.tsv"), dir.path().join("maps/drn_basin.tsv")]
        );

        let riv = hc_mapping::MappingTable::read(&written[0]).unwrap();
        let pairs: Vec<_> = riv.iter().map(|p| (p.source, p.target)).collect();
        assert_eq!(pairs, vec![(0, 1), (2, 0)]);
    }

    #[test]
    fn test_missing_strategy_input_field_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prep.json"), r#"{"idomain_top": [1]}"#).unwrap();
        let err = generate_mappings(&config(dir.path(), "groundwater_land_surface")).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_without_mapping_section() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({
            "end_time": 1.0,
            "kernels": [{"name": "gw", "library": "libgw.so", "time_step": 1.0}]
        });
        let cfg = CouplingConfig::from_json_str(&doc.to_string(), dir.path()).unwrap();
        assert!(matches!(
            generate_mappings(&cfg),
            Err(CouplerError::Configuration(ConfigError::Missing(_)))
        ));
    }
}
