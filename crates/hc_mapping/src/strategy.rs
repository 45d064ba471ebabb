// crates/hc_mapping/src/strategy.rs

//! 耦合策略
//!
//! 三种受支持的内核组合各自知道如何从预处理数据生成映射表。策略是一个
//! 封闭的枚举，由配置选择。

use crate::builder::{MappingBuilder, Numbering, TargetIndex};
use crate::error::MappingError;
use crate::grid::{node_unit_pairs, well_unit_pairs, SubunitGrid, UnitLookup, WellLocation};
use crate::table::{MappingPair, MappingTable};
use std::path::{Path, PathBuf};

/// 地下水 ↔ 地表
#[derive(Debug, Clone)]
pub struct GroundwaterLandSurface {
    /// 地表单元网格
    pub grid: SubunitGrid,
    /// 地下水顶层 idomain
    pub idomain_top: Vec<i32>,
    /// 灌溉抽水井
    pub wells: Vec<WellLocation>,
    /// 地表模型内部索引查找（缺省时内部索引为编号减一）
    pub lookup: Option<UnitLookup>,
}

/// 一个地下水边界程序包
#[derive(Debug, Clone)]
pub struct BoundaryPackage {
    /// 程序包名
    pub name: String,
    /// 每个网格单元所属的子流域编号（NaN 表示不属于任何子流域）
    pub cell_basin: Vec<f64>,
    /// 网格单元上是否存在该程序包的边界
    pub active: Vec<bool>,
}

/// 地表水 ↔ 地下水
#[derive(Debug, Clone)]
pub struct SurfaceWaterGroundwater {
    /// 子流域编号（地表水模型自然顺序）
    pub basin_ids: Vec<i64>,
    /// 与子流域耦合的边界程序包
    pub packages: Vec<BoundaryPackage>,
}

/// 地表 ↔ 地表水
#[derive(Debug, Clone)]
pub struct LandSurfaceSurfaceWater {
    /// 子流域编号（地表水模型自然顺序）
    pub basin_ids: Vec<i64>,
    /// 地表单元网格
    pub grid: SubunitGrid,
    /// 每个网格单元所属的子流域编号
    pub cell_basin: Vec<f64>,
    /// 地表模型内部索引查找
    pub lookup: Option<UnitLookup>,
}

/// 耦合策略
#[derive(Debug, Clone)]
pub enum CouplingStrategy {
    /// 地下水 ↔ 地表
    GroundwaterLandSurface(GroundwaterLandSurface),
    /// 地表水 ↔ 地下水
    SurfaceWaterGroundwater(SurfaceWaterGroundwater),
    /// 地表 ↔ 地表水
    LandSurfaceSurfaceWater(LandSurfaceSurfaceWater),
}

fn land_indices(
    table: &str,
    lookup: Option<&UnitLookup>,
    keys: impl IntoIterator<Item = (i64, usize)>,
) -> Result<Vec<usize>, MappingError> {
    match lookup {
        Some(l) => l.resolve_all(table, keys),
        None => Ok(keys.into_iter().map(|(u, _)| (u - 1).max(0) as usize).collect()),
    }
}

impl CouplingStrategy {
    /// 策略名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::GroundwaterLandSurface(_) => "groundwater_land_surface",
            Self::SurfaceWaterGroundwater(_) => "surface_water_groundwater",
            Self::LandSurfaceSurfaceWater(_) => "land_surface_surface_water",
        }
    }

    /// 生成全部映射表
    pub fn derive_mapping(&self) -> Result<Vec<MappingTable>, MappingError> {
        match self {
            Self::GroundwaterLandSurface(s) => s.derive(),
            Self::SurfaceWaterGroundwater(s) => s.derive(),
            Self::LandSurfaceSurfaceWater(s) => s.derive(),
        }
    }

    /// 生成映射表并写入目录，文件名为 `<表名>.tsv`
    pub fn write_exchanges(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, MappingError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let tables = self.derive_mapping()?;
        let mut written = Vec::with_capacity(tables.len());
        for table in &tables {
            let path = dir.join(format!("{}.tsv", table.name()));
            table.write(&path)?;
            written.push(path);
        }
        tracing::info!(
            "Strategy '{}' wrote {} mapping files to {}",
            self.name(),
            written.len(),
            dir.display()
        );
        Ok(written)
    }
}

impl GroundwaterLandSurface {
    fn derive(&self) -> Result<Vec<MappingTable>, MappingError> {
        let nodes = node_unit_pairs(&self.grid, &self.idomain_top)?;
        let targets = land_indices("node_svat", self.lookup.as_ref(), nodes.iter().map(|p| (p.unit, 1)))?;
        let node_svat = MappingTable::new(
            "node_svat",
            nodes
                .iter()
                .zip(targets)
                .map(|(p, t)| MappingPair::new(p.node, t))
                .collect(),
        );

        let mut tables = vec![node_svat];
        if !self.wells.is_empty() {
            let wells = well_unit_pairs(&self.grid, &self.wells)?;
            let targets = land_indices(
                "well_svat",
                self.lookup.as_ref(),
                wells.iter().map(|w| (w.unit, w.layer)),
            )?;
            tables.push(MappingTable::new(
                "well_svat",
                wells
                    .iter()
                    .zip(targets)
                    .map(|(w, t)| MappingPair::new(w.well, t))
                    .collect(),
            ));
        }
        Ok(tables)
    }
}

impl SurfaceWaterGroundwater {
    fn derive(&self) -> Result<Vec<MappingTable>, MappingError> {
        let basins = TargetIndex::new(&self.basin_ids)?;
        self.packages
            .iter()
            .map(|pkg| {
                MappingBuilder::new(format!("{}_basin", pkg.name.to_lowercase()), &pkg.cell_basin)
                    .with_mask(&pkg.active)
                    .numbering(Numbering::Compressed)
                    .build(&basins)
            })
            .collect()
    }
}

impl LandSurfaceSurfaceWater {
    fn derive(&self) -> Result<Vec<MappingTable>, MappingError> {
        let n_cell = self.grid.n_cell();
        if self.cell_basin.len() != n_cell {
            return Err(MappingError::shape_mismatch("cell_basin", n_cell, self.cell_basin.len()));
        }

        // 子流域编号平铺到每个子单元
        let ids: Vec<f64> = self.grid.iter().map(|(_, cell, _)| self.cell_basin[cell]).collect();
        let mask: Vec<bool> = self.grid.iter().map(|(_, _, unit)| unit > 0).collect();
        let units: Vec<i64> = self.grid.iter().map(|(_, _, unit)| unit).collect();

        let basins = TargetIndex::new(&self.basin_ids)?;
        let flat = MappingBuilder::new("svat_basin", &ids).with_mask(&mask).build(&basins)?;

        let sources = land_indices(
            "svat_basin",
            self.lookup.as_ref(),
            flat.iter().map(|p| (units[p.source], 1)),
        )?;
        Ok(vec![MappingTable::new(
            "svat_basin",
            flat.iter()
                .zip(sources)
                .map(|(p, s)| MappingPair::new(s, p.target))
                .collect(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_groundwater_land_surface_tables() {
        let grid = SubunitGrid::new(1, 1, 3, vec![1, 0, 2]).unwrap();
        let strategy = CouplingStrategy::GroundwaterLandSurface(GroundwaterLandSurface {
            grid,
            idomain_top: vec![1, 1, 1],
            wells: vec![WellLocation { row: 0, col: 2, layer: 2 }],
            lookup: Some(UnitLookup::from_keys([(1, 1), (2, 1), (2, 2)])),
        });
        let tables = strategy.derive_mapping().unwrap();
        assert_eq!(tables.len(), 2);

        let node_svat: Vec<_> = tables[0].iter().map(|p| (p.source, p.target)).collect();
        assert_eq!(node_svat, vec![(0, 0), (2, 1)]);
        let well_svat: Vec<_> = tables[1].iter().map(|p| (p.source, p.target)).collect();
        assert_eq!(well_svat, vec![(0, 2)]);
    }

    #[test]
    fn test_surface_water_groundwater_unknown_basin() {
        let strategy = CouplingStrategy::SurfaceWaterGroundwater(SurfaceWaterGroundwater {
            basin_ids: vec![1, 2],
            packages: vec![BoundaryPackage {
                name: "RIV".into(),
                cell_basin: vec![1.0, 3.0, NAN],
                active: vec![true, true, true],
            }],
        });
        let err = strategy.derive_mapping().unwrap_err();
        assert!(matches!(err, MappingError::UnknownIdentifier { ref missing, .. } if missing == &vec![3]));
    }

    #[test]
    fn test_land_surface_surface_water_without_lookup() {
        let grid = SubunitGrid::new(2, 1, 2, vec![1, 2, 3, 0]).unwrap();
        let strategy = CouplingStrategy::LandSurfaceSurfaceWater(LandSurfaceSurfaceWater {
            basin_ids: vec![20, 10],
            grid,
            cell_basin: vec![10.0, NAN],
            lookup: None,
        });
        let tables = strategy.derive_mapping().unwrap();
        let pairs: Vec<_> = tables[0].iter().map(|p| (p.source, p.target)).collect();
        // 单元 1 与 3 位于子流域 10（位置 1），单元 2 所在网格无子流域
        assert_eq!(pairs, vec![(0, 1), (2, 1)]);
    }
}
