// crates/hc_mapping/src/grid.rs

//! 子单元网格与内部索引查找
//!
//! 地表模型的一个网格单元可以包含多个子单元（土地利用层），每个子单元
//! 对应一个地表单元编号（0 表示无）。地下水节点编号为顶层活动单元
//! （`idomain >= 1`）按行优先排列的序号。

use crate::error::MappingError;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// 子单元网格，按 `(subunit, row, col)` 行优先存储地表单元编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubunitGrid {
    n_subunit: usize,
    n_row: usize,
    n_col: usize,
    units: Vec<i64>,
}

impl SubunitGrid {
    /// 创建网格
    pub fn new(n_subunit: usize, n_row: usize, n_col: usize, units: Vec<i64>) -> Result<Self, MappingError> {
        let expected = n_subunit * n_row * n_col;
        if units.len() != expected {
            return Err(MappingError::shape_mismatch("子单元网格", expected, units.len()));
        }
        Ok(Self {
            n_subunit,
            n_row,
            n_col,
            units,
        })
    }

    /// 子单元数
    pub fn n_subunit(&self) -> usize {
        self.n_subunit
    }

    /// 每层网格单元数
    pub fn n_cell(&self) -> usize {
        self.n_row * self.n_col
    }

    /// 行数与列数
    pub fn shape(&self) -> (usize, usize) {
        (self.n_row, self.n_col)
    }

    /// 取得 `(subunit, row, col)` 处的地表单元编号
    pub fn unit(&self, subunit: usize, row: usize, col: usize) -> i64 {
        self.units[(subunit * self.n_row + row) * self.n_col + col]
    }

    /// 按 `(subunit, cell)` 行优先迭代 `(subunit, cell, unit)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, i64)> + '_ {
        let n_cell = self.n_cell();
        self.units
            .iter()
            .enumerate()
            .map(move |(i, &u)| (i / n_cell, i % n_cell, u))
    }

    /// 活动地表单元数
    pub fn active_count(&self) -> usize {
        self.units.iter().filter(|&&u| u > 0).count()
    }
}

/// 井的位置（0 起始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellLocation {
    /// 行
    pub row: usize,
    /// 列
    pub col: usize,
    /// 层（1 起始，与地表模型约定一致）
    pub layer: usize,
}

/// 节点与地表单元的一条对应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeUnit {
    /// 地下水节点（0 起始）
    pub node: usize,
    /// 地表单元编号
    pub unit: i64,
}

/// 井与地表单元的一条对应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellUnit {
    /// 井在程序包中的序号
    pub well: usize,
    /// 地表单元编号
    pub unit: i64,
    /// 井所在层
    pub layer: usize,
}

/// 顶层网格单元到地下水节点的编号
///
/// 返回值长度为网格单元数，非活动单元为 `None`。
pub fn node_numbers(idomain_top: &[i32]) -> Vec<Option<usize>> {
    let mut next = 0;
    idomain_top
        .iter()
        .map(|&d| {
            if d >= 1 {
                next += 1;
                Some(next - 1)
            } else {
                None
            }
        })
        .collect()
}

/// 地下水节点与地表单元的对应，按 `(subunit, row, col)` 顺序
///
/// 活动地表单元位于非活动地下水单元之上时返回错误。
pub fn node_unit_pairs(grid: &SubunitGrid, idomain_top: &[i32]) -> Result<Vec<NodeUnit>, MappingError> {
    if idomain_top.len() != grid.n_cell() {
        return Err(MappingError::shape_mismatch("idomain", grid.n_cell(), idomain_top.len()));
    }
    let nodes = node_numbers(idomain_top);
    let (_, n_col) = grid.shape();

    let mut pairs = Vec::with_capacity(grid.active_count());
    for (_, cell, unit) in grid.iter() {
        if unit <= 0 {
            continue;
        }
        match nodes[cell] {
            Some(node) => pairs.push(NodeUnit { node, unit }),
            None => {
                return Err(MappingError::InactiveCoupling {
                    unit,
                    row: cell / n_col,
                    col: cell % n_col,
                })
            }
        }
    }
    Ok(pairs)
}

/// 井与地表单元的对应，按井序号、子单元顺序
pub fn well_unit_pairs(grid: &SubunitGrid, wells: &[WellLocation]) -> Result<Vec<WellUnit>, MappingError> {
    let (n_row, n_col) = grid.shape();
    let mut pairs = Vec::new();
    for (well, loc) in wells.iter().enumerate() {
        if loc.row >= n_row || loc.col >= n_col {
            return Err(MappingError::IndexOutOfBounds {
                table: "well_svat".to_string(),
                side: "井",
                index: loc.row * n_col + loc.col,
                len: n_row * n_col,
            });
        }
        for s in 0..grid.n_subunit() {
            let unit = grid.unit(s, loc.row, loc.col);
            if unit > 0 {
                pairs.push(WellUnit {
                    well,
                    unit,
                    layer: loc.layer,
                });
            }
        }
    }
    Ok(pairs)
}

/// 地表单元 `(编号, 层)` 到地表模型内部索引的查找表
#[derive(Debug, Clone, Default)]
pub struct UnitLookup {
    index: HashMap<(i64, usize), usize>,
}

impl UnitLookup {
    /// 由按内部顺序排列的 `(编号, 层)` 创建
    pub fn from_keys(keys: impl IntoIterator<Item = (i64, usize)>) -> Self {
        Self {
            index: keys.into_iter().enumerate().map(|(i, k)| (k, i)).collect(),
        }
    }

    /// 读取地表模型的耦合清单（每行 `mod_id svat layer`，空白分隔）
    pub fn read_unit_listing(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut keys = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            let parse = |s: &str| -> Result<i64, MappingError> {
                s.parse::<i64>().map_err(|_| {
                    hc_foundation::HcError::parse(path, i + 1, format!("'{s}' 不是整数")).into()
                })
            };
            match fields.as_slice() {
                [_, unit, layer, ..] => {
                    let layer = parse(*layer)?;
                    keys.push((parse(*unit)?, layer.max(0) as usize));
                }
                _ => {
                    return Err(hc_foundation::HcError::parse(path, i + 1, "期望至少 3 列").into());
                }
            }
        }
        Ok(Self::from_keys(keys))
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 查找内部索引
    pub fn get(&self, unit: i64, layer: usize) -> Option<usize> {
        self.index.get(&(unit, layer)).copied()
    }

    /// 批量查找，缺失的编号一次性报告
    pub fn resolve_all(
        &self,
        table: &str,
        keys: impl IntoIterator<Item = (i64, usize)>,
    ) -> Result<Vec<usize>, MappingError> {
        let mut missing = BTreeSet::new();
        let mut out = Vec::new();
        for (unit, layer) in keys {
            match self.get(unit, layer) {
                Some(i) => out.push(i),
                None => {
                    missing.insert(unit);
                }
            }
        }
        if missing.is_empty() {
            Ok(out)
        } else {
            Err(MappingError::UnknownIdentifier {
                table: table.to_string(),
                missing: missing.into_iter().collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2 个子单元，2x2 网格
    fn grid() -> SubunitGrid {
        SubunitGrid::new(2, 2, 2, vec![1, 2, 0, 3, 4, 0, 0, 5]).unwrap()
    }

    #[test]
    fn test_node_numbers_skip_inactive() {
        assert_eq!(node_numbers(&[1, 0, 2, -1, 1]), vec![Some(0), None, Some(1), None, Some(2)]);
    }

    #[test]
    fn test_node_unit_pairs_tile_over_subunits() {
        let pairs = node_unit_pairs(&grid(), &[1, 1, 0, 1]).unwrap();
        let got: Vec<_> = pairs.iter().map(|p| (p.node, p.unit)).collect();
        assert_eq!(got, vec![(0, 1), (1, 2), (2, 3), (0, 4), (2, 5)]);
    }

    #[test]
    fn test_unit_on_inactive_cell_is_error() {
        let err = node_unit_pairs(&grid(), &[1, 0, 1, 1]).unwrap_err();
        assert!(matches!(err, MappingError::InactiveCoupling { unit: 2, row: 0, col: 1 }));
    }

    #[test]
    fn test_well_unit_pairs() {
        let wells = [WellLocation { row: 0, col: 0, layer: 3 }, WellLocation { row: 1, col: 0, layer: 2 }];
        let pairs = well_unit_pairs(&grid(), &wells).unwrap();
        assert_eq!(
            pairs,
            vec![
                WellUnit { well: 0, unit: 1, layer: 3 },
                WellUnit { well: 0, unit: 4, layer: 3 },
            ]
        );
        let outside = [WellLocation { row: 5, col: 0, layer: 1 }];
        assert!(well_unit_pairs(&grid(), &outside).is_err());
    }

    #[test]
    fn test_unit_lookup_reports_missing() {
        let lookup = UnitLookup::from_keys([(1, 1), (2, 1), (1, 3)]);
        assert_eq!(lookup.get(1, 3), Some(2));
        assert_eq!(lookup.resolve_all("t", [(2, 1), (1, 1)]).unwrap(), vec![1, 0]);
        let err = lookup.resolve_all("t", [(7, 1), (2, 1), (7, 2), (5, 1)]).unwrap_err();
        assert!(matches!(err, MappingError::UnknownIdentifier { ref missing, .. } if missing == &vec![5, 7]));
    }

    #[test]
    fn test_read_unit_listing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod2svat.inp");
        std::fs::write(&path, "         1         1    1\n         2         2    1\n\n         1         3    1\n").unwrap();
        let lookup = UnitLookup::read_unit_listing(&path).unwrap();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.get(3, 1), Some(2));

        std::fs::write(&path, "1 x 1\n").unwrap();
        assert!(UnitLookup::read_unit_listing(&path).is_err());
    }
}
