// crates/hc_mapping/src/table.rs

//! 映射表
//!
//! 有序的 `(source_index, target_index[, weight])` 对。文件格式为带表头的
//! 分隔文本（默认制表符），列名必须为 `source_index`、`target_index`，
//! 可选第三列 `weight`。

use crate::error::MappingError;
use hc_foundation::HcError;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

/// 源索引列名
pub const SOURCE_COLUMN: &str = "source_index";
/// 目标索引列名
pub const TARGET_COLUMN: &str = "target_index";
/// 权重列名
pub const WEIGHT_COLUMN: &str = "weight";

/// 一条对应关系
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingPair {
    /// 源离散化中的索引
    pub source: usize,
    /// 目标离散化中的索引
    pub target: usize,
    /// 可选权重
    pub weight: Option<f64>,
}

impl MappingPair {
    /// 无权重的对应关系
    pub fn new(source: usize, target: usize) -> Self {
        Self {
            source,
            target,
            weight: None,
        }
    }

    /// 权重（缺省为 1）
    #[inline]
    pub fn weight_or_one(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

/// 文件格式选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFormat {
    /// 分隔符
    pub delimiter: u8,
    /// 读取时交换源列与目标列
    pub reverse: bool,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            reverse: false,
        }
    }
}

impl TableFormat {
    /// 交换源列与目标列
    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// 映射表
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTable {
    name: String,
    pairs: Vec<MappingPair>,
}

impl MappingTable {
    /// 由对应关系创建
    pub fn new(name: impl Into<String>, pairs: Vec<MappingPair>) -> Self {
        Self {
            name: name.into(),
            pairs,
        }
    }

    /// 由无权重索引对创建
    pub fn from_index_pairs(
        name: impl Into<String>,
        pairs: impl IntoIterator<Item = (usize, usize)>,
    ) -> Self {
        Self::new(
            name,
            pairs.into_iter().map(|(s, t)| MappingPair::new(s, t)).collect(),
        )
    }

    /// 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 对应关系数
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// 全部对应关系
    pub fn pairs(&self) -> &[MappingPair] {
        &self.pairs
    }

    /// 迭代
    pub fn iter(&self) -> std::slice::Iter<'_, MappingPair> {
        self.pairs.iter()
    }

    /// 是否带权重
    pub fn has_weights(&self) -> bool {
        self.pairs.iter().any(|p| p.weight.is_some())
    }

    /// 最大源索引
    pub fn max_source(&self) -> Option<usize> {
        self.pairs.iter().map(|p| p.source).max()
    }

    /// 最大目标索引
    pub fn max_target(&self) -> Option<usize> {
        self.pairs.iter().map(|p| p.target).max()
    }

    /// 交换源与目标
    pub fn inverted(&self) -> Self {
        Self {
            name: self.name.clone(),
            pairs: self
                .pairs
                .iter()
                .map(|p| MappingPair {
                    source: p.target,
                    target: p.source,
                    weight: p.weight,
                })
                .collect(),
        }
    }

    /// 每个目标索引对应的源数量
    pub fn target_multiplicity(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.pairs {
            *counts.entry(p.target).or_insert(0) += 1;
        }
        counts
    }

    /// 检查所有索引是否落在给定长度内
    pub fn validate_bounds(&self, n_source: usize, n_target: usize) -> Result<(), MappingError> {
        for p in &self.pairs {
            if p.source >= n_source {
                return Err(MappingError::IndexOutOfBounds {
                    table: self.name.clone(),
                    side: "源",
                    index: p.source,
                    len: n_source,
                });
            }
            if p.target >= n_target {
                return Err(MappingError::IndexOutOfBounds {
                    table: self.name.clone(),
                    side: "目标",
                    index: p.target,
                    len: n_target,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // 文件读写
    // =========================================================================

    /// 读取制表符分隔的映射文件，名称取文件名（不含扩展名）
    pub fn read(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        Self::read_with(path, TableFormat::default())
    }

    /// 按指定格式读取
    pub fn read_with(path: impl AsRef<Path>, format: TableFormat) -> Result<Self, MappingError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(HcError::file_not_found(path).into());
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = std::fs::File::open(path)?;
        Self::from_reader(name, std::io::BufReader::new(file), path, format)
    }

    /// 从任意读取器解析；`origin` 仅用于错误信息
    pub fn from_reader<R: Read>(
        name: impl Into<String>,
        reader: R,
        origin: &Path,
        format: TableFormat,
    ) -> Result<Self, MappingError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(format.delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| HcError::parse(origin, 1, e.to_string()))?
            .clone();
        let found: Vec<String> = headers.iter().map(str::to_string).collect();
        let has_weight = match found.as_slice() {
            [s, t] if s == SOURCE_COLUMN && t == TARGET_COLUMN => false,
            [s, t, w] if s == SOURCE_COLUMN && t == TARGET_COLUMN && w == WEIGHT_COLUMN => true,
            _ => {
                return Err(MappingError::InvalidHeader {
                    path: origin.to_path_buf(),
                    found,
                    expected: format!("{SOURCE_COLUMN}, {TARGET_COLUMN}[, {WEIGHT_COLUMN}]"),
                })
            }
        };

        let mut pairs = Vec::new();
        for result in csv_reader.records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                HcError::parse(origin, line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

            let index = |col: usize, label: &str| -> Result<usize, MappingError> {
                let raw = record.get(col).unwrap_or("");
                raw.parse::<usize>().map_err(|_| {
                    HcError::parse(origin, line, format!("{label} '{raw}' 不是非负整数")).into()
                })
            };
            let source = index(0, SOURCE_COLUMN)?;
            let target = index(1, TARGET_COLUMN)?;
            let weight = if has_weight {
                let raw = record.get(2).unwrap_or("");
                let w = raw.parse::<f64>().map_err(|_| {
                    HcError::parse(origin, line, format!("{WEIGHT_COLUMN} '{raw}' 不是数值"))
                })?;
                Some(w)
            } else {
                None
            };

            let (source, target) = if format.reverse {
                (target, source)
            } else {
                (source, target)
            };
            pairs.push(MappingPair {
                source,
                target,
                weight,
            });
        }

        tracing::debug!("Read mapping '{}' with {} pairs", origin.display(), pairs.len());
        Ok(Self::new(name, pairs))
    }

    /// 写入制表符分隔的映射文件
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), MappingError> {
        let file = std::fs::File::create(path.as_ref())?;
        self.to_writer(std::io::BufWriter::new(file), b'\t')
    }

    /// 写入任意写入器
    pub fn to_writer<W: Write>(&self, writer: W, delimiter: u8) -> Result<(), MappingError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        let csv_err = |e: csv::Error| HcError::io(format!("写入映射 '{}' 失败: {e}", self.name));

        let with_weights = self.has_weights();
        if with_weights {
            csv_writer
                .write_record([SOURCE_COLUMN, TARGET_COLUMN, WEIGHT_COLUMN])
                .map_err(csv_err)?;
        } else {
            csv_writer
                .write_record([SOURCE_COLUMN, TARGET_COLUMN])
                .map_err(csv_err)?;
        }

        for p in &self.pairs {
            let mut row = vec![p.source.to_string(), p.target.to_string()];
            if with_weights {
                row.push(p.weight_or_one().to_string());
            }
            csv_writer.write_record(&row).map_err(csv_err)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MappingTable {
    type Item = &'a MappingPair;
    type IntoIter = std::slice::Iter<'a, MappingPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(text: &str, reverse: bool) -> Result<MappingTable, MappingError> {
        MappingTable::from_reader(
            "t",
            text.as_bytes(),
            &PathBuf::from("t.tsv"),
            TableFormat::default().reversed(reverse),
        )
    }

    #[test]
    fn test_parse_two_columns() {
        let table = parse("source_index\ttarget_index\n0\t0\n1\t0\n2\t1\n", false).unwrap();
        assert_eq!(table.len(), 3);
        assert!(!table.has_weights());
        assert_eq!(table.pairs()[2], MappingPair::new(2, 1));
    }

    #[test]
    fn test_parse_weights_and_reverse() {
        let table = parse("source_index\ttarget_index\tweight\n4\t1\t0.5\n", true).unwrap();
        let p = table.pairs()[0];
        assert_eq!((p.source, p.target), (1, 4));
        assert_eq!(p.weight, Some(0.5));
    }

    #[test]
    fn test_wrong_header_rejected() {
        let err = parse("basin_index\tbound_index\n0\t0\n", false).unwrap_err();
        assert!(matches!(err, MappingError::InvalidHeader { .. }));
    }

    #[test]
    fn test_bad_cell_reports_line() {
        let err = parse("source_index\ttarget_index\n0\t0\nx\t1\n", false).unwrap_err();
        match err {
            MappingError::Foundation(HcError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_index_rejected() {
        assert!(parse("source_index\ttarget_index\n-1\t0\n", false).is_err());
    }

    #[test]
    fn test_multiplicity_and_bounds() {
        let table = MappingTable::from_index_pairs("t", [(0, 0), (1, 0), (2, 1)]);
        let m = table.target_multiplicity();
        assert_eq!(m[&0], 2);
        assert_eq!(m[&1], 1);
        assert!(table.validate_bounds(3, 2).is_ok());
        assert!(matches!(
            table.validate_bounds(2, 2),
            Err(MappingError::IndexOutOfBounds { index: 2, len: 2, .. })
        ));
        assert!(table.validate_bounds(3, 1).is_err());
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_svat.tsv");
        let table = MappingTable::new(
            "node_svat",
            vec![
                MappingPair { source: 0, target: 3, weight: Some(0.25) },
                MappingPair::new(1, 2),
            ],
        );
        table.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("source_index\ttarget_index\tweight\n"));

        let back = MappingTable::read(&path).unwrap();
        assert_eq!(back.name(), "node_svat");
        assert_eq!(back.pairs()[1].weight, Some(1.0));
    }

    #[test]
    fn test_missing_file() {
        let err = MappingTable::read("/nonexistent/map.tsv").unwrap_err();
        assert!(matches!(err, MappingError::Foundation(HcError::FileNotFound { .. })));
    }
}
