// crates/hc_mapping/src/builder.rs

//! 映射构建
//!
//! 离散化 A 的每个单元带有一个位于 B 标识符空间中的标识符（NaN 表示无
//! 数据）。构建过程：
//!
//! 1. 过滤活动单元：标识符为有限数值且通过耦合掩码；
//! 2. 校验所有活动单元的标识符都存在于 B 中，缺失时一次性列出；
//! 3. 在 B 的有序标识符上二分查找，得到 B 中的自然位置；
//! 4. 按 A 的自然（行优先）顺序输出对应关系。
//!
//! 多对一是允许的，交换引擎负责求和。

use crate::error::MappingError;
use crate::table::{MappingPair, MappingTable};
use std::collections::BTreeSet;

/// 源索引编号方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Numbering {
    /// A 数组中的原始索引
    #[default]
    Raw,
    /// 在通过掩码的单元中的序号（仅由活动单元建立的边界程序包使用）
    Compressed,
}

/// 单元是否活动
#[inline]
pub fn is_active(id: f64, mask: bool) -> bool {
    mask && id.is_finite()
}

/// 检查活动单元数是否与构建时一致
pub fn verify_active_count(table: &str, expected: usize, actual: usize) -> Result<(), MappingError> {
    if expected == actual {
        Ok(())
    } else {
        Err(MappingError::InconsistentActiveCount {
            table: table.to_string(),
            expected,
            actual,
        })
    }
}

/// B 的标识符索引
///
/// 保存 B 自然顺序下的标识符，按标识符排序以便二分查找。
#[derive(Debug, Clone)]
pub struct TargetIndex {
    sorted: Vec<(i64, usize)>,
}

impl TargetIndex {
    /// 由 B 自然顺序的标识符列表创建
    pub fn new(ids: &[i64]) -> Result<Self, MappingError> {
        let mut sorted: Vec<(i64, usize)> = ids.iter().copied().zip(0..).collect();
        sorted.sort_unstable();
        if let Some(w) = sorted.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(MappingError::DuplicateIdentifier { id: w[0].0 });
        }
        Ok(Self { sorted })
    }

    /// 由浮点标识符创建（必须为整数）
    pub fn from_f64(ids: &[f64]) -> Result<Self, MappingError> {
        let ints = ids
            .iter()
            .enumerate()
            .map(|(i, &v)| to_identifier(i, v))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(&ints)
    }

    /// 标识符个数
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// 标识符在 B 中的自然位置
    pub fn position(&self, id: i64) -> Option<usize> {
        self.sorted
            .binary_search_by_key(&id, |&(k, _)| k)
            .ok()
            .map(|i| self.sorted[i].1)
    }
}

fn to_identifier(index: usize, value: f64) -> Result<i64, MappingError> {
    // i64::MAX as f64 为 2^63，已超出 i64 范围
    if value.fract() != 0.0 || !(i64::MIN as f64..i64::MAX as f64).contains(&value) {
        return Err(MappingError::NonIntegralIdentifier { index, value });
    }
    Ok(value as i64)
}

/// 映射构建器
#[derive(Debug, Clone)]
pub struct MappingBuilder<'a> {
    name: String,
    source_ids: &'a [f64],
    mask: Option<&'a [bool]>,
    weights: Option<&'a [f64]>,
    numbering: Numbering,
}

impl<'a> MappingBuilder<'a> {
    /// 创建构建器，`source_ids` 为 A 每个单元在 B 空间中的标识符
    pub fn new(name: impl Into<String>, source_ids: &'a [f64]) -> Self {
        Self {
            name: name.into(),
            source_ids,
            mask: None,
            weights: None,
            numbering: Numbering::Raw,
        }
    }

    /// 设置耦合掩码
    pub fn with_mask(mut self, mask: &'a [bool]) -> Self {
        self.mask = Some(mask);
        self
    }

    /// 设置每个 A 单元的权重
    pub fn with_weights(mut self, weights: &'a [f64]) -> Self {
        self.weights = Some(weights);
        self
    }

    /// 设置源索引编号方式
    pub fn numbering(mut self, numbering: Numbering) -> Self {
        self.numbering = numbering;
        self
    }

    fn mask_at(&self, i: usize) -> bool {
        self.mask.map_or(true, |m| m[i])
    }

    fn check_shapes(&self) -> Result<(), MappingError> {
        let n = self.source_ids.len();
        if let Some(mask) = self.mask {
            if mask.len() != n {
                return Err(MappingError::shape_mismatch(
                    format!("{} 掩码", self.name),
                    n,
                    mask.len(),
                ));
            }
        }
        if let Some(weights) = self.weights {
            if weights.len() != n {
                return Err(MappingError::shape_mismatch(
                    format!("{} 权重", self.name),
                    n,
                    weights.len(),
                ));
            }
        }
        Ok(())
    }

    /// 活动单元在 A 中的索引
    pub fn active_units(&self) -> Result<Vec<usize>, MappingError> {
        self.check_shapes()?;
        Ok((0..self.source_ids.len())
            .filter(|&i| is_active(self.source_ids[i], self.mask_at(i)))
            .collect())
    }

    /// 活动单元数
    pub fn active_count(&self) -> Result<usize, MappingError> {
        Ok(self.active_units()?.len())
    }

    /// 构建映射表
    pub fn build(&self, targets: &TargetIndex) -> Result<MappingTable, MappingError> {
        self.check_shapes()?;

        let mut missing = BTreeSet::new();
        let mut resolved = Vec::new();
        let mut rank = 0usize;

        for (i, &id) in self.source_ids.iter().enumerate() {
            let in_mask = self.mask_at(i);
            let source = match self.numbering {
                Numbering::Raw => i,
                Numbering::Compressed => rank,
            };
            if in_mask {
                rank += 1;
            }
            if !is_active(id, in_mask) {
                continue;
            }

            let id = to_identifier(i, id)?;
            match targets.position(id) {
                Some(target) => resolved.push(MappingPair {
                    source,
                    target,
                    weight: self.weights.map(|w| w[i]),
                }),
                None => {
                    missing.insert(id);
                }
            }
        }

        if !missing.is_empty() {
            return Err(MappingError::UnknownIdentifier {
                table: self.name.clone(),
                missing: missing.into_iter().collect(),
            });
        }

        tracing::debug!(
            "Built mapping '{}': {} pairs from {} units",
            self.name,
            resolved.len(),
            self.source_ids.len()
        );
        Ok(MappingTable::new(self.name.clone(), resolved))
    }
}
