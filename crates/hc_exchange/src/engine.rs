// crates/hc_exchange/src/engine.rs

//! 交换引擎
//!
//! [`PreparedExchange`] 在运行开始前对映射表做一次性检查（索引范围、
//! 目标唯一性、平均权重），之后每一步的 [`PreparedExchange::apply`] 只做
//! 读取、聚合与原地写入，不分配新的目标数组。

use crate::error::ExchangeError;
use hc_config::{AggregationKind, ConversionConfig, Direction, ExchangeConfig};
use hc_kernel::VariableView;
use hc_mapping::{MappingError, MappingTable};
use std::collections::BTreeMap;

/// 单位与符号换算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    /// 乘数
    pub factor: f64,
    /// 是否除以步长
    pub divide_by_dt: bool,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            factor: 1.0,
            divide_by_dt: false,
        }
    }
}

impl From<ConversionConfig> for Conversion {
    fn from(c: ConversionConfig) -> Self {
        Self {
            factor: c.factor,
            divide_by_dt: c.divide_by_dt,
        }
    }
}

/// 交换描述
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSpec {
    /// 名称
    pub name: String,
    /// 聚合方式
    pub aggregation: AggregationKind,
    /// 换算
    pub conversion: Conversion,
    /// 方向
    pub direction: Direction,
}

impl ExchangeSpec {
    /// 创建默认换算、求解前方向的交换
    pub fn new(name: impl Into<String>, aggregation: AggregationKind) -> Self {
        Self {
            name: name.into(),
            aggregation,
            conversion: Conversion::default(),
            direction: Direction::BeforeSolve,
        }
    }

    /// 设置换算
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }
}

impl From<&ExchangeConfig> for ExchangeSpec {
    fn from(c: &ExchangeConfig) -> Self {
        Self {
            name: c.name.clone(),
            aggregation: c.aggregation,
            conversion: c.conversion.into(),
            direction: c.direction,
        }
    }
}

/// 一次交换涉及的视图
#[derive(Debug, Clone, Copy)]
pub struct ExchangeViews<'a> {
    /// 源
    pub source: &'a VariableView<f64>,
    /// 目标
    pub target: &'a VariableView<f64>,
}

/// 一次交换的结果摘要
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeReport {
    /// 交换名称
    pub name: String,
    /// 处理的对应关系数
    pub pairs: usize,
    /// 写入的目标单元数
    pub targets_written: usize,
    /// 写入值之和
    pub total: f64,
}

/// 经过检查的交换计划
#[derive(Debug, Clone)]
pub struct PreparedExchange {
    spec: ExchangeSpec,
    table: MappingTable,
    /// 每个被映射目标的权重和
    target_weights: BTreeMap<usize, f64>,
}

impl PreparedExchange {
    /// 检查映射表并生成计划
    ///
    /// - 所有索引必须落在视图长度内；
    /// - identity 要求映射表长度等于源长度且目标唯一；
    /// - broadcast 要求每个目标只来自一个源。
    pub fn prepare(
        spec: ExchangeSpec,
        table: MappingTable,
        source_len: usize,
        target_len: usize,
    ) -> Result<Self, ExchangeError> {
        table.validate_bounds(source_len, target_len)?;

        if spec.aggregation == AggregationKind::Identity && table.len() != source_len {
            return Err(MappingError::shape_mismatch(
                format!("交换 '{}' identity 映射表", spec.name),
                source_len,
                table.len(),
            )
            .into());
        }

        let unique_targets = matches!(
            spec.aggregation,
            AggregationKind::Identity | AggregationKind::Broadcast
        );
        let mut target_weights: BTreeMap<usize, f64> = BTreeMap::new();
        for p in table.iter() {
            match target_weights.get_mut(&p.target) {
                Some(_) if unique_targets => {
                    return Err(MappingError::ConflictingTarget {
                        table: table.name().to_string(),
                        target: p.target,
                        aggregation: spec.aggregation.to_string(),
                    }
                    .into());
                }
                Some(w) => *w += p.weight_or_one(),
                None => {
                    target_weights.insert(p.target, p.weight_or_one());
                }
            }
        }

        if spec.aggregation == AggregationKind::Average {
            if let Some((&t, _)) = target_weights.iter().find(|(_, &w)| w == 0.0) {
                return Err(MappingError::shape_mismatch(
                    format!("交换 '{}' 目标 {t} 的权重和", spec.name),
                    1,
                    0,
                )
                .into());
            }
        }

        tracing::debug!(
            "Prepared exchange '{}' ({}): {} pairs onto {} targets",
            spec.name,
            spec.aggregation,
            table.len(),
            target_weights.len()
        );
        Ok(Self {
            spec,
            table,
            target_weights,
        })
    }

    /// 交换描述
    pub fn spec(&self) -> &ExchangeSpec {
        &self.spec
    }

    /// 映射表
    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// 被映射的目标索引（升序）
    pub fn mapped_targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.target_weights.keys().copied()
    }

    fn scale(&self, dt: f64) -> Result<f64, ExchangeError> {
        let c = self.spec.conversion;
        if c.divide_by_dt {
            if !(dt > 0.0) || !dt.is_finite() {
                return Err(ExchangeError::InvalidTimeStep {
                    exchange: self.spec.name.clone(),
                    dt,
                });
            }
            Ok(c.factor / dt)
        } else {
            Ok(c.factor)
        }
    }

    /// 执行交换，原地写入目标视图
    pub fn apply(&self, views: ExchangeViews<'_>, dt: f64) -> Result<ExchangeReport, ExchangeError> {
        let ExchangeViews { source, target } = views;
        if source.overlaps(target) {
            return Err(ExchangeError::AliasedViews {
                exchange: self.spec.name.clone(),
            });
        }
        let scale = self.scale(dt)?;

        match self.spec.aggregation {
            AggregationKind::Identity | AggregationKind::Broadcast => {
                for p in self.table.iter() {
                    let v = source.get(p.source)? * p.weight_or_one() * scale;
                    target.set(p.target, v)?;
                }
            }
            AggregationKind::Sum | AggregationKind::Average => {
                for t in self.mapped_targets() {
                    target.set(t, 0.0)?;
                }
                for p in self.table.iter() {
                    let v = source.get(p.source)? * p.weight_or_one() * scale;
                    target.add(p.target, v)?;
                }
                if self.spec.aggregation == AggregationKind::Average {
                    for (&t, &w) in &self.target_weights {
                        target.scale(t, 1.0 / w)?;
                    }
                }
            }
        }

        let mut total = 0.0;
        for t in self.mapped_targets() {
            total += target.get(t)?;
        }
        Ok(ExchangeReport {
            name: self.spec.name.clone(),
            pairs: self.table.len(),
            targets_written: self.target_weights.len(),
            total,
        })
    }
}

/// 一次性交换：检查映射表后立即执行
pub fn apply(
    spec: &ExchangeSpec,
    table: &MappingTable,
    views: ExchangeViews<'_>,
    dt: f64,
) -> Result<ExchangeReport, ExchangeError> {
    PreparedExchange::prepare(spec.clone(), table.clone(), views.source.len(), views.target.len())?
        .apply(views, dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hc_config::EngineKind;
    use hc_kernel::{KernelAdapter, MemoryEngine, VariableAddress};

    fn adapter(name: &str, source: Vec<f64>, target: Vec<f64>) -> KernelAdapter {
        let engine = MemoryEngine::new(name).with_f64("src", source).with_f64("dst", target);
        let mut k = KernelAdapter::new(name, EngineKind::Generic, Box::new(engine));
        k.initialize().unwrap();
        k
    }

    fn views(k: &KernelAdapter) -> (VariableView<f64>, VariableView<f64>) {
        (
            k.get_value_view(&VariableAddress::plain("src")).unwrap(),
            k.get_value_view(&VariableAddress::plain("dst")).unwrap(),
        )
    }

    #[test]
    fn test_sum_groups_sources_and_leaves_unmapped() {
        let k = adapter("k", vec![1.0, 2.0, 3.0], vec![9.0, 9.0, 9.0]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 0), (1, 0), (2, 1)]);
        let spec = ExchangeSpec::new("sum", AggregationKind::Sum);
        let report = apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 1.0).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![3.0, 3.0, 9.0]);
        assert_eq!(report.targets_written, 2);
        assert!((report.total - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_identity_length_mismatch() {
        let k = adapter("k", vec![1.0, 2.0, 3.0], vec![0.0; 3]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 0), (1, 1)]);
        let spec = ExchangeSpec::new("id", AggregationKind::Identity);
        let err = apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 1.0).unwrap_err();
        assert!(matches!(err, ExchangeError::Mapping(MappingError::ShapeMismatch { expected: 3, actual: 2, .. })));
    }

    #[test]
    fn test_identity_with_conversion() {
        let k = adapter("k", vec![1.0, 2.0], vec![0.0, 0.0]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 1), (1, 0)]);
        let spec = ExchangeSpec::new("id", AggregationKind::Identity).with_conversion(Conversion {
            factor: -2.0,
            divide_by_dt: true,
        });
        apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 0.5).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![-8.0, -4.0]);
    }

    #[test]
    fn test_broadcast_and_conflict() {
        let k = adapter("k", vec![5.0, 7.0], vec![0.0; 4]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 0), (0, 1), (1, 3)]);
        let spec = ExchangeSpec::new("bc", AggregationKind::Broadcast);
        apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 1.0).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![5.0, 5.0, 0.0, 7.0]);

        let conflicting = MappingTable::from_index_pairs("t", [(0, 0), (1, 0)]);
        assert!(matches!(
            PreparedExchange::prepare(spec, conflicting, 2, 4),
            Err(ExchangeError::Mapping(MappingError::ConflictingTarget { target: 0, .. }))
        ));
    }

    #[test]
    fn test_average() {
        let k = adapter("k", vec![1.0, 3.0, 10.0], vec![-1.0, -1.0, -1.0]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 2), (1, 2), (2, 0)]);
        let spec = ExchangeSpec::new("avg", AggregationKind::Average);
        apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 1.0).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![10.0, -1.0, 2.0]);
    }

    #[test]
    fn test_out_of_bounds_and_aliasing() {
        let k = adapter("k", vec![1.0], vec![0.0]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 1)]);
        let spec = ExchangeSpec::new("sum", AggregationKind::Sum);
        assert!(matches!(
            apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 1.0),
            Err(ExchangeError::Mapping(MappingError::IndexOutOfBounds { .. }))
        ));

        let ok_table = MappingTable::from_index_pairs("t", [(0, 0)]);
        assert!(matches!(
            apply(&spec, &ok_table, ExchangeViews { source: &src, target: &src }, 1.0),
            Err(ExchangeError::AliasedViews { .. })
        ));
    }

    #[test]
    fn test_divide_by_zero_dt_rejected() {
        let k = adapter("k", vec![1.0], vec![0.0]);
        let (src, dst) = views(&k);
        let table = MappingTable::from_index_pairs("t", [(0, 0)]);
        let spec = ExchangeSpec::new("rate", AggregationKind::Sum).with_conversion(Conversion {
            factor: 1.0,
            divide_by_dt: true,
        });
        assert!(matches!(
            apply(&spec, &table, ExchangeViews { source: &src, target: &dst }, 0.0),
            Err(ExchangeError::InvalidTimeStep { .. })
        ));
    }
}
