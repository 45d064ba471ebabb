// crates/hc_driver/src/plan.rs

//! 交换计划
//!
//! 启动阶段为每个交换声明读取映射表、取得两端视图、检查索引边界，
//! 并记录活动掩码的活动单元数。运行阶段每次执行交换前重新统计活动单元，
//! 数量变化即报错。

use crate::error::CouplerError;
use hc_config::{ConfigError, Direction, EndpointConfig, ExchangeConfig, PathResolver};
use hc_exchange::{ExchangeReport, ExchangeSpec, ExchangeViews, PreparedExchange};
use hc_kernel::{resolve_address, KernelAdapter, KernelError, VariableView};
use hc_mapping::{is_active, verify_active_count, MappingError, MappingTable, TableFormat};
use std::collections::HashMap;

/// 活动掩码视图，整数掩码（如 IDOMAIN）优先
#[derive(Debug, Clone)]
enum MaskView {
    Int(VariableView<i32>),
    Float(VariableView<f64>),
}

impl MaskView {
    fn resolve(kernel: &KernelAdapter, endpoint: &EndpointConfig) -> Result<Self, KernelError> {
        let address = resolve_address(kernel.kind(), endpoint)?;
        match kernel.get_value_view::<i32>(&address) {
            Ok(view) => Ok(Self::Int(view)),
            Err(KernelError::TypeMismatch { .. }) => {
                kernel.get_value_view::<f64>(&address).map(Self::Float)
            }
            Err(e) => Err(e),
        }
    }

    fn active_count(&self) -> Result<usize, KernelError> {
        match self {
            Self::Int(v) => v.count_where(|x| x > 0),
            Self::Float(v) => v.count_where(|x| is_active(x, x > 0.0)),
        }
    }
}

/// 活动单元数守卫
#[derive(Debug, Clone)]
pub struct ActiveGuard {
    mask: MaskView,
    baseline: usize,
}

impl ActiveGuard {
    /// 启动时的活动单元数
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    /// 重新统计并与启动时比较
    pub fn check(&self, table: &str) -> Result<(), CouplerError> {
        let actual = self.mask.active_count()?;
        verify_active_count(table, self.baseline, actual)?;
        Ok(())
    }
}

/// 一个交换的运行期计划
#[derive(Debug)]
pub struct ExchangePlan {
    prepared: PreparedExchange,
    source_kernel: usize,
    target_kernel: usize,
    source: VariableView<f64>,
    target: VariableView<f64>,
    guard: Option<ActiveGuard>,
}

fn kernel_index(
    kernels: &HashMap<&str, usize>,
    context: &str,
    name: &str,
) -> Result<usize, CouplerError> {
    kernels.get(name).copied().ok_or_else(|| {
        ConfigError::UnknownKernel {
            context: context.to_string(),
            kernel: name.to_string(),
        }
        .into()
    })
}

impl ExchangePlan {
    /// 构建交换计划，`adapters` 必须已初始化
    pub fn build(
        config: &ExchangeConfig,
        adapters: &[KernelAdapter],
        paths: &PathResolver,
    ) -> Result<Self, CouplerError> {
        let by_name: HashMap<&str, usize> = adapters
            .iter()
            .enumerate()
            .map(|(i, k)| (k.name(), i))
            .collect();
        let context = format!("exchanges.{}", config.name);
        let source_kernel = kernel_index(&by_name, &context, &config.source.kernel)?;
        let target_kernel = kernel_index(&by_name, &context, &config.target.kernel)?;

        let format = TableFormat::default().reversed(config.reverse);
        let table = MappingTable::read_with(paths.resolve(&config.mapping), format)?;

        let source = adapters[source_kernel].endpoint_view(&config.source)?;
        let target = adapters[target_kernel].endpoint_view(&config.target)?;

        let prepared = PreparedExchange::prepare(
            ExchangeSpec::from(config),
            table,
            source.len(),
            target.len(),
        )?;

        let guard = match &config.active_mask {
            Some(mask) => {
                let k = kernel_index(&by_name, &context, &mask.kernel)?;
                let mask = MaskView::resolve(&adapters[k], mask)?;
                let baseline = mask.active_count()?;
                if baseline == 0 {
                    return Err(MappingError::InconsistentActiveCount {
                        table: prepared.table().name().to_string(),
                        expected: 1,
                        actual: 0,
                    }
                    .into());
                }
                Some(ActiveGuard { mask, baseline })
            }
            None => None,
        };

        tracing::info!(
            "Exchange '{}' ready: {} -> {} ({} pairs, {:?}{})",
            config.name,
            config.source,
            config.target,
            prepared.table().len(),
            config.direction,
            guard
                .as_ref()
                .map(|g| format!(", {} active units", g.baseline))
                .unwrap_or_default()
        );

        Ok(Self {
            prepared,
            source_kernel,
            target_kernel,
            source,
            target,
            guard,
        })
    }

    /// 交换名称
    pub fn name(&self) -> &str {
        &self.prepared.spec().name
    }

    /// 交换方向
    pub fn direction(&self) -> Direction {
        self.prepared.spec().direction
    }

    /// 源内核（声明顺序中的位置）
    pub fn source_kernel(&self) -> usize {
        self.source_kernel
    }

    /// 目标内核（声明顺序中的位置）
    pub fn target_kernel(&self) -> usize {
        self.target_kernel
    }

    /// 活动单元数守卫
    pub fn guard(&self) -> Option<&ActiveGuard> {
        self.guard.as_ref()
    }

    /// 目标视图
    pub fn target_view(&self) -> &VariableView<f64> {
        &self.target
    }

    /// 检查活动单元数后执行交换
    pub fn apply(&self, dt: f64) -> Result<ExchangeReport, CouplerError> {
        if let Some(guard) = &self.guard {
            guard.check(self.prepared.table().name())?;
        }
        let views = ExchangeViews {
            source: &self.source,
            target: &self.target,
        };
        Ok(self.prepared.apply(views, dt)?)
    }
}
