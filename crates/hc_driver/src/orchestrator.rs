// crates/hc_driver/src/orchestrator.rs

//! 耦合驱动
//!
//! [`Orchestrator`] 持有全部内核适配器与交换计划，按状态机推进：
//!
//! 1. Setup：按声明顺序初始化内核，构建交换计划，打开交换记录；
//! 2. Running：逐个粗步长按错步调度推进各内核，每一步依次执行
//!    `prepare_time_step`、目标为该内核的求解前交换、`advance`、
//!    源为该内核的求解后交换、`finalize_time_step`；
//! 3. Finalizing：按声明逆序终止所有内核，每个内核恰好一次；
//! 4. Done / Failed。
//!
//! 任何阶段的失败都会经过 Finalizing，返回第一个错误。
//!
//! # 外迭代耦合
//!
//! 配置 `iteration` 后，主导内核与伙伴内核组成一组，在主导内核的调度
//! 位置上一起推进一个时间步：
//!
//! ```text
//! prepare_time_step（全组）→ 组外流入交换 → 主导→伙伴交换
//! leader.prepare_solve
//! 循环至多 max_iterations 次:
//!     partner.prepare_solve / solve → 伙伴→主导交换
//!     converged = leader.solve → 主导→伙伴交换
//!     partner.finalize_solve
//!     收敛则退出
//! leader.finalize_solve → 组外流出交换 → finalize_time_step（全组）
//! ```
//!
//! 组内交换忽略声明的方向。未收敛时记录警告并继续下一步。

use crate::error::CouplerError;
use crate::events::{DriverEvent, EventDispatcher, EventListener};
use crate::plan::ExchangePlan;
use crate::schedule::StaggeredSchedule;
use crate::state::DriverState;
use crate::summary::{KernelStats, RunSummary};
use chrono::Local;
use hc_config::{ConfigError, CouplingConfig, Direction, IterationConfig};
use hc_exchange::{CsvSink, ExchangeCollector, ExchangeError};
use hc_foundation::TIME_TOLERANCE;
use hc_kernel::KernelAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 外迭代耦合组（声明顺序中的位置）
#[derive(Debug, Clone)]
struct IterationGroup {
    leader: usize,
    partners: Vec<usize>,
    solution_id: i32,
    /// 0 表示在 Setup 阶段向主导内核查询
    max_iterations: usize,
}

impl IterationGroup {
    fn resolve(config: &IterationConfig, kernels: &[KernelAdapter]) -> Result<Self, ConfigError> {
        let position = |name: &str| {
            kernels
                .iter()
                .position(|k| k.name() == name)
                .ok_or_else(|| ConfigError::UnknownKernel {
                    context: "iteration".to_string(),
                    kernel: name.to_string(),
                })
        };
        Ok(Self {
            leader: position(&config.kernel)?,
            partners: config
                .partners
                .iter()
                .map(|p| position(p))
                .collect::<Result<_, _>>()?,
            solution_id: config.solution_id,
            max_iterations: config.max_iterations.unwrap_or(0),
        })
    }

    fn contains(&self, k: usize) -> bool {
        self.leader == k || self.partners.contains(&k)
    }

    fn members(&self) -> Vec<usize> {
        std::iter::once(self.leader)
            .chain(self.partners.iter().copied())
            .collect()
    }
}

/// 耦合驱动
pub struct Orchestrator {
    config: CouplingConfig,
    /// 声明顺序
    kernels: Vec<KernelAdapter>,
    /// 耦合顺序 → 声明顺序中的位置
    coupling_order: Vec<usize>,
    schedule: StaggeredSchedule,
    plans: Vec<ExchangePlan>,
    group: Option<IterationGroup>,
    collector: ExchangeCollector,
    events: EventDispatcher,
    cancel: Arc<AtomicBool>,
    state: DriverState,
    time: f64,
    coarse_done: usize,
    exchanges_applied: u64,
    summary: Option<RunSummary>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("time", &self.time)
            .field("kernels", &self.kernels)
            .field("exchanges", &self.plans.len())
            .finish()
    }
}

impl Orchestrator {
    // =========================================================================
    // 构造
    // =========================================================================

    /// 由配置创建，每个内核使用共享库引擎
    pub fn new(config: CouplingConfig) -> Result<Self, CouplerError> {
        let paths = config.paths();
        let kernels = config
            .kernels
            .iter()
            .map(|k| KernelAdapter::from_config(k, &paths))
            .collect();
        Self::with_kernels(config, kernels)
    }

    /// 使用调用方提供的内核适配器创建
    ///
    /// 适配器名称必须与配置中的内核声明一一对应，顺序不限。
    pub fn with_kernels(
        config: CouplingConfig,
        kernels: Vec<KernelAdapter>,
    ) -> Result<Self, CouplerError> {
        config.validate()?;

        let mut slots: Vec<Option<KernelAdapter>> = config.kernels.iter().map(|_| None).collect();
        for adapter in kernels {
            let pos = config
                .kernels
                .iter()
                .position(|k| k.name == adapter.name())
                .ok_or_else(|| ConfigError::UnknownKernel {
                    context: "kernel adapters".to_string(),
                    kernel: adapter.name().to_string(),
                })?;
            slots[pos] = Some(adapter.with_timing(config.timing));
        }
        let kernels = slots
            .into_iter()
            .zip(&config.kernels)
            .map(|(slot, cfg)| {
                slot.ok_or_else(|| ConfigError::Missing(format!("内核 '{}' 的适配器", cfg.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let coupling_order = config
            .ordered_kernel_names()
            .into_iter()
            .map(|name| {
                kernels
                    .iter()
                    .position(|k| k.name() == name)
                    .ok_or_else(|| ConfigError::UnknownKernel {
                        context: "coupling_order".to_string(),
                        kernel: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let steps: Vec<f64> = coupling_order
            .iter()
            .map(|&i| config.kernels[i].time_step)
            .collect();
        let schedule = StaggeredSchedule::new(steps).ok_or_else(|| {
            ConfigError::invalid_value("kernels.time_step", config.coarse_time_step(), "步长不能整除粗步长")
        })?;

        let group = config
            .iteration
            .as_ref()
            .map(|it| IterationGroup::resolve(it, &kernels))
            .transpose()?;

        let time = config.start_time;
        Ok(Self {
            config,
            kernels,
            coupling_order,
            schedule,
            plans: Vec::new(),
            group,
            collector: ExchangeCollector::new(),
            events: EventDispatcher::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            state: DriverState::Setup,
            time,
            coarse_done: 0,
            exchanges_applied: 0,
            summary: None,
        })
    }

    /// 添加事件监听器
    pub fn with_listener(self, listener: Arc<dyn EventListener>) -> Self {
        self.events.add_listener(listener);
        self
    }

    // =========================================================================
    // 查询
    // =========================================================================

    /// 当前状态
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// 当前模拟时间
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 配置
    pub fn config(&self) -> &CouplingConfig {
        &self.config
    }

    /// 事件分发器
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// 按名称查找内核
    pub fn kernel(&self, name: &str) -> Option<&KernelAdapter> {
        self.kernels.iter().find(|k| k.name() == name)
    }

    /// 交换记录器
    pub fn collector(&self) -> &ExchangeCollector {
        &self.collector
    }

    /// 取消句柄，置位后在下一个粗步开始前停止
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// 最近一次运行的摘要（失败时也会生成）
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    // =========================================================================
    // 运行
    // =========================================================================

    /// 执行完整的耦合运行
    pub fn run(&mut self) -> Result<RunSummary, CouplerError> {
        if self.state != DriverState::Setup {
            return Err(CouplerError::InvalidTransition {
                from: self.state,
                to: DriverState::Running,
            });
        }
        let started_at = Local::now();
        let clock = Instant::now();

        let result = self.setup().and_then(|()| {
            self.transition(DriverState::Running)?;
            self.run_loop()
        });

        self.transition(DriverState::Finalizing)?;
        let cleanup = self.finalize_all();

        let outcome = match (result, cleanup) {
            (Err(e), _) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        };
        let final_state = if outcome.is_ok() {
            DriverState::Done
        } else {
            DriverState::Failed
        };
        self.transition(final_state)?;

        let summary = self.build_summary(started_at, clock.elapsed().as_secs_f64());
        self.summary = Some(summary.clone());
        match outcome {
            Ok(()) => {
                tracing::info!(
                    "Coupled run done: {} coarse steps, t={}",
                    summary.coarse_steps,
                    summary.sim_time
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Coupled run failed at t={}: {}", self.time, e);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: DriverState) -> Result<(), CouplerError> {
        if !self.state.can_transition_to(next) {
            return Err(CouplerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let from = std::mem::replace(&mut self.state, next);
        self.events.emit(DriverEvent::StateChanged { from, to: next });
        Ok(())
    }

    fn setup(&mut self) -> Result<(), CouplerError> {
        for kernel in self.kernels.iter_mut() {
            kernel.initialize()?;
            let start = kernel.current_time()?;
            if (start - self.config.start_time).abs() > TIME_TOLERANCE * start.abs().max(1.0) {
                tracing::warn!(
                    "Kernel '{}' starts at t={} but the coupled run starts at t={}",
                    kernel.name(),
                    start,
                    self.config.start_time
                );
            }
            self.events.emit(DriverEvent::KernelInitialized {
                kernel: kernel.name().to_string(),
                version: kernel.version(),
            });
        }

        if let Some(group) = self.group.as_mut() {
            let leader = &self.kernels[group.leader];
            if group.max_iterations == 0 {
                group.max_iterations = leader.max_iterations()?.max(1);
            }
            tracing::info!(
                "Kernel '{}' leads outer iterations with {} partners (max {} iterations)",
                leader.name(),
                group.partners.len(),
                group.max_iterations
            );
        }

        let paths = self.config.paths();
        for exchange in &self.config.exchanges {
            let plan = ExchangePlan::build(exchange, &self.kernels, &paths)?;
            self.plans.push(plan);
        }

        if let Some(log) = &self.config.exchange_log {
            let mut collector = ExchangeCollector::from_config(log, &paths)?;
            let output_dir = paths.resolve(&log.output_dir);
            for exchange in self.config.exchanges.iter().filter(|e| e.log) {
                if !collector.is_logged(&exchange.name) {
                    std::fs::create_dir_all(&output_dir).map_err(ExchangeError::Io)?;
                    let path = output_dir.join(format!("{}.csv", exchange.name));
                    collector.add_sink(exchange.name.clone(), Box::new(CsvSink::new(path)));
                }
            }
            self.collector = collector;
        }

        tracing::info!(
            "Setup complete: {} kernels, {} exchanges, coarse step {}",
            self.kernels.len(),
            self.plans.len(),
            self.schedule.window()
        );
        Ok(())
    }

    fn run_loop(&mut self) -> Result<(), CouplerError> {
        let total = self.config.coarse_steps();
        let window = self.schedule.window();

        for c in 0..total {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("Cancellation requested before coarse step {}", c + 1);
                return Err(CouplerError::Cancelled { time: self.time });
            }
            let window_start = self.config.start_time + c as f64 * window;
            for step in self.schedule.window_steps(window_start) {
                let k = self.coupling_order[step.kernel];
                let role = self.group.as_ref().map(|g| (g.leader == k, g.contains(k)));
                match role {
                    Some((true, _)) => self.iterative_step(step.dt, step.end)?,
                    // 伙伴随主导内核推进
                    Some((false, true)) => {}
                    _ => self.kernel_step(k, step.dt, step.end)?,
                }
            }
            self.time = self.config.start_time + (c + 1) as f64 * window;
            self.coarse_done = c + 1;
            self.events.emit(DriverEvent::CoarseStepCompleted {
                step: c + 1,
                time: self.time,
            });
        }
        Ok(())
    }

    fn kernel_step(&mut self, k: usize, dt: f64, end: f64) -> Result<(), CouplerError> {
        self.kernels[k].prepare_time_step(dt)?;
        self.apply_exchanges(k, Direction::BeforeSolve, dt, end)?;
        self.kernels[k].advance()?;
        self.apply_exchanges(k, Direction::AfterSolve, dt, end)?;
        self.kernels[k].finalize_time_step()?;

        let kernel = &self.kernels[k];
        self.events.emit(DriverEvent::KernelStepCompleted {
            kernel: kernel.name().to_string(),
            time: end,
            step: kernel.steps(),
        });
        Ok(())
    }

    fn iterative_step(&mut self, dt: f64, end: f64) -> Result<(), CouplerError> {
        let Some(group) = self.group.clone() else {
            return Ok(());
        };
        let members = group.members();
        let leader = group.leader;
        let sol = group.solution_id;
        let inside =
            |p: &ExchangePlan| group.contains(p.source_kernel()) && group.contains(p.target_kernel());

        for &k in &members {
            self.kernels[k].prepare_time_step(dt)?;
        }
        self.apply_matching(dt, end, |p| {
            p.direction() == Direction::BeforeSolve
                && group.contains(p.target_kernel())
                && !group.contains(p.source_kernel())
        })?;
        self.apply_matching(dt, end, |p| inside(p) && p.source_kernel() == leader)?;

        self.kernels[leader].prepare_solve(sol)?;
        let mut converged = false;
        let mut iterations = 0;
        while iterations < group.max_iterations {
            iterations += 1;
            for &k in &group.partners {
                self.kernels[k].prepare_solve(0)?;
                self.kernels[k].solve(0)?;
            }
            self.apply_matching(dt, end, |p| inside(p) && p.source_kernel() != leader)?;
            converged = self.kernels[leader].solve(sol)?;
            self.apply_matching(dt, end, |p| inside(p) && p.source_kernel() == leader)?;
            for &k in &group.partners {
                self.kernels[k].finalize_solve(0)?;
            }
            if converged {
                break;
            }
        }
        self.kernels[leader].finalize_solve(sol)?;

        self.events.emit(DriverEvent::SolveCompleted {
            kernel: self.kernels[leader].name().to_string(),
            time: end,
            iterations,
            converged,
        });

        self.apply_matching(dt, end, |p| {
            p.direction() == Direction::AfterSolve
                && group.contains(p.source_kernel())
                && !group.contains(p.target_kernel())
        })?;
        for &k in &members {
            self.kernels[k].finalize_time_step()?;
        }
        for &k in &members {
            let kernel = &self.kernels[k];
            self.events.emit(DriverEvent::KernelStepCompleted {
                kernel: kernel.name().to_string(),
                time: end,
                step: kernel.steps(),
            });
        }
        Ok(())
    }

    /// 求解前执行目标为 `k` 的交换，求解后执行源为 `k` 的交换
    fn apply_exchanges(
        &mut self,
        k: usize,
        direction: Direction,
        dt: f64,
        time: f64,
    ) -> Result<(), CouplerError> {
        self.apply_matching(dt, time, |plan| {
            let endpoint = match direction {
                Direction::BeforeSolve => plan.target_kernel(),
                Direction::AfterSolve => plan.source_kernel(),
            };
            plan.direction() == direction && endpoint == k
        })
    }

    /// 按声明顺序执行满足条件的交换
    fn apply_matching(
        &mut self,
        dt: f64,
        time: f64,
        selected: impl Fn(&ExchangePlan) -> bool,
    ) -> Result<(), CouplerError> {
        for plan in &self.plans {
            if !selected(plan) {
                continue;
            }
            let report = plan.apply(dt)?;
            self.exchanges_applied += 1;
            self.collector.log_exchange(plan.name(), time, plan.target_view())?;
            self.events.emit(DriverEvent::ExchangeApplied {
                exchange: report.name,
                time,
                total: report.total,
            });
        }
        Ok(())
    }

    /// 按声明逆序终止所有内核，返回第一个错误
    fn finalize_all(&mut self) -> Result<(), CouplerError> {
        let mut first: Option<CouplerError> = None;

        if let Err(e) = self.collector.finalize() {
            first.get_or_insert(e.into());
        }

        for kernel in self.kernels.iter_mut().rev() {
            let was_initialized = kernel.is_initialized();
            if let Err(e) = kernel.finalize() {
                tracing::error!("Finalize of kernel '{}' failed: {}", kernel.name(), e);
                first.get_or_insert(e.into());
            }
            if was_initialized {
                self.events.emit(DriverEvent::KernelFinalized {
                    kernel: kernel.name().to_string(),
                });
            }
        }
        self.plans.clear();

        first.map_or(Ok(()), Err)
    }

    fn build_summary(&self, started_at: chrono::DateTime<Local>, elapsed_secs: f64) -> RunSummary {
        RunSummary {
            state: self.state,
            started_at,
            elapsed_secs,
            coarse_steps: self.coarse_done,
            sim_time: self.time,
            exchanges_applied: self.exchanges_applied,
            kernels: self
                .kernels
                .iter()
                .map(|k| KernelStats {
                    name: k.name().to_string(),
                    steps: k.steps(),
                    engine_secs: k.timing_total().map(|d| d.as_secs_f64()),
                })
                .collect(),
        }
    }
}
