// crates/hc_kernel/src/adapter.rs

//! 内核适配器
//!
//! 包装一个 [`XmiEngine`]，负责生命周期状态机、单步调用顺序检查、
//! 变量视图的会话绑定以及可选的耗时统计。

use crate::accessors::{resolve_address, VariableAddress};
use crate::dylib::DylibEngine;
use crate::engine::XmiEngine;
use crate::error::{EngineError, KernelError};
use crate::view::{Session, VariableView, ViewElement};
use hc_config::{EndpointConfig, EngineKind, KernelConfig, PathResolver};
use std::fmt;
use std::time::{Duration, Instant};

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// 尚未初始化
    Uninitialized,
    /// 已初始化
    Initialized,
    /// 已终止
    Finalized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Finalized => write!(f, "Finalized"),
        }
    }
}

/// 单步阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepPhase {
    /// 步间空闲
    Idle,
    /// 已调用 prepare_time_step
    Prepared,
    /// 迭代求解中（prepare_solve 之后）
    Solving,
    /// 已调用 advance 或 finalize_solve
    Advanced,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Prepared => write!(f, "Prepared"),
            Self::Solving => write!(f, "Solving"),
            Self::Advanced => write!(f, "Advanced"),
        }
    }
}

/// 内核适配器
pub struct KernelAdapter {
    name: String,
    kind: EngineKind,
    engine: Box<dyn XmiEngine>,
    state: LifecycleState,
    phase: StepPhase,
    session: Option<Session>,
    timing: Option<Duration>,
    step_dt: f64,
    steps: u64,
}

impl fmt::Debug for KernelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelAdapter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("steps", &self.steps)
            .finish()
    }
}

impl KernelAdapter {
    /// 包装一个引擎
    pub fn new(name: impl Into<String>, kind: EngineKind, engine: Box<dyn XmiEngine>) -> Self {
        Self {
            name: name.into(),
            kind,
            engine,
            state: LifecycleState::Uninitialized,
            phase: StepPhase::Idle,
            session: None,
            timing: None,
            step_dt: 0.0,
            steps: 0,
        }
    }

    /// 按内核声明创建共享库适配器
    pub fn from_config(config: &KernelConfig, paths: &PathResolver) -> Self {
        let engine = DylibEngine::from_config(config, paths);
        Self::new(&config.name, config.kind, Box::new(engine))
    }

    /// 启用耗时统计
    pub fn with_timing(mut self, enabled: bool) -> Self {
        self.timing = enabled.then_some(Duration::ZERO);
        self
    }

    /// 内核名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 引擎类别
    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// 生命周期状态
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// 单步阶段
    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// 是否处于已初始化状态
    pub fn is_initialized(&self) -> bool {
        self.state == LifecycleState::Initialized
    }

    /// 已完成的时间步数
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// 引擎内累计耗时（未启用统计时为 `None`）
    pub fn timing_total(&self) -> Option<Duration> {
        self.timing
    }

    fn lifecycle_error(&self, operation: &'static str) -> KernelError {
        KernelError::InvalidLifecycle {
            kernel: self.name.clone(),
            operation,
            state: format!("{}/{}", self.state, self.phase),
        }
    }

    fn timed<R>(
        &mut self,
        f: impl FnOnce(&mut dyn XmiEngine) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let start = Instant::now();
        let result = f(self.engine.as_mut());
        if let Some(total) = self.timing.as_mut() {
            *total += start.elapsed();
        }
        result
    }

    fn engine_time(&self) -> f64 {
        self.engine.current_time().unwrap_or(f64::NAN)
    }

    // =========================================================================
    // 生命周期
    // =========================================================================

    /// 初始化：Uninitialized → Initialized
    ///
    /// 重复调用返回 [`KernelError::Load`]。
    pub fn initialize(&mut self) -> Result<(), KernelError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(KernelError::Load {
                kernel: self.name.clone(),
                reason: format!("内核已处于 {} 状态，不能重复初始化", self.state),
            });
        }
        let name = self.name.clone();
        self.timed(|e| e.initialize())
            .map_err(|err| match err {
                EngineError::Load { .. } => KernelError::from_engine(&name, 0.0, err),
                other => KernelError::Load {
                    kernel: name.clone(),
                    reason: other.to_string(),
                },
            })?;

        self.state = LifecycleState::Initialized;
        self.phase = StepPhase::Idle;
        self.session = Some(Session::new());
        tracing::info!(
            "Kernel '{}' initialized ({} {})",
            self.name,
            self.engine.component_name(),
            self.engine.version()
        );
        Ok(())
    }

    /// 终止：→ Finalized，幂等
    ///
    /// 只有 Initialized 状态会调用引擎的 `finalize`；所有视图随之失效。
    pub fn finalize(&mut self) -> Result<(), KernelError> {
        match self.state {
            LifecycleState::Finalized => return Ok(()),
            LifecycleState::Uninitialized => {
                self.state = LifecycleState::Finalized;
                return Ok(());
            }
            LifecycleState::Initialized => {}
        }

        if let Some(session) = self.session.take() {
            session.expire();
        }
        self.state = LifecycleState::Finalized;
        self.phase = StepPhase::Idle;

        let name = self.name.clone();
        let result = self.timed(|e| e.finalize());
        tracing::info!("Kernel '{}' finalized after {} steps", self.name, self.steps);
        result.map_err(|err| KernelError::from_engine(&name, f64::NAN, err))
    }

    // =========================================================================
    // 变量视图
    // =========================================================================

    /// 按地址取得变量视图
    pub fn get_value_view<T: ViewElement>(
        &self,
        address: &VariableAddress,
    ) -> Result<VariableView<T>, KernelError> {
        let session = match (&self.session, self.state) {
            (Some(s), LifecycleState::Initialized) => s.clone(),
            _ => return Err(self.lifecycle_error("get_value_view")),
        };

        let full = match &address.component {
            Some(component) => self
                .engine
                .var_address(component, address.subcomponent.as_deref(), &address.variable)
                .map_err(|e| KernelError::from_engine(&self.name, self.engine_time(), e))?,
            None => address.variable.clone(),
        };

        let raw = self.engine.value_ptr(&full).map_err(|e| match e {
            EngineError::VariableNotFound(_) | EngineError::Call { .. } => {
                KernelError::VariableNotFound {
                    kernel: self.name.clone(),
                    address: full.clone(),
                }
            }
            other => KernelError::from_engine(&self.name, self.engine_time(), other),
        })?;

        // SAFETY: 引擎保证指针在会话内有效且稳定；会话在 finalize 时失效。
        unsafe { VariableView::from_raw(&self.name, &full, &raw, address.column, session) }
    }

    /// 按交换端点取得浮点视图
    pub fn endpoint_view(&self, endpoint: &EndpointConfig) -> Result<VariableView<f64>, KernelError> {
        let address = resolve_address(self.kind, endpoint)?;
        self.get_value_view::<f64>(&address)
    }

    // =========================================================================
    // 单步
    // =========================================================================

    /// 准备时间步：Idle → Prepared
    pub fn prepare_time_step(&mut self, dt: f64) -> Result<(), KernelError> {
        if !self.is_initialized() || self.phase != StepPhase::Idle {
            return Err(self.lifecycle_error("prepare_time_step"));
        }
        let name = self.name.clone();
        let t = self.engine_time();
        self.timed(|e| e.prepare_time_step(dt))
            .map_err(|err| KernelError::from_engine(&name, t, err))?;
        self.step_dt = dt;
        self.phase = StepPhase::Prepared;
        Ok(())
    }

    /// 执行一次求解：Prepared → Advanced
    pub fn advance(&mut self) -> Result<(), KernelError> {
        if !self.is_initialized() || self.phase != StepPhase::Prepared {
            return Err(self.lifecycle_error("advance"));
        }
        let name = self.name.clone();
        let t = self.engine_time();
        self.timed(|e| e.do_time_step())
            .map_err(|err| KernelError::from_engine(&name, t, err))?;
        self.phase = StepPhase::Advanced;
        Ok(())
    }

    /// 开始迭代求解：Prepared/Advanced → Solving
    ///
    /// 从 Advanced 重新进入用于在同一时间步内反复求解的伙伴内核。
    pub fn prepare_solve(&mut self, solution_id: i32) -> Result<(), KernelError> {
        if !self.is_initialized() || !matches!(self.phase, StepPhase::Prepared | StepPhase::Advanced) {
            return Err(self.lifecycle_error("prepare_solve"));
        }
        let name = self.name.clone();
        let t = self.engine_time();
        self.timed(|e| e.prepare_solve(solution_id))
            .map_err(|err| KernelError::from_engine(&name, t, err))?;
        self.phase = StepPhase::Solving;
        Ok(())
    }

    /// 执行一次外迭代，返回是否收敛
    pub fn solve(&mut self, solution_id: i32) -> Result<bool, KernelError> {
        if !self.is_initialized() || self.phase != StepPhase::Solving {
            return Err(self.lifecycle_error("solve"));
        }
        let name = self.name.clone();
        let t = self.engine_time();
        self.timed(|e| e.solve(solution_id))
            .map_err(|err| KernelError::from_engine(&name, t, err))
    }

    /// 结束迭代求解：Solving → Advanced
    pub fn finalize_solve(&mut self, solution_id: i32) -> Result<(), KernelError> {
        if !self.is_initialized() || self.phase != StepPhase::Solving {
            return Err(self.lifecycle_error("finalize_solve"));
        }
        let name = self.name.clone();
        let t = self.engine_time();
        self.timed(|e| e.finalize_solve(solution_id))
            .map_err(|err| KernelError::from_engine(&name, t, err))?;
        self.phase = StepPhase::Advanced;
        Ok(())
    }

    /// 引擎报告的每步最大外迭代次数
    pub fn max_iterations(&self) -> Result<usize, KernelError> {
        if !self.is_initialized() {
            return Err(self.lifecycle_error("max_iterations"));
        }
        self.engine
            .max_iterations()
            .map_err(|e| KernelError::from_engine(&self.name, f64::NAN, e))
    }

    /// 结束时间步：Advanced → Idle
    pub fn finalize_time_step(&mut self) -> Result<(), KernelError> {
        if !self.is_initialized() || self.phase != StepPhase::Advanced {
            return Err(self.lifecycle_error("finalize_time_step"));
        }
        let name = self.name.clone();
        let t = self.engine_time();
        self.timed(|e| e.finalize_time_step())
            .map_err(|err| KernelError::from_engine(&name, t, err))?;
        self.phase = StepPhase::Idle;
        self.steps += 1;
        tracing::trace!("Kernel '{}' step {} done (dt={})", self.name, self.steps, self.step_dt);
        Ok(())
    }

    // =========================================================================
    // 时间查询
    // =========================================================================

    /// 引擎当前时间
    pub fn current_time(&self) -> Result<f64, KernelError> {
        if !self.is_initialized() {
            return Err(self.lifecycle_error("current_time"));
        }
        self.engine
            .current_time()
            .map_err(|e| KernelError::from_engine(&self.name, f64::NAN, e))
    }

    /// 引擎自身的结束时间
    pub fn end_time(&self) -> Result<f64, KernelError> {
        if !self.is_initialized() {
            return Err(self.lifecycle_error("end_time"));
        }
        self.engine
            .end_time()
            .map_err(|e| KernelError::from_engine(&self.name, f64::NAN, e))
    }

    /// 引擎版本
    pub fn version(&self) -> String {
        self.engine.version()
    }
}

impl Drop for KernelAdapter {
    fn drop(&mut self) {
        if self.state == LifecycleState::Initialized {
            tracing::warn!("Kernel '{}' dropped while initialized, finalizing", self.name);
            if let Err(e) = self.finalize() {
                tracing::error!("Finalize on drop failed: {}", e);
            }
        }
    }
}
