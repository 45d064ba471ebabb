// crates/hc_kernel/src/memory.rs

//! 进程内引擎
//!
//! `MemoryEngine` 用命名数组模拟外部引擎的内存，求解过程由调用方提供的
//! 闭包给出。数组存放在 `Rc<[Cell<_>]>` 中，地址在引擎生存期内不变，
//! 可以和共享库引擎一样被变量视图直接别名访问。

use crate::engine::{ElementType, RawArray, XmiEngine};
use crate::error::EngineError;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// 跨引擎共享的调用记录，条目格式为 `"内核:操作"`
pub type CallLog = Rc<RefCell<Vec<String>>>;

#[derive(Clone)]
enum Buffer {
    F64(Rc<[Cell<f64>]>),
    I32(Rc<[Cell<i32>]>),
}

#[derive(Clone)]
struct MemoryArray {
    shape: Vec<usize>,
    buffer: Buffer,
}

impl MemoryArray {
    fn len(&self) -> usize {
        match &self.buffer {
            Buffer::F64(b) => b.len(),
            Buffer::I32(b) => b.len(),
        }
    }
}

type StepHook = Box<dyn FnMut(&StepContext<'_>) -> Result<(), String>>;
type IterationHook = Box<dyn FnMut(&StepContext<'_>) -> Result<bool, String>>;

/// 求解闭包可见的引擎状态
pub struct StepContext<'a> {
    /// 本步结束时的时间
    pub time: f64,
    /// 本步步长
    pub dt: f64,
    /// 本步序号（从 1 开始）
    pub step: u64,
    /// 本步内的外迭代序号（从 1 开始，非迭代求解时为 0）
    pub iteration: u32,
    arrays: &'a BTreeMap<String, MemoryArray>,
}

impl StepContext<'_> {
    fn f64_buffer(&self, name: &str) -> Result<&Rc<[Cell<f64>]>, String> {
        match self.arrays.get(name).map(|a| &a.buffer) {
            Some(Buffer::F64(b)) => Ok(b),
            Some(Buffer::I32(_)) => Err(format!("变量 '{name}' 不是浮点数组")),
            None => Err(format!("变量 '{name}' 不存在")),
        }
    }

    /// 读取浮点数组
    pub fn values(&self, name: &str) -> Result<Vec<f64>, String> {
        Ok(self.f64_buffer(name)?.iter().map(Cell::get).collect())
    }

    /// 读取单个浮点元素
    pub fn get(&self, name: &str, index: usize) -> Result<f64, String> {
        self.f64_buffer(name)?
            .get(index)
            .map(Cell::get)
            .ok_or_else(|| format!("变量 '{name}' 索引 {index} 越界"))
    }

    /// 写入单个浮点元素
    pub fn set(&self, name: &str, index: usize, value: f64) -> Result<(), String> {
        self.f64_buffer(name)?
            .get(index)
            .map(|c| c.set(value))
            .ok_or_else(|| format!("变量 '{name}' 索引 {index} 越界"))
    }

    /// 覆盖整个浮点数组
    pub fn set_values(&self, name: &str, values: &[f64]) -> Result<(), String> {
        let buf = self.f64_buffer(name)?;
        if buf.len() != values.len() {
            return Err(format!("变量 '{name}' 长度 {} 与输入 {} 不符", buf.len(), values.len()));
        }
        for (c, v) in buf.iter().zip(values) {
            c.set(*v);
        }
        Ok(())
    }

    /// 写入单个整数元素
    pub fn set_i32(&self, name: &str, index: usize, value: i32) -> Result<(), String> {
        match self.arrays.get(name).map(|a| &a.buffer) {
            Some(Buffer::I32(b)) => b
                .get(index)
                .map(|c| c.set(value))
                .ok_or_else(|| format!("变量 '{name}' 索引 {index} 越界")),
            _ => Err(format!("变量 '{name}' 不是整数数组")),
        }
    }
}

/// 进程内引擎
pub struct MemoryEngine {
    name: String,
    version: String,
    arrays: BTreeMap<String, MemoryArray>,
    start: f64,
    end: f64,
    dt: f64,
    time: f64,
    pending_dt: Option<f64>,
    step: u64,
    iteration: u32,
    solving: bool,
    max_iterations: Option<usize>,
    initialized: bool,
    hook: Option<StepHook>,
    iteration_hook: Option<IterationHook>,
    fail_initialize: Option<String>,
    call_log: Option<CallLog>,
}

impl MemoryEngine {
    /// 创建空引擎
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            arrays: BTreeMap::new(),
            start: 0.0,
            end: 1.0,
            dt: 1.0,
            time: 0.0,
            pending_dt: None,
            step: 0,
            iteration: 0,
            solving: false,
            max_iterations: None,
            initialized: false,
            hook: None,
            iteration_hook: None,
            fail_initialize: None,
            call_log: None,
        }
    }

    /// 设置时间范围与默认步长
    pub fn with_time(mut self, start: f64, end: f64, dt: f64) -> Self {
        self.start = start;
        self.end = end;
        self.dt = dt;
        self.time = start;
        self
    }

    /// 添加一维浮点数组
    pub fn with_f64(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let shape = vec![values.len()];
        self.insert(name.into(), shape, Buffer::F64(values.into_iter().map(Cell::new).collect()));
        self
    }

    /// 添加行优先的二维浮点数组
    ///
    /// `rows * cols` 与 `values` 长度不符时，该变量的 `value_ptr` 返回错误。
    pub fn with_f64_2d(mut self, name: impl Into<String>, rows: usize, cols: usize, values: Vec<f64>) -> Self {
        self.insert(
            name.into(),
            vec![rows, cols],
            Buffer::F64(values.into_iter().map(Cell::new).collect()),
        );
        self
    }

    /// 添加一维整数数组
    pub fn with_i32(mut self, name: impl Into<String>, values: Vec<i32>) -> Self {
        let shape = vec![values.len()];
        self.insert(name.into(), shape, Buffer::I32(values.into_iter().map(Cell::new).collect()));
        self
    }

    /// 设置求解闭包；闭包返回错误时视为求解发散
    pub fn on_step<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&StepContext<'_>) -> Result<(), String> + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// 设置迭代闭包，返回值表示本次迭代是否收敛
    ///
    /// 未设置时，迭代求解调用求解闭包并立即报告收敛。
    pub fn on_iteration<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&StepContext<'_>) -> Result<bool, String> + 'static,
    {
        self.iteration_hook = Some(Box::new(hook));
        self
    }

    /// 设置每步最大外迭代次数
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// 使初始化失败
    pub fn fail_initialize(mut self, reason: impl Into<String>) -> Self {
        self.fail_initialize = Some(reason.into());
        self
    }

    /// 记录调用顺序
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    fn insert(&mut self, name: String, shape: Vec<usize>, buffer: Buffer) {
        self.arrays.insert(name, MemoryArray { shape, buffer });
    }

    fn record(&self, op: &str) {
        if let Some(log) = &self.call_log {
            log.borrow_mut().push(format!("{}:{op}", self.name));
        }
    }

    fn ensure_initialized(&self, op: &str) -> Result<(), EngineError> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::Other(format!("{op}: 引擎 '{}' 未初始化", self.name)))
        }
    }

    /// 读取浮点数组的当前值（供测试断言使用）
    pub fn snapshot(&self, name: &str) -> Option<Vec<f64>> {
        match self.arrays.get(name).map(|a| &a.buffer) {
            Some(Buffer::F64(b)) => Some(b.iter().map(Cell::get).collect()),
            Some(Buffer::I32(b)) => Some(b.iter().map(|c| c.get() as f64).collect()),
            None => None,
        }
    }
}

impl XmiEngine for MemoryEngine {
    fn initialize(&mut self) -> Result<(), EngineError> {
        self.record("initialize");
        if let Some(reason) = &self.fail_initialize {
            return Err(EngineError::Load {
                path: self.name.clone().into(),
                reason: reason.clone(),
            });
        }
        self.time = self.start;
        self.step = 0;
        self.initialized = true;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        self.record("finalize");
        self.initialized = false;
        Ok(())
    }

    fn value_ptr(&self, address: &str) -> Result<RawArray, EngineError> {
        self.ensure_initialized("value_ptr")?;
        let array = self
            .arrays
            .get(address)
            .ok_or_else(|| EngineError::VariableNotFound(address.to_string()))?;
        let (ptr, element) = match &array.buffer {
            // Cell<T> 与 T 内存布局相同，经 UnsafeCell 取得的指针允许写入。
            Buffer::F64(b) => (b.as_ptr() as *mut u8, ElementType::F64),
            Buffer::I32(b) => (b.as_ptr() as *mut u8, ElementType::I32),
        };
        let declared: usize = array.shape.iter().product();
        if declared != array.len() {
            return Err(EngineError::Other(format!(
                "变量 '{address}' 形状 {:?} 与缓冲区长度 {} 不符",
                array.shape,
                array.len()
            )));
        }
        Ok(RawArray {
            ptr,
            element,
            shape: array.shape.clone(),
        })
    }

    fn prepare_time_step(&mut self, dt: f64) -> Result<(), EngineError> {
        self.ensure_initialized("prepare_time_step")?;
        self.record("prepare_time_step");
        self.pending_dt = Some(dt);
        Ok(())
    }

    fn do_time_step(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized("do_time_step")?;
        self.record("do_time_step");
        let dt = self.pending_dt.unwrap_or(self.dt);
        self.step += 1;
        let ctx = StepContext {
            time: self.time + dt,
            dt,
            step: self.step,
            iteration: 0,
            arrays: &self.arrays,
        };
        if let Some(hook) = self.hook.as_mut() {
            hook(&ctx).map_err(EngineError::Solve)?;
        }
        self.time += dt;
        Ok(())
    }

    fn finalize_time_step(&mut self) -> Result<(), EngineError> {
        self.ensure_initialized("finalize_time_step")?;
        self.record("finalize_time_step");
        // 迭代求解的时间在步末推进一次
        if self.solving {
            self.time += self.pending_dt.unwrap_or(self.dt);
            self.solving = false;
        }
        self.pending_dt = None;
        Ok(())
    }

    fn prepare_solve(&mut self, _solution_id: i32) -> Result<(), EngineError> {
        self.ensure_initialized("prepare_solve")?;
        self.record("prepare_solve");
        if !self.solving {
            self.solving = true;
            self.step += 1;
            self.iteration = 0;
        }
        Ok(())
    }

    fn solve(&mut self, _solution_id: i32) -> Result<bool, EngineError> {
        self.ensure_initialized("solve")?;
        if !self.solving {
            return Err(EngineError::Other(format!("solve: 引擎 '{}' 未调用 prepare_solve", self.name)));
        }
        self.record("solve");
        self.iteration += 1;
        let dt = self.pending_dt.unwrap_or(self.dt);
        let ctx = StepContext {
            time: self.time + dt,
            dt,
            step: self.step,
            iteration: self.iteration,
            arrays: &self.arrays,
        };
        if let Some(hook) = self.iteration_hook.as_mut() {
            return hook(&ctx).map_err(EngineError::Solve);
        }
        if let Some(hook) = self.hook.as_mut() {
            hook(&ctx).map_err(EngineError::Solve)?;
        }
        Ok(true)
    }

    fn finalize_solve(&mut self, _solution_id: i32) -> Result<(), EngineError> {
        self.ensure_initialized("finalize_solve")?;
        self.record("finalize_solve");
        Ok(())
    }

    fn max_iterations(&self) -> Result<usize, EngineError> {
        self.max_iterations
            .ok_or_else(|| EngineError::Other(format!("引擎 '{}' 未设置最大迭代次数", self.name)))
    }

    fn current_time(&self) -> Result<f64, EngineError> {
        Ok(self.time)
    }

    fn start_time(&self) -> Result<f64, EngineError> {
        Ok(self.start)
    }

    fn end_time(&self) -> Result<f64, EngineError> {
        Ok(self.end)
    }

    fn time_step(&self) -> Result<f64, EngineError> {
        Ok(self.dt)
    }

    fn component_name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }
}
