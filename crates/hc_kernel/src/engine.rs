// crates/hc_kernel/src/engine.rs

//! 引擎契约
//!
//! [`XmiEngine`] 描述外部引擎的运行时自省接口：生命周期、按地址取得内部
//! 数组指针、单步求解三段式调用以及时间查询。实现者必须保证同一会话内
//! 同一地址返回的指针保持稳定，直到 `finalize`。

use crate::error::EngineError;
use std::fmt;

/// 数组元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 双精度浮点
    F64,
    /// 32 位整数
    I32,
}

impl ElementType {
    /// 从引擎报告的类型字符串解析（如 `"DOUBLE (10)"`、`"INTEGER"`、`"double"`）
    pub fn parse(type_name: &str) -> Option<Self> {
        let lower = type_name.trim().to_ascii_lowercase();
        if lower.starts_with("double") || lower.starts_with("float64") {
            Some(Self::F64)
        } else if lower.starts_with("int") {
            Some(Self::I32)
        } else {
            None
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F64 => f.write_str("f64"),
            Self::I32 => f.write_str("i32"),
        }
    }
}

/// 引擎内部数组的原始描述
///
/// 二维数组按行优先排列，`shape = [rows, cols]`。
#[derive(Debug, Clone)]
pub struct RawArray {
    /// 首元素指针
    pub ptr: *mut u8,
    /// 元素类型
    pub element: ElementType,
    /// 形状（标量为空）
    pub shape: Vec<usize>,
}

impl RawArray {
    /// 元素总数
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 行数
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// 列数
    pub fn cols(&self) -> usize {
        if self.shape.len() >= 2 {
            self.shape[1..].iter().product()
        } else {
            1
        }
    }
}

fn unsupported(engine: &(impl XmiEngine + ?Sized), function: &str) -> EngineError {
    EngineError::Other(format!("引擎 '{}' 不支持 {function}", engine.component_name()))
}

/// 外部引擎契约
///
/// `prepare_solve`/`solve`/`finalize_solve` 组成可选的迭代求解接口，用于
/// 在一个时间步内与其他内核交替迭代直至收敛；不支持的引擎保留默认实现。
pub trait XmiEngine {
    /// 加载并初始化引擎
    fn initialize(&mut self) -> Result<(), EngineError>;

    /// 终止引擎并释放资源
    fn finalize(&mut self) -> Result<(), EngineError>;

    /// 组合变量地址
    ///
    /// 默认实现按 `COMPONENT/SUBCOMPONENT/VARIABLE` 大写拼接。
    fn var_address(
        &self,
        component: &str,
        subcomponent: Option<&str>,
        variable: &str,
    ) -> Result<String, EngineError> {
        Ok(crate::accessors::compose_address(component, subcomponent, variable))
    }

    /// 取得变量的内部数组
    fn value_ptr(&self, address: &str) -> Result<RawArray, EngineError>;

    /// 准备一个时间步
    fn prepare_time_step(&mut self, dt: f64) -> Result<(), EngineError>;

    /// 执行一次求解
    fn do_time_step(&mut self) -> Result<(), EngineError>;

    /// 结束时间步
    fn finalize_time_step(&mut self) -> Result<(), EngineError>;

    /// 开始对解 `solution_id` 迭代
    fn prepare_solve(&mut self, solution_id: i32) -> Result<(), EngineError> {
        let _ = solution_id;
        Err(unsupported(&*self, "prepare_solve"))
    }

    /// 执行一次迭代，返回是否收敛
    fn solve(&mut self, solution_id: i32) -> Result<bool, EngineError> {
        let _ = solution_id;
        Err(unsupported(&*self, "solve"))
    }

    /// 结束对解 `solution_id` 的迭代
    fn finalize_solve(&mut self, solution_id: i32) -> Result<(), EngineError> {
        let _ = solution_id;
        Err(unsupported(&*self, "finalize_solve"))
    }

    /// 每个时间步允许的最大外迭代次数
    fn max_iterations(&self) -> Result<usize, EngineError> {
        Err(unsupported(self, "max_iterations"))
    }

    /// 当前模拟时间
    fn current_time(&self) -> Result<f64, EngineError>;

    /// 开始时间
    fn start_time(&self) -> Result<f64, EngineError>;

    /// 结束时间
    fn end_time(&self) -> Result<f64, EngineError>;

    /// 引擎自身的时间步长
    fn time_step(&self) -> Result<f64, EngineError>;

    /// 组件名称
    fn component_name(&self) -> String;

    /// 版本
    fn version(&self) -> String {
        "unknown".to_string()
    }
}
