// crates/hc_kernel/src/dylib.rs

//! 共享库引擎
//!
//! 通过 `libloading` 加载导出 BMI/XMI C 接口的共享库。所有函数返回 `int`
//! 状态码，非零时读取 `get_last_bmi_error` 作为错误信息。
//!
//! 迭代求解使用 XMI 的 `prepare_solve`/`solve`/`finalize_solve`，最大外迭代
//! 次数读取 `SLN_1/MXITER`。
//!
//! 不导出 `do_time_step` 的库（只实现 BMI 的 `update_until`）按
//! `update_until(t + dt)` 推进，`prepare_time_step`/`finalize_time_step`
//! 缺失时视为空操作。

use crate::engine::{ElementType, RawArray, XmiEngine};
use crate::error::EngineError;
use hc_config::{KernelConfig, PathResolver};
use libloading::{Library, Symbol};
use std::ffi::{c_char, c_double, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};

/// BMI 字符串缓冲区长度
const BMI_STRING_LEN: usize = 1024;

/// 变量最大维数
const MAX_RANK: usize = 8;

type InitializeFn = unsafe extern "C" fn(*const c_char) -> c_int;
type VoidFn = unsafe extern "C" fn() -> c_int;
type DoubleRefFn = unsafe extern "C" fn(*mut c_double) -> c_int;
type DoubleValFn = unsafe extern "C" fn(c_double) -> c_int;
type StringOutFn = unsafe extern "C" fn(*mut c_char) -> c_int;
type VarStringFn = unsafe extern "C" fn(*const c_char, *mut c_char) -> c_int;
type VarIntFn = unsafe extern "C" fn(*const c_char, *mut c_int) -> c_int;
type VarPtrFn = unsafe extern "C" fn(*const c_char, *mut *mut c_void) -> c_int;
type IntRefFn = unsafe extern "C" fn(*mut c_int) -> c_int;
type SolveFn = unsafe extern "C" fn(*mut c_int, *mut c_int) -> c_int;
type AddressFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *mut c_char) -> c_int;

/// 共享库引擎
pub struct DylibEngine {
    library_path: PathBuf,
    dependency_dir: Option<PathBuf>,
    input_path: PathBuf,
    library: Option<Library>,
    pending_dt: f64,
    solution_id: i32,
}

impl DylibEngine {
    /// 创建引擎，`input_path` 为传给 `initialize` 的绝对路径
    pub fn new(library_path: impl Into<PathBuf>, input_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            dependency_dir: None,
            input_path: input_path.into(),
            library: None,
            pending_dt: 0.0,
            solution_id: 1,
        }
    }

    /// 设置依赖目录
    pub fn with_dependency_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dependency_dir = Some(dir.into());
        self
    }

    /// 按内核声明创建
    pub fn from_config(config: &KernelConfig, paths: &PathResolver) -> Self {
        let mut engine = Self::new(config.library_path(paths), config.engine_input_path(paths));
        engine.dependency_dir = config.dependency_path(paths);
        engine
    }

    /// 共享库路径
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    fn load_error(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Load {
            path: self.library_path.clone(),
            reason: reason.into(),
        }
    }

    fn library(&self) -> Result<&Library, EngineError> {
        self.library
            .as_ref()
            .ok_or_else(|| EngineError::Other(format!("{} 未加载", self.library_path.display())))
    }

    /// 取得符号；库中不存在时返回 `None`
    fn optional<T>(&self, name: &str) -> Result<Option<Symbol<'_, T>>, EngineError> {
        let lib = self.library()?;
        // SAFETY: 调用方保证 T 与库中符号的 C 签名一致。
        Ok(unsafe { lib.get::<T>(name.as_bytes()) }.ok())
    }

    fn symbol<T>(&self, name: &str) -> Result<Symbol<'_, T>, EngineError> {
        self.optional(name)?
            .ok_or_else(|| EngineError::Other(format!("共享库缺少函数 {name}")))
    }

    fn last_error(&self) -> String {
        let Ok(Some(f)) = self.optional::<StringOutFn>("get_last_bmi_error") else {
            return "未知错误".to_string();
        };
        let mut buf = vec![0 as c_char; BMI_STRING_LEN];
        // SAFETY: 缓冲区长度满足 BMI 字符串约定。
        unsafe { f(buf.as_mut_ptr()) };
        buffer_to_string(&buf)
    }

    fn check(&self, function: &str, code: c_int) -> Result<(), EngineError> {
        if code == 0 {
            Ok(())
        } else {
            Err(EngineError::Call {
                function: function.to_string(),
                code,
                message: self.last_error(),
            })
        }
    }

    fn get_double(&self, function: &str) -> Result<f64, EngineError> {
        let f = self.symbol::<DoubleRefFn>(function)?;
        let mut value: c_double = 0.0;
        // SAFETY: 输出参数指向有效的 double。
        let code = unsafe { f(&mut value) };
        self.check(function, code)?;
        Ok(value)
    }

    fn call_with_id(&self, function: &str, solution_id: i32) -> Result<(), EngineError> {
        let f = self.symbol::<IntRefFn>(function)?;
        let mut id: c_int = solution_id;
        // SAFETY: 输入参数指向有效的 int。
        let code = unsafe { f(&mut id) };
        self.check(function, code)
    }

    fn get_string(&self, function: &str) -> Result<String, EngineError> {
        let f = self.symbol::<StringOutFn>(function)?;
        let mut buf = vec![0 as c_char; BMI_STRING_LEN];
        // SAFETY: 缓冲区长度满足 BMI 字符串约定。
        let code = unsafe { f(buf.as_mut_ptr()) };
        self.check(function, code)?;
        Ok(buffer_to_string(&buf))
    }

    fn var_type(&self, name: &CStr, address: &str) -> Result<ElementType, EngineError> {
        let f = self.symbol::<VarStringFn>("get_var_type")?;
        let mut buf = vec![0 as c_char; BMI_STRING_LEN];
        // SAFETY: name 以 NUL 结尾，缓冲区长度足够。
        let code = unsafe { f(name.as_ptr(), buf.as_mut_ptr()) };
        if code != 0 {
            return Err(EngineError::VariableNotFound(address.to_string()));
        }
        let type_name = buffer_to_string(&buf);
        ElementType::parse(&type_name)
            .ok_or_else(|| EngineError::Other(format!("变量 '{address}' 类型 '{type_name}' 不受支持")))
    }

    fn var_shape(&self, name: &CStr) -> Result<Vec<usize>, EngineError> {
        let rank_fn = self.symbol::<VarIntFn>("get_var_rank")?;
        let mut rank: c_int = 0;
        // SAFETY: name 以 NUL 结尾，输出参数有效。
        let code = unsafe { rank_fn(name.as_ptr(), &mut rank) };
        self.check("get_var_rank", code)?;

        let rank = rank.max(0) as usize;
        if rank == 0 {
            return Ok(Vec::new());
        }
        if rank > MAX_RANK {
            return Err(EngineError::Other(format!("变量维数 {rank} 超过上限 {MAX_RANK}")));
        }

        let shape_fn = self.symbol::<VarIntFn>("get_var_shape")?;
        let mut shape = [0 as c_int; MAX_RANK];
        // SAFETY: shape 至少容纳 rank 个元素。
        let code = unsafe { shape_fn(name.as_ptr(), shape.as_mut_ptr()) };
        self.check("get_var_shape", code)?;
        Ok(shape[..rank].iter().map(|&s| s.max(0) as usize).collect())
    }

    #[cfg(windows)]
    fn prepend_search_path(dir: &Path) {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![dir.to_path_buf()];
        paths.extend(std::env::split_paths(&current));
        if let Ok(joined) = std::env::join_paths(paths) {
            std::env::set_var("PATH", joined);
        }
    }

    #[cfg(not(windows))]
    fn prepend_search_path(dir: &Path) {
        tracing::debug!("Dependency dir {} resolved through rpath", dir.display());
    }
}

fn buffer_to_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

fn c_string(value: &str) -> Result<CString, EngineError> {
    CString::new(value).map_err(|_| EngineError::Other(format!("字符串包含 NUL: {value}")))
}

impl XmiEngine for DylibEngine {
    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.library.is_some() {
            return Err(self.load_error("共享库已加载"));
        }
        if let Some(dep) = &self.dependency_dir {
            if !dep.is_dir() {
                return Err(self.load_error(format!("依赖目录不存在: {}", dep.display())));
            }
            Self::prepend_search_path(dep);
        }
        if !self.library_path.is_file() {
            return Err(self.load_error("共享库文件不存在"));
        }

        // SAFETY: 加载外部库会执行其初始化代码，库路径由用户配置给出。
        let library = unsafe { Library::new(&self.library_path) }
            .map_err(|e| self.load_error(e.to_string()))?;
        self.library = Some(library);

        let input = c_string(&self.input_path.to_string_lossy())?;
        let code = {
            let init = self.symbol::<InitializeFn>("initialize")?;
            // SAFETY: input 以 NUL 结尾并在调用期间有效。
            unsafe { init(input.as_ptr()) }
        };
        if let Err(e) = self.check("initialize", code) {
            self.library = None;
            return Err(e);
        }
        tracing::debug!(
            "Loaded {} with input {}",
            self.library_path.display(),
            self.input_path.display()
        );
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        if self.library.is_none() {
            return Ok(());
        }
        let result = {
            let f = self.symbol::<VoidFn>("finalize")?;
            // SAFETY: 无参数调用。
            let code = unsafe { f() };
            self.check("finalize", code)
        };
        self.library = None;
        result
    }

    fn var_address(
        &self,
        component: &str,
        subcomponent: Option<&str>,
        variable: &str,
    ) -> Result<String, EngineError> {
        let Some(f) = self.optional::<AddressFn>("get_var_address")? else {
            return Ok(crate::accessors::compose_address(component, subcomponent, variable));
        };
        let c_comp = c_string(&component.to_uppercase())?;
        let c_sub = c_string(&subcomponent.unwrap_or("").to_uppercase())?;
        let c_var = c_string(&variable.to_uppercase())?;
        let mut buf = vec![0 as c_char; BMI_STRING_LEN];
        // SAFETY: 所有输入以 NUL 结尾，缓冲区长度足够。
        let code = unsafe { f(c_comp.as_ptr(), c_sub.as_ptr(), c_var.as_ptr(), buf.as_mut_ptr()) };
        self.check("get_var_address", code)?;
        Ok(buffer_to_string(&buf))
    }

    fn value_ptr(&self, address: &str) -> Result<RawArray, EngineError> {
        let name = c_string(address)?;
        let element = self.var_type(&name, address)?;
        let shape = self.var_shape(&name)?;

        let specific = match element {
            ElementType::F64 => "get_value_ptr_double",
            ElementType::I32 => "get_value_ptr_int",
        };
        let (function, f) = match self.optional::<VarPtrFn>(specific)? {
            Some(f) => (specific, f),
            None => ("get_value_ptr", self.symbol::<VarPtrFn>("get_value_ptr")?),
        };

        let mut ptr: *mut c_void = std::ptr::null_mut();
        // SAFETY: name 以 NUL 结尾，输出参数有效。
        let code = unsafe { f(name.as_ptr(), &mut ptr) };
        if code != 0 {
            return Err(EngineError::VariableNotFound(format!("{address} ({function})")));
        }
        Ok(RawArray {
            ptr: ptr as *mut u8,
            element,
            shape,
        })
    }

    fn prepare_time_step(&mut self, dt: f64) -> Result<(), EngineError> {
        self.pending_dt = dt;
        let Some(f) = self.optional::<DoubleRefFn>("prepare_time_step")? else {
            return Ok(());
        };
        let mut value: c_double = dt;
        // SAFETY: 输入参数指向有效的 double。
        let code = unsafe { f(&mut value) };
        self.check("prepare_time_step", code)
    }

    fn do_time_step(&mut self) -> Result<(), EngineError> {
        if let Some(f) = self.optional::<VoidFn>("do_time_step")? {
            // SAFETY: 无参数调用。
            let code = unsafe { f() };
            return self.check("do_time_step", code).map_err(|e| EngineError::Solve(e.to_string()));
        }
        let target = self.current_time()? + self.pending_dt;
        let f = self.symbol::<DoubleValFn>("update_until")?;
        // SAFETY: 按值传递 double。
        let code = unsafe { f(target) };
        self.check("update_until", code).map_err(|e| EngineError::Solve(e.to_string()))
    }

    fn finalize_time_step(&mut self) -> Result<(), EngineError> {
        let Some(f) = self.optional::<VoidFn>("finalize_time_step")? else {
            return Ok(());
        };
        // SAFETY: 无参数调用。
        let code = unsafe { f() };
        self.check("finalize_time_step", code)
    }

    fn prepare_solve(&mut self, solution_id: i32) -> Result<(), EngineError> {
        self.solution_id = solution_id;
        self.call_with_id("prepare_solve", solution_id)
    }

    fn solve(&mut self, solution_id: i32) -> Result<bool, EngineError> {
        let f = self.symbol::<SolveFn>("solve")?;
        let mut id: c_int = solution_id;
        let mut converged: c_int = 0;
        // SAFETY: 两个参数都指向有效的 int。
        let code = unsafe { f(&mut id, &mut converged) };
        self.check("solve", code)
            .map_err(|e| EngineError::Solve(e.to_string()))?;
        Ok(converged != 0)
    }

    fn finalize_solve(&mut self, solution_id: i32) -> Result<(), EngineError> {
        self.call_with_id("finalize_solve", solution_id)
            .map_err(|e| EngineError::Solve(e.to_string()))
    }

    fn max_iterations(&self) -> Result<usize, EngineError> {
        let solution = format!("SLN_{}", self.solution_id);
        let address = self.var_address(&solution, None, "MXITER")?;
        let raw = self.value_ptr(&address)?;
        if raw.element != ElementType::I32 || raw.ptr.is_null() || raw.is_empty() {
            return Err(EngineError::Other(format!("变量 '{address}' 不是整数标量")));
        }
        // SAFETY: 引擎报告该地址为至少一个元素的 int 数组。
        let value = unsafe { (raw.ptr as *const c_int).read() };
        Ok(value.max(0) as usize)
    }

    fn current_time(&self) -> Result<f64, EngineError> {
        self.get_double("get_current_time")
    }

    fn start_time(&self) -> Result<f64, EngineError> {
        self.get_double("get_start_time")
    }

    fn end_time(&self) -> Result<f64, EngineError> {
        self.get_double("get_end_time")
    }

    fn time_step(&self) -> Result<f64, EngineError> {
        self.get_double("get_time_step")
    }

    fn component_name(&self) -> String {
        self.get_string("get_component_name").unwrap_or_else(|_| {
            self.library_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    fn version(&self) -> String {
        self.get_string("get_version")
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = DylibEngine::new(dir.path().join("libnothing.so"), dir.path());
        assert!(matches!(engine.initialize(), Err(EngineError::Load { .. })));
    }

    #[test]
    fn test_missing_dependency_dir_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = DylibEngine::new(dir.path().join("libk.so"), dir.path())
            .with_dependency_dir(dir.path().join("deps"));
        let err = engine.initialize().unwrap_err();
        assert!(err.to_string().contains("deps"));
    }

    #[test]
    fn test_calls_before_load_fail() {
        let engine = DylibEngine::new("libk.so", ".");
        assert!(engine.current_time().is_err());
        assert_eq!(engine.component_name(), "libk");
    }

    #[test]
    fn test_iterative_calls_before_load_fail() {
        let mut engine = DylibEngine::new("libk.so", ".");
        assert!(engine.prepare_solve(1).is_err());
        assert!(engine.solve(1).is_err());
        assert!(engine.max_iterations().is_err());
    }

    #[test]
    fn test_finalize_without_load_is_noop() {
        let mut engine = DylibEngine::new("libk.so", ".");
        assert!(engine.finalize().is_ok());
    }

    #[test]
    fn test_buffer_to_string_stops_at_nul() {
        let mut buf = vec![0 as c_char; 8];
        for (i, b) in b"GWF/X".iter().enumerate() {
            buf[i] = *b as c_char;
        }
        assert_eq!(buffer_to_string(&buf), "GWF/X");
    }
}
