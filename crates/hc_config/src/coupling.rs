// crates/hc_config/src/coupling.rs

//! 顶层耦合配置
//!
//! `CouplingConfig` 在运行开始时加载一次，之后只读。校验在任何内核启动
//! 之前完成，违反约束时返回 [`ConfigError`]。

use crate::error::ConfigError;
use crate::exchange::{AggregationKind, ExchangeConfig};
use crate::kernel::KernelConfig;
use crate::mapping::MappingGenerationConfig;
use crate::paths::PathResolver;
use hc_foundation::{steps_in, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// 交换记录的存储方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogSinkKind {
    /// 每个交换一个 CSV 文件
    #[default]
    Csv,
    /// 仅保存在内存中
    Memory,
}

/// 交换记录配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeLogConfig {
    /// 输出目录
    #[serde(default = "default_log_dir")]
    pub output_dir: PathBuf,
    /// 需要记录的交换及其存储方式
    #[serde(default)]
    pub exchanges: BTreeMap<String, LogSinkKind>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("exchange_logs")
}

impl Default for ExchangeLogConfig {
    fn default() -> Self {
        Self {
            output_dir: default_log_dir(),
            exchanges: BTreeMap::new(),
        }
    }
}

/// 外迭代耦合组
///
/// 主导内核每个时间步执行 `prepare_solve`，随后反复调用 `solve` 直到收敛
/// 或达到最大迭代次数；伙伴内核在每次外迭代中各求解一次。组内交换在
/// 每次外迭代中重新执行。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationConfig {
    /// 主导内核
    pub kernel: String,
    /// 伙伴内核
    #[serde(default)]
    pub partners: Vec<String>,
    /// 主导内核的求解器编号
    #[serde(default = "default_solution_id")]
    pub solution_id: i32,
    /// 最大外迭代次数，缺省时向主导内核查询
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

fn default_solution_id() -> i32 {
    1
}

impl IterationConfig {
    /// 组内全部内核（主导内核在前）
    pub fn members(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.kernel.as_str()).chain(self.partners.iter().map(String::as_str))
    }
}

/// 耦合运行配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouplingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否统计内核耗时
    #[serde(default)]
    pub timing: bool,
    /// 开始时间
    #[serde(default)]
    pub start_time: f64,
    /// 结束时间
    pub end_time: f64,
    /// 内核声明（声明顺序即初始化顺序）
    pub kernels: Vec<KernelConfig>,
    /// 耦合顺序（为空时使用声明顺序）
    #[serde(default)]
    pub coupling_order: Vec<String>,
    /// 交换声明
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
    /// 交换记录
    #[serde(default)]
    pub exchange_log: Option<ExchangeLogConfig>,
    /// 外迭代耦合
    #[serde(default)]
    pub iteration: Option<IterationConfig>,
    /// 运行前的映射表生成
    #[serde(default)]
    pub mapping: Option<MappingGenerationConfig>,
    /// 相对路径的基准目录
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl CouplingConfig {
    /// 从 JSON 文件加载并校验
    ///
    /// 基准目录为配置文件所在目录。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let base_dir = if parent.is_absolute() {
            parent.to_path_buf()
        } else {
            std::env::current_dir()?.join(parent)
        };
        tracing::debug!("Loading coupling config from {}", path.display());
        Self::from_json_str(&content, base_dir)
    }

    /// 从 JSON 字符串加载并校验，`base_dir` 为相对路径基准
    pub fn from_json_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config: CouplingConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    /// 设置基准目录
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// 基准目录
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 路径解析器
    pub fn paths(&self) -> PathResolver {
        PathResolver::new(&self.base_dir)
    }

    /// 按名称查找内核
    pub fn kernel(&self, name: &str) -> Option<&KernelConfig> {
        self.kernels.iter().find(|k| k.name == name)
    }

    /// 耦合顺序中的内核名称
    pub fn ordered_kernel_names(&self) -> Vec<&str> {
        if self.coupling_order.is_empty() {
            self.kernels.iter().map(|k| k.name.as_str()).collect()
        } else {
            self.coupling_order.iter().map(String::as_str).collect()
        }
    }

    /// 粗步长：所有内核步长中的最大值
    pub fn coarse_time_step(&self) -> f64 {
        self.kernels
            .iter()
            .map(|k| k.time_step)
            .fold(0.0, f64::max)
    }

    /// 整个模拟期内的粗步数
    pub fn coarse_steps(&self) -> usize {
        steps_in(self.end_time - self.start_time, self.coarse_time_step()).unwrap_or(0)
    }

    /// 收集所有校验问题
    pub fn validation_report(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            report.add_warning(
                "log_level",
                format!("未知日志级别 '{}'，将使用 info", self.log_level),
            );
        }

        if !(self.end_time > self.start_time) {
            report.add_error(
                "end_time",
                format!("结束时间 {} 必须大于开始时间 {}", self.end_time, self.start_time),
            );
        }

        self.check_kernels(&mut report);
        self.check_coupling_order(&mut report);
        self.check_exchanges(&mut report);
        self.check_exchange_log(&mut report);
        self.check_iteration(&mut report);
        report
    }

    fn check_iteration(&self, report: &mut ValidationReport) {
        let Some(it) = &self.iteration else {
            return;
        };
        let Some(leader) = self.kernel(&it.kernel) else {
            report.add_error("iteration.kernel", format!("未声明的内核: {}", it.kernel));
            return;
        };

        let mut seen = HashSet::new();
        for (i, name) in it.partners.iter().enumerate() {
            let key = format!("iteration.partners[{i}]");
            if name == &it.kernel {
                report.add_error(&key, "伙伴内核不能是主导内核");
                continue;
            }
            if !seen.insert(name.as_str()) {
                report.add_error(&key, format!("内核重复: {name}"));
                continue;
            }
            match self.kernel(name) {
                None => report.add_error(&key, format!("未声明的内核: {name}")),
                Some(k) if steps_in(k.time_step, leader.time_step) != Some(1) => report.add_error(
                    &key,
                    format!("步长 {} 必须与主导内核步长 {} 相同", k.time_step, leader.time_step),
                ),
                Some(_) => {}
            }
        }

        if it.max_iterations == Some(0) {
            report.add_error("iteration.max_iterations", "最大迭代次数必须为正");
        }
    }

    fn check_kernels(&self, report: &mut ValidationReport) {
        if self.kernels.is_empty() {
            report.add_error("kernels", "至少需要声明一个内核");
            return;
        }

        let mut names = HashSet::new();
        for (i, k) in self.kernels.iter().enumerate() {
            let key = format!("kernels[{i}]");
            if k.name.trim().is_empty() {
                report.add_error(&key, "内核名称不能为空");
            } else if !names.insert(k.name.as_str()) {
                report.add_error(&key, format!("内核名称重复: {}", k.name));
            }
            if !(k.time_step > 0.0) || !k.time_step.is_finite() {
                report.add_error(
                    format!("{key}.time_step"),
                    format!("时间步长必须为正有限值, 实际 {}", k.time_step),
                );
            }
        }

        let coarse = self.coarse_time_step();
        if coarse > 0.0 {
            for (i, k) in self.kernels.iter().enumerate() {
                if k.time_step > 0.0 && steps_in(coarse, k.time_step).is_none() {
                    report.add_error(
                        format!("kernels[{i}].time_step"),
                        format!("粗步长 {coarse} 不是步长 {} 的整数倍", k.time_step),
                    );
                }
            }
            if self.end_time > self.start_time
                && steps_in(self.end_time - self.start_time, coarse).is_none()
            {
                report.add_error(
                    "end_time",
                    format!(
                        "模拟时长 {} 不是粗步长 {coarse} 的整数倍",
                        self.end_time - self.start_time
                    ),
                );
            }
        }
    }

    fn check_coupling_order(&self, report: &mut ValidationReport) {
        if self.coupling_order.is_empty() {
            return;
        }
        let mut seen = HashSet::new();
        for name in &self.coupling_order {
            if self.kernel(name).is_none() {
                report.add_error("coupling_order", format!("未声明的内核: {name}"));
            }
            if !seen.insert(name.as_str()) {
                report.add_error("coupling_order", format!("内核重复: {name}"));
            }
        }
        for k in &self.kernels {
            if !seen.contains(k.name.as_str()) {
                report.add_error("coupling_order", format!("缺少内核: {}", k.name));
            }
        }
    }

    fn check_exchanges(&self, report: &mut ValidationReport) {
        if self.exchanges.is_empty() && self.kernels.len() > 1 {
            report.add_warning("exchanges", "声明了多个内核但没有任何交换");
        }

        let mut names = HashSet::new();
        for (i, ex) in self.exchanges.iter().enumerate() {
            let key = format!("exchanges[{i}]");
            if !names.insert(ex.name.as_str()) {
                report.add_error(&key, format!("交换名称重复: {}", ex.name));
            }
            for (side, ep) in [("source", &ex.source), ("target", &ex.target)] {
                if self.kernel(&ep.kernel).is_none() {
                    report.add_error(
                        format!("{key}.{side}.kernel"),
                        format!("未声明的内核: {}", ep.kernel),
                    );
                }
            }
            if ex.source.kernel == ex.target.kernel {
                report.add_error(&key, "源内核与目标内核不能相同");
            }
            if let Some(mask) = &ex.active_mask {
                if self.kernel(&mask.kernel).is_none() {
                    report.add_error(
                        format!("{key}.active_mask.kernel"),
                        format!("未声明的内核: {}", mask.kernel),
                    );
                }
            }
            if !ex.conversion.factor.is_finite() {
                report.add_error(format!("{key}.conversion.factor"), "换算系数必须为有限值");
            }
            if ex.aggregation == AggregationKind::Broadcast && ex.conversion.divide_by_dt {
                report.add_warning(
                    format!("{key}.conversion"),
                    "广播交换通常传递状态量，除以步长可能不是预期行为",
                );
            }
        }
    }

    fn check_exchange_log(&self, report: &mut ValidationReport) {
        let logged: Vec<&str> = self
            .exchanges
            .iter()
            .filter(|e| e.log)
            .map(|e| e.name.as_str())
            .collect();

        match &self.exchange_log {
            None if !logged.is_empty() => {
                report.add_warning("exchange_log", "有交换启用了记录但未配置 exchange_log");
            }
            None => {}
            Some(log) => {
                for name in log.exchanges.keys() {
                    if !self.exchanges.iter().any(|e| &e.name == name) {
                        report.add_error(
                            "exchange_log.exchanges",
                            format!("未声明的交换: {name}"),
                        );
                    }
                }
            }
        }
    }

    /// 校验配置，存在错误时返回 [`ConfigError::Validation`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let report = self.validation_report();
        if report.has_errors() {
            return Err(ConfigError::Validation(report));
        }
        for w in &report.warnings {
            tracing::warn!("Config warning: {}", w);
        }
        Ok(())
    }

    /// 检查配置引用的文件与目录是否存在
    pub fn check_paths(&self) -> ValidationReport {
        let paths = self.paths();
        let mut report = ValidationReport::new();

        for (i, k) in self.kernels.iter().enumerate() {
            let library = k.library_path(&paths);
            if !library.is_file() {
                report.add_error(
                    format!("kernels[{i}].library"),
                    format!("共享库不存在: {}", library.display()),
                );
            }
            if let Some(dep) = k.dependency_path(&paths) {
                if !dep.is_dir() {
                    report.add_error(
                        format!("kernels[{i}].dependency_dir"),
                        format!("依赖目录不存在: {}", dep.display()),
                    );
                }
            }
            let work = k.work_path(&paths);
            if !work.is_dir() {
                report.add_error(
                    format!("kernels[{i}].work_dir"),
                    format!("工作目录不存在: {}", work.display()),
                );
            }
        }

        let generated_dir = self.mapping.as_ref().map(|m| paths.resolve(&m.output_dir));
        for (i, ex) in self.exchanges.iter().enumerate() {
            let mapping = paths.resolve(&ex.mapping);
            if mapping.is_file() {
                continue;
            }
            let key = format!("exchanges[{i}].mapping");
            match &generated_dir {
                Some(dir) if mapping.starts_with(dir) => report.add_warning(
                    key,
                    format!("映射表尚未生成: {}", mapping.display()),
                ),
                _ => report.add_error(key, format!("映射表不存在: {}", mapping.display())),
            }
        }

        if let Some(m) = &self.mapping {
            let input = paths.resolve(&m.input);
            if !input.is_file() {
                report.add_error("mapping.input", format!("预处理输入不存在: {}", input.display()));
            }
            if let Some(listing) = &m.unit_listing {
                let listing = paths.resolve(listing);
                if !listing.is_file() {
                    report.add_error(
                        "mapping.unit_listing",
                        format!("耦合清单不存在: {}", listing.display()),
                    );
                }
            }
        }
        report
    }

    /// 保存为 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(ConfigError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_KERNELS: &str = r#"{
        "timing": true,
        "start_time": 0.0,
        "end_time": 4.0,
        "kernels": [
            {"name": "gw", "kind": "modflow6", "library": "libmf6.so", "work_dir": "mf6", "time_step": 1.0},
            {"name": "land", "kind": "metaswap", "library": "libmsw.so", "time_step": 0.25}
        ],
        "exchanges": [
            {"name": "head", "aggregation": "average",
             "source": {"kernel": "gw", "variable": "head", "model": "GWF_1"},
             "target": {"kernel": "land", "variable": "head"},
             "mapping": "exchanges/node_svat.tsv", "reverse": true}
        ]
    }"#;

    #[test]
    fn test_parse_and_derived_values() {
        let cfg = CouplingConfig::from_json_str(TWO_KERNELS, "/run").unwrap();
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.timing);
        assert!((cfg.coarse_time_step() - 1.0).abs() < 1e-12);
        assert_eq!(cfg.coarse_steps(), 4);
        assert_eq!(cfg.ordered_kernel_names(), vec!["gw", "land"]);
        assert_eq!(cfg.base_dir(), Path::new("/run"));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let json = TWO_KERNELS.replace("\"end_time\": 4.0", "\"end_time\": -1.0");
        let err = CouplingConfig::from_json_str(&json, "/run").unwrap_err();
        match err {
            ConfigError::Validation(report) => {
                assert!(report.errors.iter().any(|e| e.field == "end_time"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_integral_step_ratio_rejected() {
        let json = TWO_KERNELS.replace("\"time_step\": 0.25", "\"time_step\": 0.3");
        assert!(matches!(
            CouplingConfig::from_json_str(&json, "/run"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_kernel_in_exchange() {
        let json = TWO_KERNELS.replace("\"kernel\": \"land\"", "\"kernel\": \"river\"");
        let err = CouplingConfig::from_json_str(&json, "/run").unwrap_err();
        assert!(err.to_string().contains("river"));
    }

    #[test]
    fn test_coupling_order_must_be_permutation() {
        let json = TWO_KERNELS.replace(
            "\"exchanges\"",
            "\"coupling_order\": [\"land\"], \"exchanges\"",
        );
        assert!(CouplingConfig::from_json_str(&json, "/run").is_err());

        let json = TWO_KERNELS.replace(
            "\"exchanges\"",
            "\"coupling_order\": [\"land\", \"gw\"], \"exchanges\"",
        );
        let cfg = CouplingConfig::from_json_str(&json, "/run").unwrap();
        assert_eq!(cfg.ordered_kernel_names(), vec!["land", "gw"]);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            CouplingConfig::from_json_str("{ not json", "/run"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file_sets_base_dir_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coupling.json");
        std::fs::write(&path, TWO_KERNELS).unwrap();

        let cfg = CouplingConfig::from_file(&path).unwrap();
        assert_eq!(cfg.base_dir(), dir.path());

        let copy = dir.path().join("copy.json");
        cfg.save_to_file(&copy).unwrap();
        let reloaded = CouplingConfig::from_file(&copy).unwrap();
        assert_eq!(reloaded.kernels, cfg.kernels);
        assert_eq!(reloaded.exchanges, cfg.exchanges);
    }

    #[test]
    fn test_check_paths_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CouplingConfig::from_json_str(TWO_KERNELS, dir.path()).unwrap();
        let report = cfg.check_paths();
        assert!(report.errors.iter().any(|e| e.field == "kernels[0].library"));
        assert!(report.errors.iter().any(|e| e.field == "exchanges[0].mapping"));
    }

    #[test]
    fn test_generated_mappings_are_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let json = TWO_KERNELS.replace(
            "\"exchanges\": [",
            r#""mapping": {"strategy": "groundwater_land_surface", "input": "prep.json"}, "exchanges": ["#,
        );
        let cfg = CouplingConfig::from_json_str(&json, dir.path()).unwrap();
        let report = cfg.check_paths();
        assert!(!report.errors.iter().any(|e| e.field == "exchanges[0].mapping"));
        assert!(report.warnings.iter().any(|w| w.field == "exchanges[0].mapping"));
        assert!(report.errors.iter().any(|e| e.field == "mapping.input"));
    }

    #[test]
    fn test_iteration_group() {
        let json = TWO_KERNELS.replace(
            "\"time_step\": 0.25",
            "\"time_step\": 1.0",
        );
        let with_group = |group: &str| {
            json.replace("\"exchanges\": [", &format!("\"iteration\": {group}, \"exchanges\": ["))
        };

        let cfg = CouplingConfig::from_json_str(
            &with_group(r#"{"kernel": "gw", "partners": ["land"]}"#),
            "/run",
        )
        .unwrap();
        let it = cfg.iteration.as_ref().unwrap();
        assert_eq!(it.solution_id, 1);
        assert_eq!(it.max_iterations, None);
        assert_eq!(it.members().collect::<Vec<_>>(), vec!["gw", "land"]);

        for bad in [
            r#"{"kernel": "river"}"#,
            r#"{"kernel": "gw", "partners": ["gw"]}"#,
            r#"{"kernel": "gw", "partners": ["land", "land"]}"#,
            r#"{"kernel": "gw", "partners": ["land"], "max_iterations": 0}"#,
        ] {
            assert!(
                matches!(
                    CouplingConfig::from_json_str(&with_group(bad), "/run"),
                    Err(ConfigError::Validation(_))
                ),
                "{bad}"
            );
        }

        // 伙伴步长与主导内核不同
        let mismatched = TWO_KERNELS.replace(
            "\"exchanges\": [",
            r#""iteration": {"kernel": "gw", "partners": ["land"]}, "exchanges": ["#,
        );
        let err = CouplingConfig::from_json_str(&mismatched, "/run").unwrap_err();
        assert!(err.to_string().contains("iteration.partners[0]"));
    }

    #[test]
    fn test_log_without_exchange_log_warns() {
        let json = TWO_KERNELS.replace("\"reverse\": true", "\"reverse\": true, \"log\": true");
        let cfg = CouplingConfig::from_json_str(&json, "/run").unwrap();
        assert!(cfg.validation_report().has_warnings());
    }
}
