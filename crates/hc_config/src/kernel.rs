// crates/hc_config/src/kernel.rs

//! 内核声明

use crate::paths::PathResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 引擎类别
///
/// 决定变量地址的组合方式和逻辑变量名表，不影响生命周期。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// 地下水模型（MODFLOW 6）
    Modflow6,
    /// 非饱和带 / 地表模型（MetaSWAP）
    Metaswap,
    /// 地表水网络模型（Ribasim）
    Ribasim,
    /// 水动力模型（D-Flow FM）
    Dflow,
    /// 通用引擎，变量名原样使用
    #[default]
    Generic,
}

impl EngineKind {
    /// 引擎默认的输入文件名（相对于工作目录）
    pub fn default_config_file(self) -> Option<&'static str> {
        match self {
            Self::Modflow6 => Some("mfsim.nam"),
            Self::Metaswap => Some("para_sim.inp"),
            Self::Ribasim => Some("ribasim.toml"),
            Self::Dflow | Self::Generic => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Modflow6 => "modflow6",
            Self::Metaswap => "metaswap",
            Self::Ribasim => "ribasim",
            Self::Dflow => "dflow",
            Self::Generic => "generic",
        };
        f.pad(s)
    }
}

/// 单个内核的声明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelConfig {
    /// 内核名称（交换声明中引用）
    pub name: String,
    /// 引擎类别
    #[serde(default)]
    pub kind: EngineKind,
    /// 共享库路径
    pub library: PathBuf,
    /// 共享库依赖目录
    #[serde(default)]
    pub dependency_dir: Option<PathBuf>,
    /// 模型工作目录
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// 引擎输入文件（相对于工作目录）
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// 内核时间步长
    pub time_step: f64,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

impl KernelConfig {
    /// 解析后的共享库路径
    pub fn library_path(&self, paths: &PathResolver) -> PathBuf {
        paths.resolve(&self.library)
    }

    /// 解析后的依赖目录
    pub fn dependency_path(&self, paths: &PathResolver) -> Option<PathBuf> {
        self.dependency_dir.as_ref().map(|d| paths.resolve(d))
    }

    /// 解析后的工作目录
    pub fn work_path(&self, paths: &PathResolver) -> PathBuf {
        paths.resolve(&self.work_dir)
    }

    /// 传给引擎 `initialize` 的绝对输入路径
    ///
    /// 未显式给出输入文件且引擎类别无默认文件名时，返回工作目录本身。
    pub fn engine_input_path(&self, paths: &PathResolver) -> PathBuf {
        let work = paths.nested(&self.work_dir);
        match (&self.config_file, self.kind.default_config_file()) {
            (Some(file), _) => work.resolve(file),
            (None, Some(default)) => work.resolve(default),
            (None, None) => work.base_dir().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(kind: EngineKind) -> KernelConfig {
        KernelConfig {
            name: "k".into(),
            kind,
            library: "lib/libk.so".into(),
            dependency_dir: None,
            work_dir: "model".into(),
            config_file: None,
            time_step: 1.0,
        }
    }

    #[test]
    fn test_engine_input_default_per_kind() {
        let paths = PathResolver::new("/run");
        assert_eq!(
            kernel(EngineKind::Modflow6).engine_input_path(&paths),
            PathBuf::from("/run/model/mfsim.nam")
        );
        assert_eq!(
            kernel(EngineKind::Generic).engine_input_path(&paths),
            PathBuf::from("/run/model")
        );
    }

    #[test]
    fn test_explicit_config_file() {
        let paths = PathResolver::new("/run");
        let mut k = kernel(EngineKind::Ribasim);
        k.config_file = Some("custom.toml".into());
        assert_eq!(k.engine_input_path(&paths), PathBuf::from("/run/model/custom.toml"));
    }

    #[test]
    fn test_kind_deserialize_lowercase() {
        let kind: EngineKind = serde_json::from_str("\"metaswap\"").unwrap();
        assert_eq!(kind, EngineKind::Metaswap);
        assert_eq!(kind.to_string(), "metaswap");
    }
}
