// crates/hc_config/src/paths.rs

//! 路径解析
//!
//! 配置中的相对路径一律以配置文件所在目录为基准。基准目录作为显式参数
//! 传入每一次解析调用，进程的当前工作目录从不被修改。

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// 基于显式基准目录的路径解析器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl PathResolver {
    /// 以给定目录为基准创建解析器
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 基准目录
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 解析路径：绝对路径原样返回，相对路径拼接到基准目录
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// 解析路径并要求其存在
    pub fn resolve_existing(
        &self,
        key: &str,
        path: impl AsRef<Path>,
    ) -> Result<PathBuf, ConfigError> {
        let resolved = self.resolve(path);
        if resolved.exists() {
            Ok(resolved)
        } else {
            Err(ConfigError::PathNotFound {
                key: key.to_string(),
                path: resolved,
            })
        }
    }

    /// 以解析后的子目录为新基准
    pub fn nested(&self, dir: impl AsRef<Path>) -> Self {
        Self::new(self.resolve(dir))
    }
}
