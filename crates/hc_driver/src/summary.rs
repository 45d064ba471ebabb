// crates/hc_driver/src/summary.rs

//! 运行摘要

use crate::error::CouplerError;
use crate::state::DriverState;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 单个内核的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelStats {
    /// 内核名称
    pub name: String,
    /// 完成的步数
    pub steps: u64,
    /// 引擎调用累计耗时（秒），未启用计时时为空
    pub engine_secs: Option<f64>,
}

/// 一次耦合运行的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// 结束状态
    pub state: DriverState,
    /// 开始时刻
    pub started_at: DateTime<Local>,
    /// 墙钟耗时（秒）
    pub elapsed_secs: f64,
    /// 完成的粗步数
    pub coarse_steps: usize,
    /// 结束时的模拟时间
    pub sim_time: f64,
    /// 执行的交换次数
    pub exchanges_applied: u64,
    /// 各内核统计（声明顺序）
    pub kernels: Vec<KernelStats>,
}

impl RunSummary {
    /// 是否正常结束
    pub fn is_done(&self) -> bool {
        self.state == DriverState::Done
    }

    /// 按名称查找内核步数
    pub fn kernel_steps(&self, name: &str) -> Option<u64> {
        self.kernels.iter().find(|k| k.name == name).map(|k| k.steps)
    }

    /// 以 JSON 格式写出摘要
    pub fn write_json(&self, path: &Path) -> Result<(), CouplerError> {
        let output_err = |message: String| CouplerError::Output {
            path: path.to_path_buf(),
            message,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| output_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| output_err(e.to_string()))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} at t={} after {} coarse steps ({:.2}s, started {})",
            self.state,
            self.sim_time,
            self.coarse_steps,
            self.elapsed_secs,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f, "  exchanges applied: {}", self.exchanges_applied)?;
        for k in &self.kernels {
            match k.engine_secs {
                Some(secs) => writeln!(f, "  {}: {} steps, {:.3}s in engine", k.name, k.steps, secs)?,
                None => writeln!(f, "  {}: {} steps", k.name, k.steps)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn summary() -> RunSummary {
        RunSummary {
            state: DriverState::Done,
            started_at: Local::now(),
            elapsed_secs: 0.5,
            coarse_steps: 3,
            sim_time: 3.0,
            exchanges_applied: 6,
            kernels: vec![KernelStats {
                name: "gw".into(),
                steps: 3,
                engine_secs: None,
            }],
        }
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary().write_json(&path).unwrap();
        let back: RunSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(back.is_done());
        assert_eq!(back.kernel_steps("gw"), Some(3));
    }

    #[test]
    fn test_write_failure_is_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("summary.json");
        let err = summary().write_json(&path).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Output);
        assert!(err.report().starts_with("OutputError: "));
    }
}
