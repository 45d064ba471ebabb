// crates/hc_driver/src/schedule.rs

//! 错步调度
//!
//! 粗步长为各内核步长的最大值。在一个粗步窗口内，内核从 `t` 前进到
//! `t + dt` 的前提是所有步长严格更小的内核都已到达 `t + dt`；步末时间
//! 相同的按耦合顺序执行。窗口末尾是所有内核的同步点。
//!
//! 步数以整数计，时间由 `start + k·dt` 计算，不累加浮点误差。

use hc_foundation::{steps_in, time_reached};

/// 调度中的一次内核单步
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledStep {
    /// 内核在耦合顺序中的位置
    pub kernel: usize,
    /// 步长
    pub dt: f64,
    /// 步初时间
    pub start: f64,
    /// 步末时间
    pub end: f64,
}

/// 错步调度器
#[derive(Debug, Clone)]
pub struct StaggeredSchedule {
    /// 按耦合顺序排列的步长
    time_steps: Vec<f64>,
    /// 每个内核在一个窗口内的步数
    steps_per_window: Vec<usize>,
    window: f64,
}

impl StaggeredSchedule {
    /// 由按耦合顺序排列的步长创建
    ///
    /// 任一步长不能整除粗步长时返回 `None`。
    pub fn new(time_steps: Vec<f64>) -> Option<Self> {
        let window = time_steps.iter().copied().fold(0.0_f64, f64::max);
        if !(window > 0.0) {
            return None;
        }
        let steps_per_window = time_steps
            .iter()
            .map(|&dt| steps_in(window, dt))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            time_steps,
            steps_per_window,
            window,
        })
    }

    /// 粗步长
    pub fn window(&self) -> f64 {
        self.window
    }

    /// 内核数
    pub fn kernel_count(&self) -> usize {
        self.time_steps.len()
    }

    /// 每个内核在一个窗口内的步数
    pub fn steps_per_window(&self) -> &[usize] {
        &self.steps_per_window
    }

    /// 生成从 `start` 开始的一个窗口内的执行顺序
    pub fn window_steps(&self, start: f64) -> Vec<ScheduledStep> {
        let n = self.time_steps.len();
        let mut done = vec![0usize; n];
        let total: usize = self.steps_per_window.iter().sum();
        let mut order = Vec::with_capacity(total);

        let clock = |i: usize, k: usize| start + k as f64 * self.time_steps[i];

        while order.len() < total {
            let mut next: Option<(usize, f64)> = None;
            for i in 0..n {
                if done[i] >= self.steps_per_window[i] {
                    continue;
                }
                let target = clock(i, done[i] + 1);
                let eligible = (0..n).all(|j| {
                    self.time_steps[j] >= self.time_steps[i] || time_reached(clock(j, done[j]), target)
                });
                if !eligible {
                    continue;
                }
                // 步末时间更早者优先，相同时保留耦合顺序靠前者
                match next {
                    Some((_, best)) if time_reached(target, best) => {}
                    _ => next = Some((i, target)),
                }
            }

            // 步长最小的未完成内核总是可执行，这里不会为 None
            let Some((i, end)) = next else { break };
            order.push(ScheduledStep {
                kernel: i,
                dt: self.time_steps[i],
                start: clock(i, done[i]),
                end,
            });
            done[i] += 1;
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernels(steps: &[ScheduledStep]) -> Vec<usize> {
        steps.iter().map(|s| s.kernel).collect()
    }

    #[test]
    fn test_equal_steps_follow_coupling_order() {
        let s = StaggeredSchedule::new(vec![1.0, 1.0]).unwrap();
        let w = s.window_steps(3.0);
        assert_eq!(kernels(&w), vec![0, 1]);
        assert_eq!(w[1].start, 3.0);
        assert_eq!(w[1].end, 4.0);
    }

    #[test]
    fn test_smaller_steps_run_first() {
        // 耦合顺序: 粗 (1.0), 细 (0.25), 中 (0.5)
        let s = StaggeredSchedule::new(vec![1.0, 0.25, 0.5]).unwrap();
        assert_eq!(s.window(), 1.0);
        assert_eq!(s.steps_per_window(), &[1, 4, 2]);

        let w = s.window_steps(0.0);
        assert_eq!(kernels(&w), vec![1, 1, 2, 1, 1, 2, 0]);
        assert_eq!(w[2].end, 0.5);
        assert_eq!(w.last().map(|s| s.start), Some(0.0));
    }

    #[test]
    fn test_rejects_non_integral_steps() {
        assert!(StaggeredSchedule::new(vec![1.0, 0.3]).is_none());
        assert!(StaggeredSchedule::new(vec![]).is_none());
    }
}
