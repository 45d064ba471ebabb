// crates/hc_foundation/src/time.rs

//! 模拟时间工具
//!
//! 各内核以 `f64` 表示模拟时间（通常以天为单位）。时间比较与步长整除检查
//! 统一使用 [`TIME_TOLERANCE`] 相对容差，避免累积舍入误差导致多走或少走一步。

/// 时间比较的相对容差
pub const TIME_TOLERANCE: f64 = 1e-9;

fn scaled_tolerance(reference: f64) -> f64 {
    TIME_TOLERANCE * reference.abs().max(1.0)
}

/// 判断时钟 `current` 是否已到达 `target`（含容差）
#[inline]
pub fn time_reached(current: f64, target: f64) -> bool {
    current >= target - scaled_tolerance(target)
}

/// 计算 `window` 中包含多少个长度为 `dt` 的步长
///
/// 当 `dt` 非正或 `window / dt` 不是整数时返回 `None`。
///
/// ```
/// use hc_foundation::time::steps_in;
///
/// assert_eq!(steps_in(1.0, 0.25), Some(4));
/// assert_eq!(steps_in(1.0, 0.3), None);
/// ```
pub fn steps_in(window: f64, dt: f64) -> Option<usize> {
    if !(dt > 0.0) || !window.is_finite() || window < 0.0 {
        return None;
    }
    let rounded = (window / dt).round();
    // 按时间量比较余量，容差不随步数增长
    if (rounded * dt - window).abs() > scaled_tolerance(window) {
        return None;
    }
    Some(rounded as usize)
}
