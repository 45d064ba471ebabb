// crates/hc_driver/src/events.rs

//! 事件系统模块
//!
//! 驱动在状态变化、内核单步完成、交换执行等节点发出 [`DriverEvent`]，
//! 由 [`EventDispatcher`] 分发给监听器。

use crate::state::DriverState;
use parking_lot::RwLock;
use std::sync::Arc;

/// 驱动事件
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// 状态变更
    StateChanged {
        /// 旧状态
        from: DriverState,
        /// 新状态
        to: DriverState,
    },
    /// 内核已初始化
    KernelInitialized {
        /// 内核名称
        kernel: String,
        /// 引擎版本
        version: String,
    },
    /// 内核完成一步
    KernelStepCompleted {
        /// 内核名称
        kernel: String,
        /// 步末模拟时间
        time: f64,
        /// 内核累计步数
        step: u64,
    },
    /// 迭代求解结束
    SolveCompleted {
        /// 主导内核名称
        kernel: String,
        /// 步末模拟时间
        time: f64,
        /// 使用的外迭代次数
        iterations: usize,
        /// 是否收敛
        converged: bool,
    },
    /// 交换已执行
    ExchangeApplied {
        /// 交换名称
        exchange: String,
        /// 模拟时间
        time: f64,
        /// 写入值之和
        total: f64,
    },
    /// 粗步长完成
    CoarseStepCompleted {
        /// 粗步序号（从 1 开始）
        step: usize,
        /// 粗步末模拟时间
        time: f64,
    },
    /// 内核已终止
    KernelFinalized {
        /// 内核名称
        kernel: String,
    },
}

impl DriverEvent {
    /// 获取事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "StateChanged",
            Self::KernelInitialized { .. } => "KernelInitialized",
            Self::KernelStepCompleted { .. } => "KernelStepCompleted",
            Self::SolveCompleted { .. } => "SolveCompleted",
            Self::ExchangeApplied { .. } => "ExchangeApplied",
            Self::CoarseStepCompleted { .. } => "CoarseStepCompleted",
            Self::KernelFinalized { .. } => "KernelFinalized",
        }
    }
}

/// 事件监听器trait
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &DriverEvent);

    /// 获取监听器名称 (用于调试)
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 函数式事件监听器
pub struct FnListener<F>
where
    F: Fn(&DriverEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&DriverEvent) + Send + Sync,
{
    /// 创建函数式监听器
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&DriverEvent) + Send + Sync,
{
    fn on_event(&self, event: &DriverEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 日志事件监听器
///
/// 默认只输出状态变更、内核初始化/终止和粗步完成；`verbose` 模式下
/// 逐步与逐次交换也会输出（debug 级别）。
pub struct LoggingListener {
    prefix: String,
    verbose: bool,
}

impl LoggingListener {
    /// 创建日志监听器
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            verbose: false,
        }
    }

    /// 设置详细模式
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl EventListener for LoggingListener {
    fn on_event(&self, event: &DriverEvent) {
        match event {
            DriverEvent::StateChanged { from, to } => {
                tracing::info!("{}: state {} -> {}", self.prefix, from, to);
            }
            DriverEvent::KernelInitialized { kernel, version } => {
                tracing::info!("{}: kernel '{}' ready (version {})", self.prefix, kernel, version);
            }
            DriverEvent::CoarseStepCompleted { step, time } => {
                tracing::info!("{}: coarse step {} done (t={})", self.prefix, step, time);
            }
            DriverEvent::KernelFinalized { kernel } => {
                tracing::info!("{}: kernel '{}' finalized", self.prefix, kernel);
            }
            DriverEvent::SolveCompleted {
                kernel,
                time,
                iterations,
                converged: false,
            } => {
                tracing::warn!(
                    "{}: kernel '{}' did not converge in {} iterations (t={})",
                    self.prefix,
                    kernel,
                    iterations,
                    time
                );
            }
            DriverEvent::SolveCompleted {
                kernel,
                iterations,
                ..
            } if self.verbose => {
                tracing::debug!("{}: kernel '{}' converged in {} iterations", self.prefix, kernel, iterations);
            }
            DriverEvent::KernelStepCompleted { kernel, time, step } if self.verbose => {
                tracing::debug!("{}: kernel '{}' step {} (t={})", self.prefix, kernel, step, time);
            }
            DriverEvent::ExchangeApplied { exchange, time, total } if self.verbose => {
                tracing::debug!(
                    "{}: exchange '{}' at t={} (total={:.6e})",
                    self.prefix,
                    exchange,
                    time,
                    total
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建新的事件分发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let name = listener.name().to_string();
        self.listeners.write().push(listener);
        tracing::debug!("Added event listener: {}", name);
    }

    /// 添加函数式监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&DriverEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(name, handler)));
    }

    /// 分发事件
    pub fn emit(&self, event: DriverEvent) {
        let listeners = self.listeners.read();
        tracing::trace!("Emitting event: {}", event.name());
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    /// 获取监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_event_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.add_fn_listener("test", move |e| sink.lock().push(e.name()));
        dispatcher.add_listener(Arc::new(LoggingListener::new("coupler").verbose()));

        dispatcher.emit(DriverEvent::StateChanged {
            from: DriverState::Setup,
            to: DriverState::Running,
        });
        dispatcher.emit(DriverEvent::CoarseStepCompleted { step: 1, time: 1.0 });

        assert_eq!(dispatcher.listener_count(), 2);
        assert_eq!(*seen.lock(), vec!["StateChanged", "CoarseStepCompleted"]);
    }
}
