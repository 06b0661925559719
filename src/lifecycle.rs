//! 应用生命周期事件总线
//!
//! 启动过程依次发布 `EnvironmentPrepared`、`Prepared`、`Started`，
//! 每个阶段只发布一次，观察者按订阅顺序收到通知。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{AopError, Result};

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecyclePhase {
    /// 环境（配置、日志）已就绪
    EnvironmentPrepared,
    /// 组件已装配，尚未对外服务
    Prepared,
    /// 已开始对外服务
    Started,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 3] = [
        LifecyclePhase::EnvironmentPrepared,
        LifecyclePhase::Prepared,
        LifecyclePhase::Started,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::EnvironmentPrepared => "environment_prepared",
            LifecyclePhase::Prepared => "prepared",
            LifecyclePhase::Started => "started",
        }
    }

    fn next(current: Option<LifecyclePhase>) -> Option<LifecyclePhase> {
        match current {
            None => Some(LifecyclePhase::EnvironmentPrepared),
            Some(LifecyclePhase::EnvironmentPrepared) => Some(LifecyclePhase::Prepared),
            Some(LifecyclePhase::Prepared) => Some(LifecyclePhase::Started),
            Some(LifecyclePhase::Started) => None,
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生命周期观察者
pub trait LifecycleObserver: Send + Sync {
    fn on_phase(&self, phase: LifecyclePhase) -> anyhow::Result<()>;
}

impl<F> LifecycleObserver for F
where
    F: Fn(LifecyclePhase) -> anyhow::Result<()> + Send + Sync,
{
    fn on_phase(&self, phase: LifecyclePhase) -> anyhow::Result<()> {
        self(phase)
    }
}

struct Subscription {
    phase: LifecyclePhase,
    observer: Arc<dyn LifecycleObserver>,
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Subscription>,
    current: Option<LifecyclePhase>,
}

/// 生命周期事件总线
#[derive(Default)]
pub struct LifecycleBus {
    state: Mutex<BusState>,
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅指定阶段；对已发布的阶段订阅不会补发
    pub fn subscribe<O>(&self, phase: LifecyclePhase, observer: O) -> &Self
    where
        O: LifecycleObserver + 'static,
    {
        let mut state = self.state.lock();
        if state.current.is_some_and(|current| current >= phase) {
            tracing::warn!(phase = %phase, "subscribed after phase was published, will not fire");
        }
        state.subscriptions.push(Subscription {
            phase,
            observer: Arc::new(observer),
        });
        self
    }

    /// 最近一次发布的阶段
    pub fn current_phase(&self) -> Option<LifecyclePhase> {
        self.state.lock().current
    }

    /// 发布阶段，必须严格按顺序且每个阶段只发布一次
    ///
    /// 观察者失败时立即返回，阶段仍视为已发布。
    pub fn publish(&self, phase: LifecyclePhase) -> Result<()> {
        let observers: Vec<Arc<dyn LifecycleObserver>> = {
            let mut state = self.state.lock();
            let expected = LifecyclePhase::next(state.current);
            if expected != Some(phase) {
                return Err(AopError::Lifecycle(match expected {
                    Some(expected) => format!("cannot publish {phase}, expected {expected}"),
                    None => format!("cannot publish {phase}, lifecycle already started"),
                }));
            }
            state.current = Some(phase);
            state
                .subscriptions
                .iter()
                .filter(|sub| sub.phase == phase)
                .map(|sub| Arc::clone(&sub.observer))
                .collect()
        };

        tracing::info!(phase = %phase, observers = observers.len(), "lifecycle phase published");
        for observer in observers {
            observer
                .on_phase(phase)
                .map_err(|source| AopError::ObserverFailure {
                    phase: phase.as_str(),
                    source,
                })?;
        }
        Ok(())
    }

    /// 依次发布剩余的全部阶段
    pub fn run_startup(&self) -> Result<()> {
        while let Some(phase) = LifecyclePhase::next(self.current_phase()) {
            self.publish(phase)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LifecycleBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LifecycleBus")
            .field("subscriptions", &state.subscriptions.len())
            .field("current", &state.current)
            .finish()
    }
}
