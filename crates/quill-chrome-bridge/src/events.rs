//! 桥接生命周期事件
//!
//! 每个事件键维护一个有序订阅者列表,按注册顺序依次调用。
//! 单个订阅者失败只记录日志,不影响其余订阅者 —— 与帧解码
//! "一条坏消息不拖垮整个流"的策略一致。

use std::collections::HashMap;
use std::sync::RwLock;

/// 桥接事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeEvent {
    /// Relay Client 连接建立
    ClientConnected,
    /// Relay Client 连接断开
    ClientDisconnected,
    /// 进入 Bridging 状态
    Bridging,
    /// stdin 关闭,进入 Draining 状态
    Draining,
}

impl std::fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeEvent::ClientConnected => write!(f, "ClientConnected"),
            BridgeEvent::ClientDisconnected => write!(f, "ClientDisconnected"),
            BridgeEvent::Bridging => write!(f, "Bridging"),
            BridgeEvent::Draining => write!(f, "Draining"),
        }
    }
}

/// 事件订阅者回调
pub type Subscriber = Box<dyn Fn(BridgeEvent) -> Result<(), String> + Send + Sync>;

/// 事件总线 - 按事件键保存有序订阅者列表
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<BridgeEvent, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者,追加到该事件的列表末尾
    pub fn subscribe<F>(&self, event: BridgeEvent, callback: F)
    where
        F: Fn(BridgeEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.entry(event).or_default().push(Box::new(callback));
    }

    /// 依次调用该事件的所有订阅者
    pub fn emit(&self, event: BridgeEvent) {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        let Some(list) = subscribers.get(&event) else {
            return;
        };
        for (index, subscriber) in list.iter().enumerate() {
            if let Err(reason) = subscriber(event) {
                tracing::warn!("Subscriber {index} for {event} failed: {reason}");
            }
        }
    }

    /// 该事件当前的订阅者数量
    pub fn count_for(&self, event: BridgeEvent) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subscribers.get(&event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(BridgeEvent::Bridging, move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        bus.emit(BridgeEvent::Bridging);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_subscriber_does_not_abort_the_rest() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe(BridgeEvent::ClientDisconnected, |_| {
            Err("boom".to_string())
        });
        let calls_clone = Arc::clone(&calls);
        bus.subscribe(BridgeEvent::ClientDisconnected, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(BridgeEvent::ClientDisconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit(BridgeEvent::Draining);
        assert_eq!(bus.count_for(BridgeEvent::Draining), 0);
    }

    #[test]
    fn test_events_are_keyed_independently() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        bus.subscribe(BridgeEvent::ClientConnected, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(BridgeEvent::ClientDisconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        bus.emit(BridgeEvent::ClientConnected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
