//! 中止信号模块
//!
//! 共享的中止标志。子信号在自身或任何祖先被设置时都视为已中止，
//! 这样轮次内的提前退出只影响本轮，而调用方的中止会传递到所有轮次。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 中止信号
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
    parents: Vec<Arc<AtomicBool>>,
}

impl AbortSignal {
    /// 创建新的中止信号
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置中止标志，可重复调用
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 清除自身的中止标志（不影响祖先）
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// 是否已中止
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.parents.iter().any(|p| p.load(Ordering::SeqCst))
    }

    /// 派生子信号
    pub fn child(&self) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.flag.clone());
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parents,
        }
    }

    /// 派生同时受另一个信号控制的子信号
    pub fn linked_with(&self, other: &AbortSignal) -> Self {
        let mut child = self.child();
        child.parents.push(other.flag.clone());
        child.parents.extend(other.parents.iter().cloned());
        child
    }

    /// 睡眠指定时长，每隔 `poll` 检查一次中止标志
    ///
    /// 返回 `true` 表示睡眠因中止而提前结束。
    pub async fn sleep_or_abort(&self, total: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_aborted() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }
}
