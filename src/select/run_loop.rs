//! 选择器运行循环
//!
//! 反复执行轮次直到选出获胜者或收到中止：每个失败的轮次之后轮换目标协议、
//! 尝试刷新远程服务器列表，并在1到2秒的随机退避后重试。
//!
//! 运行循环在独立的任务上执行。[`ServerSelector::abort`] 设置中止标志并等待该任务退出，
//! 这是唯一受支持的关闭方式，可以重复调用。

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::coordinator::{RunRequest, SelectionCoordinator};
use crate::core::{AbortSignal, ProtocolTargetSequence, SelectionStats};
use crate::error::{Result, SelectorError};
use crate::probe::SelectedServer;

/// 服务器选择器
#[derive(Clone)]
pub struct ServerSelector {
    inner: Arc<SelectorInner>,
}

struct SelectorInner {
    coordinator: SelectionCoordinator,
    abort: AbortSignal,
    running: watch::Sender<bool>,
}

/// 运行任务退出（包括被取消或崩溃）时清除运行状态
struct RunningGuard(Arc<SelectorInner>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.send_replace(false);
    }
}

/// `run` 的future被丢弃时取消运行任务
struct AbortOnDrop(JoinHandle<Option<SelectedServer>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl ServerSelector {
    /// 用协调器创建选择器
    pub fn new(coordinator: SelectionCoordinator) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(SelectorInner {
                coordinator,
                abort: AbortSignal::new(),
                running,
            }),
        }
    }

    /// 运行选择循环直到选出获胜者或被中止
    ///
    /// 先停止任何仍在进行的运行。被中止时返回 `Ok(None)`；
    /// 只有运行任务本身崩溃时才返回错误。
    pub async fn run(&self, request: RunRequest) -> Result<Option<SelectedServer>> {
        self.abort().await;
        self.inner.abort.reset();
        self.inner.running.send_replace(true);

        // 守卫随future一起移动，即使任务在首次轮询前被取消也会清除运行状态
        let guard = RunningGuard(self.inner.clone());
        let mut handle = AbortOnDrop(tokio::spawn(async move {
            let guard = guard;
            guard.0.run_loop(&request).await
        }));

        (&mut handle.0)
            .await
            .map_err(|e| SelectorError::internal_error(format!("selector task failed: {}", e)))
    }

    /// 中止当前运行并等待运行循环完全停止
    pub async fn abort(&self) {
        self.inner.abort.abort();
        let mut running = self.inner.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    /// 运行循环是否在执行
    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// 目标协议序列
    pub fn targets(&self) -> Arc<ProtocolTargetSequence> {
        self.inner.coordinator.targets().clone()
    }

    /// 统计信息快照
    pub fn stats(&self) -> SelectionStats {
        self.inner.coordinator.stats()
    }

    /// 协调器
    pub fn coordinator(&self) -> &SelectionCoordinator {
        &self.inner.coordinator
    }
}

impl SelectorInner {
    async fn run_loop(&self, request: &RunRequest) -> Option<SelectedServer> {
        let coordinator = &self.coordinator;
        let poll = coordinator.config().connect_poll_interval;

        while !self.abort.is_aborted() {
            crate::sel_info!("selecting server, target protocols: {}", coordinator.targets().current_label());

            if let Some(selected) = coordinator.run_round(&self.abort, request).await {
                return Some(selected);
            }
            if self.abort.is_aborted() {
                break;
            }

            coordinator.targets().advance();

            if let Err(e) = coordinator
                .store()
                .refresh_from_remote(coordinator.protector_for(request))
                .await
            {
                crate::sel_warn!("fetch remote server list failed: {}", e);
            }

            if self.abort.sleep_or_abort(coordinator.backoff(), poll).await {
                break;
            }
        }
        None
    }
}
