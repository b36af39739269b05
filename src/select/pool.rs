//! 有界工作池
//!
//! 固定数量的池任务按先进先出顺序从共享队列中取出工作单元执行，
//! 并通过通道送回结果。

use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::probe::{ProbeOutcome, ProbeWorker};

type WorkQueue = Arc<Mutex<VecDeque<ProbeWorker>>>;

/// 有界工作池
pub struct WorkerPool {
    queue: WorkQueue,
    tasks: JoinSet<()>,
    results: mpsc::UnboundedReceiver<ProbeOutcome>,
}

impl WorkerPool {
    /// 启动工作池并派发全部工作单元
    pub fn start(size: usize, workers: Vec<ProbeWorker>) -> Self {
        let task_count = size.max(1).min(workers.len());
        let queue: WorkQueue = Arc::new(Mutex::new(workers.into_iter().collect()));
        let (tx, results) = mpsc::unbounded_channel();

        let mut tasks = JoinSet::new();
        for _ in 0..task_count {
            let queue = queue.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                while let Some(worker) = next_worker(&queue) {
                    let outcome = run_caught(worker).await;
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }

        Self {
            queue,
            tasks,
            results,
        }
    }

    /// 等待下一个结果；所有池任务退出后返回 `None`
    pub async fn next_outcome(&mut self) -> Option<ProbeOutcome> {
        self.results.recv().await
    }

    /// 丢弃尚未开始的工作单元
    pub fn shutdown_now(&mut self) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// 在宽限期内收集剩余结果，然后强制终止仍在运行的任务
    ///
    /// 被强制终止的工作单元在析构时释放自己的资源。
    pub async fn await_termination(&mut self, grace: Duration) -> Vec<ProbeOutcome> {
        let deadline = Instant::now() + grace;
        let mut outcomes = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.results.recv()).await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) | Err(_) => break,
            }
        }

        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}

        while let Ok(outcome) = self.results.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn next_worker(queue: &WorkQueue) -> Option<ProbeWorker> {
    queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
}

async fn run_caught(worker: ProbeWorker) -> ProbeOutcome {
    let index = worker.dispatch_index();
    let candidate = worker.candidate().clone();
    let start = std::time::Instant::now();
    match AssertUnwindSafe(worker.run()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => {
            crate::sel_error!("probe worker for {} panicked", candidate.ip_address);
            ProbeOutcome::failed(index, candidate, None, start.elapsed(), "probe worker panicked")
        }
    }
}
