//! 选择协调器
//!
//! 编排一个轮次：构建候选集合，派发到有界工作池，按提前退出/超时策略等待，
//! 汇总结果，选出获胜者，持久化移到前部的重排，并关闭所有落选者的资源。
//!
//! 轮次结束后最多只有一个结果的资源仍然打开（获胜者的）。

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::time::MissedTickBehavior;

use super::pool::WorkerPool;
use crate::core::{
    AbortSignal, HandshakeRoutine, NetworkEnvironment, ObfuscationServerFactory,
    ProtocolTargetSequence, RoundSummary, SelectionStats, SelectorConfig, ServerCandidate,
    ServerListStore, SessionParams, SocketProtector,
};
use crate::probe::{ProbeOutcome, ProbeWorker, RoundContext, SelectedServer};

/// 调用方提供的运行参数
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// 调用方的停止信号，会传给握手例程
    pub stop_signal: Option<AbortSignal>,
    /// 是否需要把直连套接字排除在VPN之外
    pub protect_sockets: bool,
    /// 会话参数
    pub session: SessionParams,
}

impl RunRequest {
    /// 使用给定会话参数创建
    pub fn new(session: SessionParams) -> Self {
        Self {
            stop_signal: None,
            protect_sockets: false,
            session,
        }
    }

    /// 设置停止信号
    pub fn with_stop_signal(mut self, signal: AbortSignal) -> Self {
        self.stop_signal = Some(signal);
        self
    }

    /// 设置是否保护套接字
    pub fn with_protect_sockets(mut self, protect: bool) -> Self {
        self.protect_sockets = protect;
        self
    }
}

/// 选择协调器
pub struct SelectionCoordinator {
    config: SelectorConfig,
    targets: Arc<ProtocolTargetSequence>,
    store: Arc<dyn ServerListStore>,
    handshake: Arc<dyn HandshakeRoutine>,
    obfuscation: Arc<dyn ObfuscationServerFactory>,
    environment: Arc<dyn NetworkEnvironment>,
    protector: Option<Arc<dyn SocketProtector>>,
    rng: Mutex<StdRng>,
    stats: Mutex<SelectionStats>,
}

impl SelectionCoordinator {
    /// 创建协调器
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SelectorConfig,
        targets: Arc<ProtocolTargetSequence>,
        store: Arc<dyn ServerListStore>,
        handshake: Arc<dyn HandshakeRoutine>,
        obfuscation: Arc<dyn ObfuscationServerFactory>,
        environment: Arc<dyn NetworkEnvironment>,
        protector: Option<Arc<dyn SocketProtector>>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            targets,
            store,
            handshake,
            obfuscation,
            environment,
            protector,
            rng: Mutex::new(rng),
            stats: Mutex::new(SelectionStats::new()),
        }
    }

    /// 配置
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// 目标协议序列
    pub fn targets(&self) -> &Arc<ProtocolTargetSequence> {
        &self.targets
    }

    /// 服务器列表存储
    pub fn store(&self) -> &Arc<dyn ServerListStore> {
        &self.store
    }

    /// 需要保护套接字时使用的回调
    pub fn protector_for(&self, request: &RunRequest) -> Option<Arc<dyn SocketProtector>> {
        if request.protect_sockets {
            self.protector.clone()
        } else {
            None
        }
    }

    /// 统计信息快照
    pub fn stats(&self) -> SelectionStats {
        self.stats_guard().clone()
    }

    fn stats_guard(&self) -> MutexGuard<'_, SelectionStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rng_guard(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 随机退避时长
    pub fn backoff(&self) -> std::time::Duration {
        use rand::Rng;
        let min = self.config.backoff_min;
        let max = self.config.backoff_max;
        if max <= min {
            return min;
        }
        let span = (max - min).as_millis() as u64;
        min + std::time::Duration::from_millis(self.rng_guard().gen_range(0..=span))
    }

    /// 执行一个轮次
    ///
    /// `abort` 是调用方控制的信号；轮次内部的提前退出使用它派生的子信号。
    /// 返回获胜者，或者在没有响应者、被中止时返回 `None`。
    pub async fn run_round(&self, abort: &AbortSignal, request: &RunRequest) -> Option<SelectedServer> {
        let started = Instant::now();
        let mut summary = RoundSummary::started();

        let winner = self.run_round_inner(abort, request, &mut summary).await;

        summary.duration = started.elapsed();
        summary.aborted = abort.is_aborted();
        if let Some(selected) = &winner {
            summary.winner = Some(selected.address().to_string());
            summary.winner_protocol = Some(selected.protocol);
            summary.winner_response_time = Some(selected.response_time);
        }
        self.stats_guard().record_round(&summary);
        winner
    }

    async fn run_round_inner(
        &self,
        abort: &AbortSignal,
        request: &RunRequest,
        summary: &mut RoundSummary,
    ) -> Option<SelectedServer> {
        if !self.wait_for_connectivity(abort).await {
            return None;
        }
        self.environment.refresh_dns_resolvers();

        let mut candidates = self.store.candidates();
        let original_first = candidates.first().cloned();

        if candidates.len() > self.config.pool_size {
            candidates[1..].shuffle(&mut *self.rng_guard());
        }

        let egress_region = self.environment.egress_region();
        crate::sel_info!("selected region: {}", egress_region.as_deref().unwrap_or("<any>"));

        let proxy = self.environment.proxy_settings();
        crate::sel_info!("proxy chaining enabled: {}", proxy.is_some());
        if let Some(proxy) = &proxy {
            crate::sel_info!("connecting via network proxy {}:{}", proxy.host, proxy.port);
        }

        let round_abort = match &request.stop_signal {
            Some(stop) => abort.linked_with(stop),
            None => abort.child(),
        };
        let ctx = Arc::new(RoundContext::new(
            self.targets.clone(),
            self.handshake.clone(),
            self.obfuscation.clone(),
            self.protector_for(request),
            proxy,
            request.session.clone(),
            round_abort.clone(),
            self.config.connect_poll_interval,
        ));

        let workers: Vec<ProbeWorker> = candidates
            .into_iter()
            .filter(|candidate| self.is_eligible(candidate, egress_region.as_deref()))
            .enumerate()
            .map(|(index, candidate)| ProbeWorker::new(index, candidate, ctx.clone()))
            .collect();
        let dispatched = workers.len();
        summary.dispatched = dispatched;

        let mut outcomes = Vec::with_capacity(dispatched);
        if dispatched > 0 {
            let mut pool = WorkerPool::start(self.config.pool_size, workers);
            self.wait_for_results(abort, &mut pool, dispatched, &mut outcomes).await;

            round_abort.abort();
            pool.shutdown_now();
            outcomes.extend(pool.await_termination(self.config.shutdown_grace).await);
        }

        summary.completed = outcomes.len();
        for outcome in &outcomes {
            log_response_check(outcome);
        }

        let mut responders: Vec<ProbeOutcome> = outcomes.into_iter().filter(|o| o.responded).collect();
        summary.responded = responders.len();

        if abort.is_aborted() {
            // 落选者和获胜者都在析构时关闭
            return None;
        }

        self.order_responders(&mut responders, original_first.as_ref());

        if responders.is_empty() {
            return None;
        }

        let preferred: Vec<ServerCandidate> = responders.iter().map(|o| o.candidate.clone()).collect();
        if let Err(e) = self.store.move_to_front(&preferred) {
            crate::sel_warn!("failed to reorder server list: {}", e);
        }
        crate::sel_info!("preferred servers: {}", preferred.len());

        let mut responders = responders.into_iter();
        let winner = responders.next().and_then(ProbeOutcome::into_selected);
        for mut loser in responders {
            loser.release();
        }

        if let Some(selected) = &winner {
            crate::sel_info!(
                "SelectedServer ipAddress={} connType={} front={}",
                selected.address(),
                selected.protocol,
                selected.candidate.front.as_deref().unwrap_or("")
            );
        }
        winner
    }

    /// 候选服务器是否可以派发
    pub fn is_eligible(&self, candidate: &ServerCandidate, egress_region: Option<&str>) -> bool {
        candidate.preferred_reachability_test_port().is_some()
            && candidate.has_one_of_capabilities(&self.config.sufficient_capabilities)
            && candidate.in_region(egress_region)
            && self.targets.select_protocol(candidate).is_some()
    }

    /// 对响应者排序：按派发顺序固定起点后洗牌，然后把原列表首项（若在其中）移回首位
    pub fn order_responders(&self, responders: &mut Vec<ProbeOutcome>, original_first: Option<&ServerCandidate>) {
        responders.sort_by_key(|o| o.dispatch_index);
        responders.shuffle(&mut *self.rng_guard());

        if let Some(first) = original_first {
            if let Some(index) = responders.iter().position(|o| o.candidate.same_server(first)) {
                if index != 0 {
                    let outcome = responders.remove(index);
                    responders.insert(0, outcome);
                }
            }
        }
    }

    async fn wait_for_connectivity(&self, abort: &AbortSignal) -> bool {
        let mut printed = false;
        while !self.environment.has_network_connectivity() {
            if !printed {
                crate::sel_info!("waiting for network connectivity");
                printed = true;
            }
            if abort
                .sleep_or_abort(self.config.connectivity_poll_interval, self.config.connect_poll_interval)
                .await
            {
                return false;
            }
        }
        !abort.is_aborted()
    }

    async fn wait_for_results(
        &self,
        abort: &AbortSignal,
        pool: &mut WorkerPool,
        dispatched: usize,
        outcomes: &mut Vec<ProbeOutcome>,
    ) {
        let deadline = tokio::time::Instant::now() + self.config.max_round_duration;
        let ratio = self.config.results_poll_ratio() as u64;
        let mut ticker = tokio::time::interval(self.config.connect_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;
        let mut pool_open = true;

        loop {
            tokio::select! {
                outcome = pool.next_outcome(), if pool_open => {
                    match outcome {
                        Some(outcome) => outcomes.push(outcome),
                        None => pool_open = false,
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if abort.is_aborted() || tokio::time::Instant::now() >= deadline {
                break;
            }

            // 每个粗粒度间隔检查一次：有结果就立即使用，全部完成就不再等待
            if ticks > 0 && ticks % ratio == 0 {
                if outcomes.iter().any(|o| o.responded) {
                    break;
                }
                if outcomes.len() >= dispatched {
                    break;
                }
            }
            ticks += 1;
        }
    }
}

fn log_response_check(outcome: &ProbeOutcome) {
    crate::sel_debug!(
        "ServerResponseCheck ipAddress={} connType={} front={} responded={} responseTime={}ms error={} regionCode={}",
        outcome.candidate.ip_address,
        outcome.protocol.map(|p| p.as_str()).unwrap_or(""),
        outcome.candidate.front.as_deref().unwrap_or(""),
        outcome.responded,
        outcome.elapsed.as_millis(),
        outcome.error.as_deref().unwrap_or(""),
        outcome.candidate.region
    );
}
