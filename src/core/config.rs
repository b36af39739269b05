//! 选择器配置

use std::time::Duration;

use super::protocol::Capability;
use crate::error::{Result, SelectorError};

/// 选择器配置
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// 工作池大小
    pub pool_size: usize,
    /// 连接轮询和中止检查的细粒度间隔
    pub connect_poll_interval: Duration,
    /// 结果检查的粗粒度间隔，必须是细粒度间隔的整数倍
    pub results_poll_interval: Duration,
    /// 强制取消后等待工作单元退出的宽限期
    pub shutdown_grace: Duration,
    /// 单个轮次的最长时长
    pub max_round_duration: Duration,
    /// 轮次失败后的最短退避
    pub backoff_min: Duration,
    /// 轮次失败后的最长退避
    pub backoff_max: Duration,
    /// 等待网络连接时的检查间隔
    pub connectivity_poll_interval: Duration,
    /// 建立隧道所需的最低能力（具备其一即可）
    pub sufficient_capabilities: Vec<Capability>,
    /// 洗牌随机数种子，`None` 时使用系统熵
    pub shuffle_seed: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            connect_poll_interval: Duration::from_millis(50),
            results_poll_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(1000),
            max_round_duration: Duration::from_secs(20),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(2),
            connectivity_poll_interval: Duration::from_secs(1),
            sufficient_capabilities: Capability::sufficient_for_tunnel(),
            shuffle_seed: None,
        }
    }
}

impl SelectorConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置工作池大小
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// 设置轮询间隔
    pub fn with_poll_intervals(mut self, connect: Duration, results: Duration) -> Self {
        self.connect_poll_interval = connect;
        self.results_poll_interval = results;
        self
    }

    /// 设置宽限期
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// 设置轮次最长时长
    pub fn with_max_round_duration(mut self, duration: Duration) -> Self {
        self.max_round_duration = duration;
        self
    }

    /// 设置退避区间
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    /// 设置网络连接检查间隔
    pub fn with_connectivity_poll_interval(mut self, interval: Duration) -> Self {
        self.connectivity_poll_interval = interval;
        self
    }

    /// 设置最低能力集合
    pub fn with_sufficient_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.sufficient_capabilities = capabilities;
        self
    }

    /// 设置洗牌种子
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// 结果检查间隔对应的细粒度轮询次数
    pub fn results_poll_ratio(&self) -> u32 {
        let fine = self.connect_poll_interval.as_nanos().max(1);
        (self.results_poll_interval.as_nanos() / fine).max(1) as u32
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(SelectorError::config_error("pool size must be positive"));
        }
        if self.connect_poll_interval.is_zero() {
            return Err(SelectorError::config_error("connect poll interval must be positive"));
        }
        let fine = self.connect_poll_interval.as_nanos();
        let coarse = self.results_poll_interval.as_nanos();
        if coarse < fine || coarse % fine != 0 {
            return Err(SelectorError::config_error(
                "results poll interval must be a positive multiple of the connect poll interval",
            ));
        }
        if self.max_round_duration < self.results_poll_interval {
            return Err(SelectorError::config_error(
                "max round duration must cover at least one results poll",
            ));
        }
        if self.backoff_min > self.backoff_max {
            return Err(SelectorError::config_error("backoff min exceeds backoff max"));
        }
        if self.connectivity_poll_interval.is_zero() {
            return Err(SelectorError::config_error("connectivity poll interval must be positive"));
        }
        if self.sufficient_capabilities.is_empty() {
            return Err(SelectorError::config_error("sufficient capability set is empty"));
        }
        Ok(())
    }
}
