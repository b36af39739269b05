//! 选择器构造器模块
//!
//! 提供流畅的链式API来组装外部协作者并构建服务器选择器。

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    Capability, HandshakeRoutine, NetworkEnvironment, ObfuscationServerFactory,
    ProtocolTargetSequence, RelayProtocol, SelectorConfig, ServerListStore, SocketProtector,
};
use crate::error::{Result, SelectorError};
use crate::select::{SelectionCoordinator, ServerSelector};
use crate::utils::logger::{init_logger, LoggerConfig};

/// 选择器构造器
///
/// # 示例
///
/// ```rust,no_run
/// use relay_selector::SelectorBuilder;
/// use std::time::Duration;
///
/// # fn demo(
/// #     store: std::sync::Arc<dyn relay_selector::core::ServerListStore>,
/// #     handshake: std::sync::Arc<dyn relay_selector::core::HandshakeRoutine>,
/// #     meek: std::sync::Arc<dyn relay_selector::core::ObfuscationServerFactory>,
/// #     env: std::sync::Arc<dyn relay_selector::core::NetworkEnvironment>,
/// # ) -> relay_selector::Result<()> {
/// let selector = SelectorBuilder::new()
///     .with_store(store)
///     .with_handshake(handshake)
///     .with_obfuscation_factory(meek)
///     .with_environment(env)
///     .with_pool_size(10)
///     .with_max_round_duration(Duration::from_secs(20))
///     .with_logger(relay_selector::utils::logger::prod_config())
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SelectorBuilder {
    config: SelectorConfig,
    targets: Option<Vec<Vec<RelayProtocol>>>,
    store: Option<Arc<dyn ServerListStore>>,
    handshake: Option<Arc<dyn HandshakeRoutine>>,
    obfuscation: Option<Arc<dyn ObfuscationServerFactory>>,
    environment: Option<Arc<dyn NetworkEnvironment>>,
    protector: Option<Arc<dyn SocketProtector>>,
    logger: Option<LoggerConfig>,
}

impl SelectorBuilder {
    /// 创建新的选择器构造器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置完整配置
    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置服务器列表存储
    pub fn with_store(mut self, store: Arc<dyn ServerListStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 设置握手例程
    pub fn with_handshake(mut self, handshake: Arc<dyn HandshakeRoutine>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    /// 设置混淆子服务器工厂
    pub fn with_obfuscation_factory(mut self, factory: Arc<dyn ObfuscationServerFactory>) -> Self {
        self.obfuscation = Some(factory);
        self
    }

    /// 设置网络环境
    pub fn with_environment(mut self, environment: Arc<dyn NetworkEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// 设置VPN排除回调
    pub fn with_socket_protector(mut self, protector: Arc<dyn SocketProtector>) -> Self {
        self.protector = Some(protector);
        self
    }

    /// 构建时安装全局日志器
    pub fn with_logger(mut self, config: LoggerConfig) -> Self {
        self.logger = Some(config);
        self
    }

    /// 设置目标协议序列
    pub fn with_targets(mut self, targets: Vec<Vec<RelayProtocol>>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// 设置工作池大小
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// 设置轮询间隔
    pub fn with_poll_intervals(mut self, connect: Duration, results: Duration) -> Self {
        self.config = self.config.with_poll_intervals(connect, results);
        self
    }

    /// 设置轮次最长时长
    pub fn with_max_round_duration(mut self, duration: Duration) -> Self {
        self.config.max_round_duration = duration;
        self
    }

    /// 设置宽限期
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// 设置退避区间
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.config = self.config.with_backoff(min, max);
        self
    }

    /// 设置等待网络连通时的轮询间隔
    pub fn with_connectivity_poll_interval(mut self, interval: Duration) -> Self {
        self.config.connectivity_poll_interval = interval;
        self
    }

    /// 设置最低能力集合
    pub fn with_sufficient_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.config.sufficient_capabilities = capabilities;
        self
    }

    /// 设置洗牌种子，使选择结果可复现
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.config.shuffle_seed = Some(seed);
        self
    }

    /// 构建选择协调器
    pub fn build_coordinator(self) -> Result<SelectionCoordinator> {
        self.config.validate()?;

        let targets = match self.targets {
            Some(targets) => ProtocolTargetSequence::new(targets)?,
            None => ProtocolTargetSequence::default(),
        };
        let store = self.store.ok_or_else(|| SelectorError::config_error("server list store is required"))?;
        let handshake = self
            .handshake
            .ok_or_else(|| SelectorError::config_error("handshake routine is required"))?;
        let obfuscation = self
            .obfuscation
            .ok_or_else(|| SelectorError::config_error("obfuscation server factory is required"))?;
        let environment = self
            .environment
            .ok_or_else(|| SelectorError::config_error("network environment is required"))?;

        if let Some(config) = self.logger {
            init_logger(config).map_err(|e| SelectorError::config_error(e.to_string()))?;
        }

        let rng = match self.config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(SelectionCoordinator::new(
            self.config,
            Arc::new(targets),
            store,
            handshake,
            obfuscation,
            environment,
            self.protector,
            rng,
        ))
    }

    /// 构建服务器选择器
    pub fn build(self) -> Result<ServerSelector> {
        Ok(ServerSelector::new(self.build_coordinator()?))
    }
}
