//! 核心抽象模块
//!
//! 包含数据模型、目标协议序列、中止信号和外部协作者接口。

pub mod abort;
pub mod candidate;
pub mod config;
pub mod external;
pub mod protocol;
pub mod stats;
pub mod target;

pub use abort::AbortSignal;
pub use candidate::ServerCandidate;
pub use config::SelectorConfig;
pub use external::{
    HandshakeRoutine, NetworkEnvironment, ObfuscationDial, ObfuscationServer,
    ObfuscationServerFactory, ObfuscationTarget, ProxyCredentials, ProxySettings,
    ServerListStore, SessionParams, SocketProtector, TunnelConnection,
};
pub use protocol::{Capability, RelayProtocol};
pub use stats::{RoundSummary, SelectionStats};
pub use target::ProtocolTargetSequence;
