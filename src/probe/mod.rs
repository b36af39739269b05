//! 探测模块
//!
//! 单个候选服务器的连接尝试：代理隧道、传输连接器和工作单元。

pub mod connector;
pub mod context;
pub mod proxy;
pub mod worker;

pub use connector::TransportConnector;
pub use context::RoundContext;
pub use worker::{ProbeOutcome, ProbeResources, ProbeWorker, SelectedServer};
