//! # relay_selector: 多协议中继服务器探测与选择引擎
//!
//! 给定一组候选中继服务器（每个可经由一种或多种传输协议到达），在有界工作池上并行发起连接尝试，
//! 在时间压力下收集早到的结果，选出一个获胜服务器并把它已经建立好的连接交给隧道层。
//!
//! ## 特性
//!
//! - **有界并发**: 固定大小的工作池，逐轮派发
//! - **提前退出**: 一旦有服务器响应即停止等待
//! - **协议回退**: 失败后轮换目标协议集合
//! - **持久重排**: 把响应者移到持久列表前部，并保持原首项的粘性
//! - **确定性清理**: 一轮结束后最多只保留获胜者的连接
//!
//! ## 快速开始
//!
//! 实现 [`core::external`] 中的协作者接口，用 [`SelectorBuilder`] 组装选择器，
//! 然后调用 [`ServerSelector::run`]。

#![deny(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// 核心模块
pub mod core;
pub mod error;

// 工具模块
pub mod utils;

// 功能模块
pub mod probe;
pub mod select;
pub mod store;

// 构造器
pub mod builder;

// 重新导出核心类型
pub use crate::core::{
    AbortSignal, Capability, ProtocolTargetSequence, RelayProtocol, SelectionStats,
    SelectorConfig, ServerCandidate, SessionParams,
};
pub use crate::builder::SelectorBuilder;
pub use crate::error::{Result, SelectorError};
pub use crate::probe::SelectedServer;
pub use crate::select::{RunRequest, ServerSelector};
pub use crate::store::InMemoryServerList;

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 库描述
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
