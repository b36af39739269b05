//! 探测工作单元
//!
//! 把一次传输连接尝试包装成一个并发工作单元，记录结果、耗时和持有的资源。
//! 结果以 [`ProbeOutcome`] 值的形式返回给协调器，而不是共享的可变状态。

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::connector::TransportConnector;
use super::context::RoundContext;
use crate::core::{ObfuscationServer, RelayProtocol, ServerCandidate, TunnelConnection};
use crate::error::SelectorError;

/// 工作单元持有的资源
///
/// 析构时按握手连接、混淆子服务器、套接字的顺序全部关闭。
/// 获胜者的资源在转移所有权前被逐一取出，因此不会被关闭。
#[derive(Debug, Default)]
pub struct ProbeResources {
    pub(crate) socket: Option<TcpStream>,
    pub(crate) obfuscation: Option<Box<dyn ObfuscationServer>>,
    pub(crate) connection: Option<Box<dyn TunnelConnection>>,
    pub(crate) used_proxy: bool,
}

impl ProbeResources {
    /// 关闭所有资源；重复调用无副作用
    pub fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        if let Some(mut server) = self.obfuscation.take() {
            server.stop();
        }
        self.socket.take();
    }

    /// 是否还持有任何资源
    pub fn is_open(&self) -> bool {
        self.socket.is_some() || self.obfuscation.is_some() || self.connection.is_some()
    }
}

impl Drop for ProbeResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// 一次探测的结果
#[derive(Debug)]
pub struct ProbeOutcome {
    /// 派发顺序
    pub dispatch_index: usize,
    /// 候选服务器（带有工作单元写回的字段）
    pub candidate: ServerCandidate,
    /// 使用的协议
    pub protocol: Option<RelayProtocol>,
    /// 是否成功建立了隧道连接
    pub responded: bool,
    /// 从派发到完成的耗时
    pub elapsed: Duration,
    /// 错误消息
    pub error: Option<String>,
    resources: ProbeResources,
}

impl ProbeOutcome {
    /// 未响应的结果，不持有资源
    pub fn failed(
        dispatch_index: usize,
        candidate: ServerCandidate,
        protocol: Option<RelayProtocol>,
        elapsed: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            dispatch_index,
            candidate,
            protocol,
            responded: false,
            elapsed,
            error: Some(error.into()),
            resources: ProbeResources::default(),
        }
    }

    /// 是否还持有打开的资源
    pub fn holds_resources(&self) -> bool {
        self.resources.is_open()
    }

    /// 结果是否经由上游代理
    pub fn used_proxy(&self) -> bool {
        self.resources.used_proxy
    }

    /// 关闭结果持有的全部资源
    pub fn release(&mut self) {
        self.resources.release();
    }

    /// 把资源所有权转移给调用方
    ///
    /// 只有已响应的结果才能转移；否则返回 `None` 且资源被关闭。
    pub fn into_selected(mut self) -> Option<SelectedServer> {
        if !self.responded {
            return None;
        }
        let protocol = self.protocol?;
        let socket = self.resources.socket.take()?;
        let connection = self.resources.connection.take()?;
        Some(SelectedServer {
            candidate: self.candidate.clone(),
            protocol,
            socket,
            connection,
            obfuscation_server: self.resources.obfuscation.take(),
            used_proxy: self.resources.used_proxy,
            response_time: self.elapsed,
        })
    }
}

/// 获胜的服务器及其仍然存活的连接
#[derive(Debug)]
pub struct SelectedServer {
    /// 获胜的候选服务器
    pub candidate: ServerCandidate,
    /// 使用的协议
    pub protocol: RelayProtocol,
    /// 已连接的套接字
    pub socket: TcpStream,
    /// 已建立的隧道连接
    pub connection: Box<dyn TunnelConnection>,
    /// 混淆协议使用的本地子服务器
    pub obfuscation_server: Option<Box<dyn ObfuscationServer>>,
    /// 是否经由上游HTTP代理
    pub used_proxy: bool,
    /// 响应时间
    pub response_time: Duration,
}

impl SelectedServer {
    /// 服务器地址
    pub fn address(&self) -> &str {
        &self.candidate.ip_address
    }

    /// 关闭连接、子服务器和套接字
    pub fn close(mut self) {
        self.connection.close();
        if let Some(server) = self.obfuscation_server.as_mut() {
            server.stop();
        }
    }
}

/// 探测工作单元
pub struct ProbeWorker {
    dispatch_index: usize,
    candidate: ServerCandidate,
    ctx: Arc<RoundContext>,
}

impl ProbeWorker {
    /// 创建工作单元
    pub fn new(dispatch_index: usize, candidate: ServerCandidate, ctx: Arc<RoundContext>) -> Self {
        Self {
            dispatch_index,
            candidate,
            ctx,
        }
    }

    /// 派发顺序
    pub fn dispatch_index(&self) -> usize {
        self.dispatch_index
    }

    /// 候选服务器
    pub fn candidate(&self) -> &ServerCandidate {
        &self.candidate
    }

    /// 执行探测
    ///
    /// 每个工作单元恰好产生一个结果。可恢复的错误被吞下并记录为未响应，
    /// 此时资源已经关闭。
    pub async fn run(self) -> ProbeOutcome {
        let start = Instant::now();
        let ProbeWorker {
            dispatch_index,
            mut candidate,
            ctx,
        } = self;

        // 协调器已经过滤过，这里仍然容忍没有可用协议的情况
        let protocol = match ctx.targets.select_protocol(&candidate) {
            Some(protocol) => protocol,
            None => {
                let err = SelectorError::NoProtocol {
                    address: candidate.ip_address.clone(),
                };
                return ProbeOutcome::failed(dispatch_index, candidate, None, start.elapsed(), err.to_string());
            }
        };
        candidate.conn_type = Some(protocol);

        let mut resources = ProbeResources::default();
        let connector = TransportConnector::new(ctx.clone());
        let error = match connector.connect(&mut candidate, protocol, &mut resources).await {
            Ok(()) => None,
            Err(err) => {
                ctx.report_failure(&candidate, &err);
                Some(err.to_string())
            }
        };

        let responded = error.is_none() && resources.connection.is_some();
        if !responded {
            resources.release();
        }

        ProbeOutcome {
            dispatch_index,
            candidate,
            protocol: Some(protocol),
            responded,
            elapsed: start.elapsed(),
            error,
            resources,
        }
    }
}
