//! 轮次上下文
//!
//! 一个轮次内所有工作单元共享的只读参数，以及唯一的跨工作单元可变状态：
//! "本轮已经打印过连接类错误"标志。每个轮次创建新的上下文，标志随之重置。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    AbortSignal, HandshakeRoutine, ObfuscationServerFactory, ProtocolTargetSequence,
    ProxySettings, ServerCandidate, SessionParams, SocketProtector,
};
use crate::error::SelectorError;

/// 轮次上下文
pub struct RoundContext {
    /// 目标协议序列
    pub targets: Arc<ProtocolTargetSequence>,
    /// 握手例程
    pub handshake: Arc<dyn HandshakeRoutine>,
    /// 混淆子服务器工厂
    pub obfuscation: Arc<dyn ObfuscationServerFactory>,
    /// VPN排除回调；只在需要保护套接字时存在
    pub protector: Option<Arc<dyn SocketProtector>>,
    /// 本轮使用的上游代理
    pub proxy: Option<ProxySettings>,
    /// 会话参数
    pub session: SessionParams,
    /// 本轮的中止信号
    pub abort: AbortSignal,
    /// 连接轮询间隔
    pub poll_interval: Duration,
    printed_connect_error: AtomicBool,
}

impl RoundContext {
    /// 创建轮次上下文
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        targets: Arc<ProtocolTargetSequence>,
        handshake: Arc<dyn HandshakeRoutine>,
        obfuscation: Arc<dyn ObfuscationServerFactory>,
        protector: Option<Arc<dyn SocketProtector>>,
        proxy: Option<ProxySettings>,
        session: SessionParams,
        abort: AbortSignal,
        poll_interval: Duration,
    ) -> Self {
        Self {
            targets,
            handshake,
            obfuscation,
            protector,
            proxy,
            session,
            abort,
            poll_interval,
            printed_connect_error: AtomicBool::new(false),
        }
    }

    /// 本轮是否已经记录过连接类错误
    pub fn printed_connect_error(&self) -> bool {
        self.printed_connect_error.load(Ordering::SeqCst)
    }

    /// 记录一次失败的连接尝试
    ///
    /// 所有候选服务器共享同一个出错代理或同一条断开的路由时，
    /// 这类错误在一个轮次内只记录一次。
    pub fn report_failure(&self, candidate: &ServerCandidate, err: &SelectorError) {
        if err.is_aborted() {
            return;
        }
        let proxy_class = self.proxy.is_some() && err.is_proxy_related();
        if proxy_class || err.is_unreachable() {
            if self
                .printed_connect_error
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                if proxy_class {
                    crate::sel_error!("network proxy connect error: {}", err);
                } else {
                    crate::sel_error!("network unreachable: {}", err);
                }
            }
            return;
        }
        crate::sel_debug!("probe of {} failed: {}", candidate.ip_address, err);
    }
}
