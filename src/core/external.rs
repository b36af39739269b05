//! 外部协作者接口
//!
//! 选择引擎只依赖这些接口：持久化服务器列表、隧道握手例程、本地混淆子服务器、
//! 网络环境与代理配置、VPN排除回调。具体实现由宿主程序提供。

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::net::{TcpSocket, TcpStream};

use super::abort::AbortSignal;
use super::candidate::ServerCandidate;
use crate::error::Result;

/// 持久化的有序服务器列表
#[async_trait]
pub trait ServerListStore: Send + Sync {
    /// 当前有序的候选服务器快照
    fn candidates(&self) -> Vec<ServerCandidate>;

    /// 把给定服务器按顺序移到列表前部，其余条目保持相对顺序
    fn move_to_front(&self, winners: &[ServerCandidate]) -> Result<()>;

    /// 从远程源刷新列表
    async fn refresh_from_remote(&self, protector: Option<Arc<dyn SocketProtector>>) -> Result<()>;
}

/// 已建立的隧道连接句柄
pub trait TunnelConnection: Send + fmt::Debug {
    /// 关闭连接；重复调用必须无副作用
    fn close(&mut self);
}

/// 隧道握手例程
#[async_trait]
pub trait HandshakeRoutine: Send + Sync {
    /// 在已连接的套接字上建立隧道连接
    async fn establish(
        &self,
        abort: &AbortSignal,
        socket: &mut TcpStream,
        candidate: &ServerCandidate,
        session: &SessionParams,
    ) -> Result<Box<dyn TunnelConnection>>;
}

/// 本地混淆子服务器
#[async_trait]
pub trait ObfuscationServer: Send + fmt::Debug {
    /// 启动本地回环服务器，返回系统分配的端口
    async fn start(&mut self) -> Result<u16>;

    /// 停止服务器；重复调用必须无副作用
    fn stop(&mut self);
}

/// 混淆子服务器的出站方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObfuscationDial {
    /// 直接连接候选服务器
    Direct {
        /// 服务器地址
        host: String,
        /// HTTP混淆服务端口
        port: u16,
    },
    /// 经由第三方前置域名
    Fronted {
        /// 前置域名（TLS SNI）
        domain: String,
        /// HTTP Host头
        host: String,
    },
}

/// 创建混淆子服务器所需的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationTarget {
    /// 中继地址 `ip:port`
    pub relay_address: String,
    /// cookie加密公钥
    pub cookie_encryption_public_key: String,
    /// 混淆密钥
    pub obfuscated_key: String,
    /// 出站方式
    pub dial: ObfuscationDial,
    /// 会话ID
    pub session_id: String,
}

/// 混淆子服务器工厂
pub trait ObfuscationServerFactory: Send + Sync {
    /// 创建一个尚未启动的子服务器
    fn create(
        &self,
        target: ObfuscationTarget,
        protector: Option<Arc<dyn SocketProtector>>,
    ) -> Box<dyn ObfuscationServer>;
}

/// VPN排除回调，只用于直连协议
pub trait SocketProtector: Send + Sync {
    /// 将套接字排除在VPN接口之外
    fn protect(&self, socket: &TcpSocket) -> io::Result<()>;
}

/// 上游HTTP代理凭据
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// 上游HTTP代理设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// 代理主机
    pub host: String,
    /// 代理端口
    pub port: u16,
    /// 凭据
    pub credentials: Option<ProxyCredentials>,
}

impl ProxySettings {
    /// 创建无凭据的代理设置
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// 设置凭据
    pub fn with_credentials<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

/// 网络环境与配置提供者
pub trait NetworkEnvironment: Send + Sync {
    /// 当前配置的上游HTTP代理
    fn proxy_settings(&self) -> Option<ProxySettings>;

    /// 当前的出口区域过滤条件
    fn egress_region(&self) -> Option<String>;

    /// 是否有网络连接
    fn has_network_connectivity(&self) -> bool;

    /// 让DNS解析器与当前网络接口同步
    fn refresh_dns_resolvers(&self);
}

/// 会话参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    /// 客户端会话ID
    pub session_id: String,
    /// 附加认证参数
    pub extra_auth_params: Vec<(String, String)>,
}

impl SessionParams {
    /// 使用给定会话ID创建
    pub fn new<S: Into<String>>(session_id: S) -> Self {
        Self {
            session_id: session_id.into(),
            extra_auth_params: Vec::new(),
        }
    }

    /// 生成随机会话ID
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    /// 添加认证参数
    pub fn with_auth_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.extra_auth_params.push((key.into(), value.into()));
        self
    }
}
