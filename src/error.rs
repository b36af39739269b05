//! 错误处理模块
//!
//! 定义服务器选择引擎中使用的所有错误类型。
//!
//! 单次连接尝试的错误（解析、代理、连接、握手）只在工作单元内部记录，
//! 从不越过工作单元向上传播；轮次级别的失败由外层循环通过协议轮换和退避恢复。

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// 选择器的结果类型
pub type Result<T> = std::result::Result<T, SelectorError>;

/// 选择器错误类型
#[derive(Error, Debug)]
pub enum SelectorError {
    /// 地址解析失败
    #[error("Cannot resolve network address for {host}:{port}")]
    Resolution {
        /// 主机名
        host: String,
        /// 端口
        port: u16,
    },

    /// HTTP代理隧道建立失败
    #[error("Proxy tunnel failed: {message}")]
    ProxyTunnel {
        /// 错误消息
        message: String,
    },

    /// 套接字连接失败
    #[error("Connect to {addr} failed: {source}")]
    Connect {
        /// 目标地址
        addr: SocketAddr,
        /// 底层错误
        #[source]
        source: io::Error,
    },

    /// 隧道握手失败
    #[error("Handshake failed: {message}")]
    Handshake {
        /// 错误消息
        message: String,
    },

    /// 本地混淆子服务器错误
    #[error("Obfuscation server error: {message}")]
    ObfuscationServer {
        /// 错误消息
        message: String,
    },

    /// 候选服务器不支持当前目标中的任何协议
    #[error("No target protocol supported by {address}")]
    NoProtocol {
        /// 服务器地址
        address: String,
    },

    /// 候选服务器没有可用的可达性测试端口
    #[error("No reachability test port for {address}")]
    NoReachabilityPort {
        /// 服务器地址
        address: String,
    },

    /// 操作被中止
    #[error("Operation aborted")]
    Aborted,

    /// 服务器列表存储错误
    #[error("Server list store error: {message}")]
    Store {
        /// 错误消息
        message: String,
    },

    /// 远程服务器列表获取失败
    #[error("Remote server list fetch failed: {message}")]
    RemoteFetch {
        /// 错误消息
        message: String,
    },

    /// 配置错误
    #[error("Configuration error: {message}")]
    ConfigError {
        /// 错误消息
        message: String,
    },

    /// I/O错误
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// 内部错误
    #[error("Internal error: {message}")]
    InternalError {
        /// 错误消息
        message: String,
    },
}

impl SelectorError {
    /// 创建地址解析错误
    pub fn resolution<S: Into<String>>(host: S, port: u16) -> Self {
        Self::Resolution {
            host: host.into(),
            port,
        }
    }

    /// 创建代理隧道错误
    pub fn proxy_tunnel<S: Into<String>>(message: S) -> Self {
        Self::ProxyTunnel {
            message: message.into(),
        }
    }

    /// 创建连接失败错误
    pub fn connect_failed(addr: SocketAddr, source: io::Error) -> Self {
        Self::Connect { addr, source }
    }

    /// 创建握手失败错误
    pub fn handshake_failed<S: Into<String>>(message: S) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// 创建混淆子服务器错误
    pub fn obfuscation_server<S: Into<String>>(message: S) -> Self {
        Self::ObfuscationServer {
            message: message.into(),
        }
    }

    /// 创建存储错误
    pub fn store_error<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// 创建远程获取错误
    pub fn remote_fetch<S: Into<String>>(message: S) -> Self {
        Self::RemoteFetch {
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// 检查是否为可恢复错误
    ///
    /// 可恢复错误只影响单个工作单元，轮次会继续进行。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. }
                | Self::ProxyTunnel { .. }
                | Self::Connect { .. }
                | Self::Handshake { .. }
                | Self::ObfuscationServer { .. }
                | Self::NoProtocol { .. }
                | Self::NoReachabilityPort { .. }
                | Self::Aborted
                | Self::IoError(_)
        )
    }

    /// 检查是否为中止
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// 检查是否为"网络不可达"类连接错误
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Connect { source, .. } | Self::IoError(source) => matches!(
                source.kind(),
                io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable
            ),
            _ => false,
        }
    }

    /// 检查是否属于代理相关的错误类别
    ///
    /// 所有候选服务器共享同一个出错的代理时，这类错误在每个轮次只记录一次。
    pub fn is_proxy_related(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. } | Self::ProxyTunnel { .. } | Self::Connect { .. }
        )
    }

    /// 检查是否为配置相关错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// 获取错误代码
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Resolution { .. } => 2001,
            Self::ProxyTunnel { .. } => 2002,
            Self::Connect { .. } => 2003,
            Self::Handshake { .. } => 2004,
            Self::ObfuscationServer { .. } => 2005,
            Self::NoProtocol { .. } => 2006,
            Self::NoReachabilityPort { .. } => 2007,
            Self::Aborted => 2008,
            Self::Store { .. } => 2009,
            Self::RemoteFetch { .. } => 2010,
            Self::ConfigError { .. } => 2011,
            Self::IoError(_) => 2012,
            Self::InternalError { .. } => 2999,
        }
    }
}

/// 从anyhow::Error转换
impl From<anyhow::Error> for SelectorError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_error(err.to_string())
    }
}

/// 从serde_json::Error转换
impl From<serde_json::Error> for SelectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::store_error(format!("JSON error: {}", err))
    }
}
