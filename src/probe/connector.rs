//! 传输连接器
//!
//! 为一个候选服务器和一个协议建立底层连接，然后调用外部握手例程。
//! 所有等待都以固定的短间隔轮询中止标志，中止时立即退出而不完成连接。
//!
//! 连接器从不自己关闭资源：它把每个已获得的资源立即放进调用方持有的
//! [`ProbeResources`]，失败、中止或任务被取消时由其析构统一释放。

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpSocket, TcpStream};

use super::context::RoundContext;
use super::proxy;
use super::worker::ProbeResources;
use crate::core::{ObfuscationDial, ObfuscationTarget, RelayProtocol, ServerCandidate};
use crate::error::{Result, SelectorError};

/// 传输连接器
pub struct TransportConnector {
    ctx: Arc<RoundContext>,
}

impl TransportConnector {
    /// 创建连接器
    pub fn new(ctx: Arc<RoundContext>) -> Self {
        Self { ctx }
    }

    /// 建立连接并完成握手
    ///
    /// 成功时 `resources` 持有套接字、握手连接以及（对于混淆协议）本地子服务器。
    /// 候选服务器上会写回所用的前置域名。
    pub async fn connect(
        &self,
        candidate: &mut ServerCandidate,
        protocol: RelayProtocol,
        resources: &mut ProbeResources,
    ) -> Result<()> {
        let stream = match protocol {
            RelayProtocol::Ossh => self.connect_direct(candidate, resources).await?,
            RelayProtocol::UnfrontedMeekOssh | RelayProtocol::FrontedMeekOssh => {
                self.connect_via_obfuscation(candidate, protocol, resources).await?
            }
        };

        let socket = resources.socket.insert(stream);
        let candidate: &ServerCandidate = candidate;
        let connection = self
            .until_aborted(self.ctx.handshake.establish(
                &self.ctx.abort,
                socket,
                candidate,
                &self.ctx.session,
            ))
            .await?;
        resources.connection = Some(connection);
        Ok(())
    }

    async fn connect_direct(
        &self,
        candidate: &ServerCandidate,
        resources: &mut ProbeResources,
    ) -> Result<TcpStream> {
        let port = reachability_port(candidate)?;

        match &self.ctx.proxy {
            Some(proxy_settings) => {
                resources.used_proxy = true;
                let addr = self.resolve(&proxy_settings.host, proxy_settings.port).await?;
                let mut stream = self.open_socket(addr, true).await?;
                self.until_aborted(proxy::tunnel(
                    &mut stream,
                    &candidate.ip_address,
                    port,
                    proxy_settings.credentials.as_ref(),
                ))
                .await?;
                Ok(stream)
            }
            None => {
                let addr = self.resolve(&candidate.ip_address, port).await?;
                self.open_socket(addr, true).await
            }
        }
    }

    async fn connect_via_obfuscation(
        &self,
        candidate: &mut ServerCandidate,
        protocol: RelayProtocol,
        resources: &mut ProbeResources,
    ) -> Result<TcpStream> {
        let port = reachability_port(candidate)?;

        let dial = if protocol == RelayProtocol::FrontedMeekOssh {
            let domain = candidate
                .meek_fronting_domain
                .clone()
                .ok_or_else(|| SelectorError::NoProtocol {
                    address: candidate.ip_address.clone(),
                })?;
            let host = candidate
                .meek_fronting_host
                .clone()
                .unwrap_or_else(|| domain.clone());
            ObfuscationDial::Fronted { domain, host }
        } else {
            let meek_port = candidate
                .meek_server_port
                .ok_or_else(|| SelectorError::NoReachabilityPort {
                    address: candidate.ip_address.clone(),
                })?;
            ObfuscationDial::Direct {
                host: candidate.ip_address.clone(),
                port: meek_port,
            }
        };

        let target = ObfuscationTarget {
            relay_address: format!("{}:{}", candidate.ip_address, port),
            cookie_encryption_public_key: candidate.meek_cookie_encryption_public_key.clone(),
            obfuscated_key: candidate.meek_obfuscated_key.clone(),
            dial,
            session_id: self.ctx.session.session_id.clone(),
        };

        let server = resources
            .obfuscation
            .insert(self.ctx.obfuscation.create(target, self.ctx.protector.clone()));
        let local_port = self.until_aborted(server.start()).await?;

        // 回环连接不能排除在VPN之外
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, local_port));
        let stream = self.open_socket(addr, false).await?;

        if protocol == RelayProtocol::FrontedMeekOssh {
            candidate.front = candidate.meek_fronting_domain.clone();
        }
        Ok(stream)
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let lookup = async {
            tokio::net::lookup_host((host, port))
                .await
                .map_err(|_| SelectorError::resolution(host, port))?
                .next()
                .ok_or_else(|| SelectorError::resolution(host, port))
        };
        self.until_aborted(lookup).await
    }

    async fn open_socket(&self, addr: SocketAddr, protect: bool) -> Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if protect {
            if let Some(protector) = &self.ctx.protector {
                protector.protect(&socket)?;
            }
        }
        let connect = async move {
            socket
                .connect(addr)
                .await
                .map_err(|e| SelectorError::connect_failed(addr, e))
        };
        self.until_aborted(connect).await
    }

    /// 驱动 `fut` 直到完成，每个轮询间隔检查一次中止标志
    async fn until_aborted<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::pin!(fut);
        loop {
            if self.ctx.abort.is_aborted() {
                return Err(SelectorError::Aborted);
            }
            if let Ok(result) = tokio::time::timeout(self.ctx.poll_interval, &mut fut).await {
                return result;
            }
        }
    }
}

fn reachability_port(candidate: &ServerCandidate) -> Result<u16> {
    candidate
        .preferred_reachability_test_port()
        .ok_or_else(|| SelectorError::NoReachabilityPort {
            address: candidate.ip_address.clone(),
        })
}
