//! 协议定义模块
//!
//! 定义中继服务器支持的传输协议和能力标志。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SelectorError;

/// 中继传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelayProtocol {
    /// 混淆SSH，直接TCP连接
    #[serde(rename = "OSSH")]
    Ossh,
    /// 非前置的HTTP混淆传输承载的混淆SSH
    #[serde(rename = "UNFRONTED-MEEK-OSSH")]
    UnfrontedMeekOssh,
    /// 域前置的HTTP混淆传输承载的混淆SSH
    #[serde(rename = "FRONTED-MEEK-OSSH")]
    FrontedMeekOssh,
}

impl RelayProtocol {
    /// 协议名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ossh => "OSSH",
            Self::UnfrontedMeekOssh => "UNFRONTED-MEEK-OSSH",
            Self::FrontedMeekOssh => "FRONTED-MEEK-OSSH",
        }
    }

    /// 是否经由本地混淆子服务器
    pub fn uses_obfuscation_server(&self) -> bool {
        matches!(self, Self::UnfrontedMeekOssh | Self::FrontedMeekOssh)
    }

    /// 服务器需要具备的能力
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::Ossh => Capability::Ossh,
            Self::UnfrontedMeekOssh => Capability::UnfrontedMeek,
            Self::FrontedMeekOssh => Capability::FrontedMeek,
        }
    }

    /// 按默认优先级排列的所有协议
    pub fn all() -> Vec<RelayProtocol> {
        vec![Self::Ossh, Self::UnfrontedMeekOssh, Self::FrontedMeekOssh]
    }
}

impl fmt::Display for RelayProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayProtocol {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OSSH" => Ok(Self::Ossh),
            "UNFRONTED-MEEK-OSSH" => Ok(Self::UnfrontedMeekOssh),
            "FRONTED-MEEK-OSSH" => Ok(Self::FrontedMeekOssh),
            other => Err(SelectorError::config_error(format!(
                "unknown relay protocol: {}",
                other
            ))),
        }
    }
}

/// 服务器能力标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// 握手接口
    #[serde(rename = "handshake")]
    Handshake,
    /// VPN
    #[serde(rename = "VPN")]
    Vpn,
    /// 普通SSH
    #[serde(rename = "SSH")]
    Ssh,
    /// 混淆SSH
    #[serde(rename = "OSSH")]
    Ossh,
    /// 域前置HTTP混淆
    #[serde(rename = "FRONTED-MEEK")]
    FrontedMeek,
    /// 非前置HTTP混淆
    #[serde(rename = "UNFRONTED-MEEK")]
    UnfrontedMeek,
}

impl Capability {
    /// 足以建立隧道的能力集合
    pub fn sufficient_for_tunnel() -> Vec<Capability> {
        vec![Self::Ossh, Self::Ssh, Self::FrontedMeek, Self::UnfrontedMeek]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Vpn => "VPN",
            Self::Ssh => "SSH",
            Self::Ossh => "OSSH",
            Self::FrontedMeek => "FRONTED-MEEK",
            Self::UnfrontedMeek => "UNFRONTED-MEEK",
        };
        f.write_str(name)
    }
}
