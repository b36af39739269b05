//! 候选服务器模块
//!
//! 持久化服务器列表中的一个条目。一个轮次内视为不可变，
//! 只有获胜的工作单元写回的字段（所选协议、使用的前置域名）会在轮次结束后合并回持久条目。

use serde::{Deserialize, Serialize};

use super::protocol::{Capability, RelayProtocol};

/// 候选中继服务器
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerCandidate {
    /// 服务器地址，同时作为身份标识
    pub ip_address: String,
    /// 区域代码
    pub region: String,
    /// 能力标志
    pub capabilities: Vec<Capability>,
    /// SSH端口
    pub ssh_port: Option<u16>,
    /// 混淆SSH端口
    pub ssh_obfuscated_port: Option<u16>,
    /// 混淆SSH密钥
    pub ssh_obfuscated_key: String,
    /// HTTP混淆服务端口
    pub meek_server_port: Option<u16>,
    /// HTTP混淆密钥
    pub meek_obfuscated_key: String,
    /// HTTP混淆cookie加密公钥
    pub meek_cookie_encryption_public_key: String,
    /// 前置域名
    pub meek_fronting_domain: Option<String>,
    /// 前置Host头
    pub meek_fronting_host: Option<String>,
    /// 上次成功使用的协议（由获胜的工作单元写回）
    pub conn_type: Option<RelayProtocol>,
    /// 上次使用的前置域名（由获胜的工作单元写回）
    pub front: Option<String>,
}

impl ServerCandidate {
    /// 创建只有地址的候选服务器
    pub fn new<S: Into<String>>(ip_address: S) -> Self {
        Self {
            ip_address: ip_address.into(),
            ..Default::default()
        }
    }

    /// 设置区域
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = region.into();
        self
    }

    /// 添加能力
    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// 设置混淆SSH端口
    pub fn with_ssh_obfuscated_port(mut self, port: u16) -> Self {
        self.ssh_obfuscated_port = Some(port);
        self
    }

    /// 设置SSH端口
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = Some(port);
        self
    }

    /// 设置HTTP混淆服务端口
    pub fn with_meek_server_port(mut self, port: u16) -> Self {
        self.meek_server_port = Some(port);
        self
    }

    /// 设置前置域名和Host头
    pub fn with_fronting<D: Into<String>, H: Into<String>>(mut self, domain: D, host: H) -> Self {
        self.meek_fronting_domain = Some(domain.into());
        self.meek_fronting_host = Some(host.into());
        self
    }

    /// 是否具备某个能力
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// 是否具备给定能力中的至少一个
    pub fn has_one_of_capabilities(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|c| self.has_capability(*c))
    }

    /// 是否支持某个协议
    pub fn supports_protocol(&self, protocol: RelayProtocol) -> bool {
        if !self.has_capability(protocol.required_capability()) {
            return false;
        }
        match protocol {
            RelayProtocol::FrontedMeekOssh => self.meek_fronting_domain.is_some(),
            _ => true,
        }
    }

    /// 是否位于给定区域；空的区域过滤条件匹配所有服务器
    pub fn in_region(&self, region: Option<&str>) -> bool {
        match region {
            None | Some("") => true,
            Some(region) => self.region == region,
        }
    }

    /// 首选的可达性测试端口
    pub fn preferred_reachability_test_port(&self) -> Option<u16> {
        if self.has_capability(Capability::Ossh) {
            self.ssh_obfuscated_port
        } else if self.has_capability(Capability::Ssh) {
            self.ssh_port
        } else {
            None
        }
    }

    /// 是否与另一个候选指向同一服务器
    pub fn same_server(&self, other: &ServerCandidate) -> bool {
        self.ip_address == other.ip_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachability_port_prefers_obfuscated() {
        let candidate = ServerCandidate::new("10.0.0.1")
            .with_capability(Capability::Ssh)
            .with_capability(Capability::Ossh)
            .with_ssh_port(22)
            .with_ssh_obfuscated_port(443);
        assert_eq!(candidate.preferred_reachability_test_port(), Some(443));

        let ssh_only = ServerCandidate::new("10.0.0.2")
            .with_capability(Capability::Ssh)
            .with_ssh_port(22);
        assert_eq!(ssh_only.preferred_reachability_test_port(), Some(22));

        let meek_only = ServerCandidate::new("10.0.0.3")
            .with_capability(Capability::UnfrontedMeek)
            .with_meek_server_port(80);
        assert_eq!(meek_only.preferred_reachability_test_port(), None);
    }

    #[test]
    fn test_fronted_requires_domain() {
        let candidate = ServerCandidate::new("10.0.0.1").with_capability(Capability::FrontedMeek);
        assert!(!candidate.supports_protocol(RelayProtocol::FrontedMeekOssh));

        let candidate = candidate.with_fronting("cdn.example.com", "front.example.com");
        assert!(candidate.supports_protocol(RelayProtocol::FrontedMeekOssh));
        assert!(!candidate.supports_protocol(RelayProtocol::Ossh));
    }

    #[test]
    fn test_region_filter() {
        let candidate = ServerCandidate::new("10.0.0.1").with_region("CA");
        assert!(candidate.in_region(None));
        assert!(candidate.in_region(Some("")));
        assert!(candidate.in_region(Some("CA")));
        assert!(!candidate.in_region(Some("US")));
    }
}
