//! HTTP CONNECT代理隧道
//!
//! 在已连接到上游代理的流上发送CONNECT请求，读取响应头直到空行，
//! 不会读取响应头之后的任何字节。

use base64::Engine;
use bytes::BytesMut;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::ProxyCredentials;
use crate::error::{Result, SelectorError};

/// 响应头的最大长度
const MAX_RESPONSE_HEADER_BYTES: usize = 8 * 1024;

/// 构造CONNECT请求
pub fn build_connect_request(host: &str, port: u16, credentials: Option<&ProxyCredentials>) -> String {
    let target = format!("{}:{}", host, port);
    let mut req = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(credentials) = credentials {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", credentials.username, credentials.password));
        req.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
    }
    req.push_str("\r\n");
    req
}

/// 解析响应状态行
pub fn parse_status_line(line: &str) -> Result<StatusCode> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(SelectorError::proxy_tunnel(format!(
            "malformed proxy response: {}",
            line.trim()
        )));
    }
    let code = parts.next().unwrap_or_default();
    StatusCode::from_bytes(code.as_bytes()).map_err(|_| {
        SelectorError::proxy_tunnel(format!("malformed proxy status: {}", line.trim()))
    })
}

/// 通过上游代理建立到目标的隧道
pub async fn tunnel<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    credentials: Option<&ProxyCredentials>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_connect_request(host, port, credentials);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| SelectorError::proxy_tunnel(format!("write CONNECT: {}", e)))?;

    let head = read_response_head(stream).await?;
    let text = String::from_utf8_lossy(&head);
    let status_line = text.lines().next().unwrap_or_default();
    let status = parse_status_line(status_line)?;
    if !status.is_success() {
        return Err(SelectorError::proxy_tunnel(format!(
            "proxy refused CONNECT to {}:{}: {}",
            host,
            port,
            status_line.trim()
        )));
    }
    Ok(())
}

async fn read_response_head<S>(stream: &mut S) -> Result<BytesMut>
where
    S: AsyncRead + Unpin,
{
    let mut head = BytesMut::with_capacity(512);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEADER_BYTES {
            return Err(SelectorError::proxy_tunnel("proxy response header too large"));
        }
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| SelectorError::proxy_tunnel(format!("read CONNECT response: {}", e)))?;
        if n == 0 {
            return Err(SelectorError::proxy_tunnel(
                "proxy closed connection before completing response",
            ));
        }
        head.extend_from_slice(&byte);
    }
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_with_credentials() {
        let credentials = ProxyCredentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let req = build_connect_request("10.0.0.1", 443, Some(&credentials));
        assert!(req.starts_with("CONNECT 10.0.0.1:443 HTTP/1.1\r\n"));
        assert!(req.contains("Host: 10.0.0.1:443\r\n"));
        assert!(req.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_connect_request_without_credentials() {
        let req = build_connect_request("relay.example", 22, None);
        assert_eq!(req, "CONNECT relay.example:22 HTTP/1.1\r\nHost: relay.example:22\r\n\r\n");
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(
            parse_status_line("HTTP/1.1 200 Connection established").unwrap(),
            StatusCode::OK
        );
        assert_eq!(
            parse_status_line("HTTP/1.0 407 Proxy Authentication Required").unwrap(),
            StatusCode::PROXY_AUTHENTICATION_REQUIRED
        );
        assert!(parse_status_line("SSH-2.0-OpenSSH").is_err());
        assert!(parse_status_line("HTTP/1.1 abc").is_err());
    }

    #[tokio::test]
    async fn test_tunnel_accepts_200_and_leaves_payload() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let n = server.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("CONNECT 10.0.0.9:443"));
            server
                .write_all(b"HTTP/1.1 200 Connection established\r\nVia: test\r\n\r\nSSH-2.0")
                .await
                .unwrap();
            server
        });

        tunnel(&mut client, "10.0.0.9", 443, None).await.unwrap();
        let mut rest = [0u8; 7];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"SSH-2.0");
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_tunnel_rejects_non_success() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let _ = server.read(&mut buf).await;
            let _ = server
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await;
        });

        let err = tunnel(&mut client, "10.0.0.9", 443, None).await.unwrap_err();
        assert!(matches!(err, SelectorError::ProxyTunnel { .. }));
        assert!(err.to_string().contains("407"));
    }
}
