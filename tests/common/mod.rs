//! 集成测试共用的模拟协作者

#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use relay_selector::core::{
    Capability, HandshakeRoutine, NetworkEnvironment, ObfuscationServer,
    ObfuscationServerFactory, ObfuscationTarget, ProxySettings, SessionParams, SocketProtector,
    TunnelConnection,
};
use relay_selector::store::RemoteServerListFetcher;
use relay_selector::{
    AbortSignal, InMemoryServerList, Result, SelectorBuilder, SelectorError, ServerCandidate,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// 打开/关闭计数
#[derive(Debug, Default)]
pub struct Tracker {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl Tracker {
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockConnection {
    address: String,
    tracker: Arc<Tracker>,
    closed: bool,
}

impl MockConnection {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl TunnelConnection for MockConnection {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 握手行为
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed(Duration),
    Fail,
    Hang,
    Panic,
}

pub struct MockHandshake {
    behaviors: Mutex<HashMap<String, Behavior>>,
    pub tracker: Arc<Tracker>,
    pub sessions: Mutex<Vec<String>>,
}

impl MockHandshake {
    pub fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            tracker: Arc::new(Tracker::default()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, address: &str, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(address.to_string(), behavior);
    }
}

#[async_trait]
impl HandshakeRoutine for MockHandshake {
    async fn establish(
        &self,
        _abort: &AbortSignal,
        _socket: &mut TcpStream,
        candidate: &ServerCandidate,
        session: &SessionParams,
    ) -> Result<Box<dyn TunnelConnection>> {
        self.sessions.lock().unwrap().push(session.session_id.clone());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&candidate.ip_address)
            .copied()
            .unwrap_or(Behavior::Succeed(Duration::ZERO));
        match behavior {
            Behavior::Succeed(delay) => {
                tokio::time::sleep(delay).await;
                self.tracker.opened.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockConnection {
                    address: candidate.ip_address.clone(),
                    tracker: self.tracker.clone(),
                    closed: false,
                }))
            }
            Behavior::Fail => Err(SelectorError::handshake_failed("server rejected credentials")),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("handshake blew up"),
        }
    }
}

/// 本地混淆子服务器：绑定回环端口并接受连接
#[derive(Debug)]
pub struct MockObfuscationServer {
    listener_task: Option<tokio::task::JoinHandle<()>>,
    tracker: Arc<Tracker>,
    stopped: bool,
}

#[async_trait]
impl ObfuscationServer for MockObfuscationServer {
    async fn start(&mut self) -> Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        self.listener_task = Some(tokio::spawn(hold_connections(listener)));
        self.stopped = false;
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        Ok(port)
    }

    fn stop(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        if !self.stopped {
            self.stopped = true;
            self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct MockObfuscationFactory {
    pub tracker: Arc<Tracker>,
    pub targets: Mutex<Vec<ObfuscationTarget>>,
    pub created: AtomicUsize,
}

impl ObfuscationServerFactory for MockObfuscationFactory {
    fn create(
        &self,
        target: ObfuscationTarget,
        _protector: Option<Arc<dyn SocketProtector>>,
    ) -> Box<dyn ObfuscationServer> {
        self.targets.lock().unwrap().push(target);
        self.created.fetch_add(1, Ordering::SeqCst);
        // 只有start成功后才计入打开
        Box::new(MockObfuscationServer {
            listener_task: None,
            tracker: self.tracker.clone(),
            stopped: true,
        })
    }
}

pub struct MockEnvironment {
    pub proxy: Mutex<Option<ProxySettings>>,
    pub region: Mutex<Option<String>>,
    pub connected: AtomicBool,
    pub dns_refreshes: AtomicUsize,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            proxy: Mutex::new(None),
            region: Mutex::new(None),
            connected: AtomicBool::new(true),
            dns_refreshes: AtomicUsize::new(0),
        }
    }
}

impl NetworkEnvironment for MockEnvironment {
    fn proxy_settings(&self) -> Option<ProxySettings> {
        self.proxy.lock().unwrap().clone()
    }

    fn egress_region(&self) -> Option<String> {
        self.region.lock().unwrap().clone()
    }

    fn has_network_connectivity(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn refresh_dns_resolvers(&self) {
        self.dns_refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CountingProtector {
    pub protected: AtomicUsize,
}

impl SocketProtector for CountingProtector {
    fn protect(&self, _socket: &TcpSocket) -> std::io::Result<()> {
        self.protected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn hold_connections(listener: TcpListener) {
    let mut held = Vec::new();
    while let Ok((stream, _)) = listener.accept().await {
        held.push(stream);
    }
}

/// 每个中继地址上仍由客户端保持打开的连接数
static RELAY_SOCKETS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn adjust_relay_sockets(ip: &str, opened: bool) {
    let mut sockets = RELAY_SOCKETS.lock().unwrap();
    let count = sockets.entry(ip.to_string()).or_insert(0);
    if opened {
        *count += 1;
    } else {
        *count -= 1;
    }
}

pub fn relay_sockets(ip: &str) -> usize {
    RELAY_SOCKETS.lock().unwrap().get(ip).copied().unwrap_or(0)
}

/// 接受连接并在客户端关闭前一直计数
async fn track_connections(listener: TcpListener, ip: String) {
    while let Ok((mut stream, _)) = listener.accept().await {
        adjust_relay_sockets(&ip, true);
        let ip = ip.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            adjust_relay_sockets(&ip, false);
        });
    }
}

/// 在给定回环地址上启动一个接受并保持连接的服务器，返回端口
pub async fn spawn_relay(ip: &str) -> u16 {
    let listener = TcpListener::bind((ip, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(track_connections(listener, ip.to_string()));
    port
}

/// 返回一个没有监听者的端口
pub async fn closed_port(ip: &str) -> u16 {
    let listener = TcpListener::bind((ip, 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

/// 模拟HTTP CONNECT代理，记录收到的请求目标
pub async fn spawn_connect_proxy() -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 1024];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf[read..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => read += n,
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            if let Some(target) = request.split_whitespace().nth(1) {
                seen_clone.lock().unwrap().push(target.to_string());
            }
            let _ = stream
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await;
            held.push(stream);
        }
    });
    (port, seen)
}

/// 直连候选服务器
pub fn ossh_candidate(ip: &str, port: u16) -> ServerCandidate {
    ServerCandidate::new(ip)
        .with_capability(Capability::Ossh)
        .with_ssh_obfuscated_port(port)
}

/// 混淆协议候选服务器
pub fn meek_candidate(ip: &str, port: u16) -> ServerCandidate {
    ServerCandidate::new(ip)
        .with_capability(Capability::Ossh)
        .with_capability(Capability::UnfrontedMeek)
        .with_capability(Capability::FrontedMeek)
        .with_ssh_obfuscated_port(port)
        .with_meek_server_port(8080)
        .with_fronting("cdn.example.com", "relay.example.com")
}

/// 第一次获取失败，之后返回固定条目
pub struct FlakyFetcher {
    pub entries: Vec<ServerCandidate>,
    pub calls: AtomicUsize,
}

impl FlakyFetcher {
    pub fn new(entries: Vec<ServerCandidate>) -> Self {
        Self {
            entries,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteServerListFetcher for FlakyFetcher {
    async fn fetch(&self, _protector: Option<Arc<dyn SocketProtector>>) -> Result<Vec<ServerCandidate>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SelectorError::internal_error("remote list unavailable"));
        }
        Ok(self.entries.clone())
    }
}

pub struct Harness {
    pub store: Arc<InMemoryServerList>,
    pub handshake: Arc<MockHandshake>,
    pub obfuscation: Arc<MockObfuscationFactory>,
    pub environment: Arc<MockEnvironment>,
    pub protector: Arc<CountingProtector>,
}

impl Harness {
    pub fn new(candidates: Vec<ServerCandidate>) -> Self {
        Self::with_store(InMemoryServerList::new(candidates))
    }

    pub fn with_store(store: InMemoryServerList) -> Self {
        Self {
            store: Arc::new(store),
            handshake: Arc::new(MockHandshake::new()),
            obfuscation: Arc::new(MockObfuscationFactory::default()),
            environment: Arc::new(MockEnvironment::new()),
            protector: Arc::new(CountingProtector::default()),
        }
    }

    /// 使用短轮询间隔的构造器
    pub fn builder(&self) -> SelectorBuilder {
        SelectorBuilder::new()
            .with_store(self.store.clone())
            .with_handshake(self.handshake.clone())
            .with_obfuscation_factory(self.obfuscation.clone())
            .with_environment(self.environment.clone())
            .with_socket_protector(self.protector.clone())
            .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(20))
            .with_shutdown_grace(Duration::from_millis(300))
            .with_max_round_duration(Duration::from_secs(3))
            .with_backoff(Duration::from_millis(10), Duration::from_millis(20))
    }

    /// 所有仍然打开的连接和子服务器
    pub fn open_resources(&self) -> usize {
        self.handshake.tracker.open_count() + self.obfuscation.tracker.open_count()
    }

    /// 列表中各中继上仍然打开的套接字
    pub fn open_sockets(&self) -> usize {
        self.store.addresses().iter().map(|ip| relay_sockets(ip)).sum()
    }

    /// 等待中继一侧观察到的打开套接字数达到 `expected`，超时后返回最后的计数
    pub async fn settled_sockets(&self, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let open = self.open_sockets();
            if open == expected || Instant::now() >= deadline {
                return open;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
