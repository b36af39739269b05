//! 内存服务器列表
//!
//! [`ServerListStore`] 的参考实现。所有写操作都在同一把写锁内完成，
//! 所以移到前部的重排不会与远程刷新交错。

use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::core::{ServerCandidate, ServerListStore, SocketProtector};
use crate::error::{Result, SelectorError};

/// 远程服务器列表来源
#[async_trait]
pub trait RemoteServerListFetcher: Send + Sync {
    /// 获取远程服务器列表
    async fn fetch(&self, protector: Option<Arc<dyn SocketProtector>>) -> Result<Vec<ServerCandidate>>;
}

/// 内存中的有序服务器列表
pub struct InMemoryServerList {
    entries: RwLock<Vec<ServerCandidate>>,
    remote: Option<Arc<dyn RemoteServerListFetcher>>,
    min_refresh_interval: Duration,
    last_refresh: Mutex<Option<Instant>>,
}

impl InMemoryServerList {
    /// 用初始条目创建
    pub fn new(entries: Vec<ServerCandidate>) -> Self {
        Self {
            entries: RwLock::new(entries),
            remote: None,
            min_refresh_interval: Duration::ZERO,
            last_refresh: Mutex::new(None),
        }
    }

    /// 从JSON数组加载
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<ServerCandidate> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// 序列化为JSON数组
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.read_entries())?)
    }

    /// 设置远程来源
    pub fn with_remote(mut self, remote: Arc<dyn RemoteServerListFetcher>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// 设置两次远程获取之间的最短间隔
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<ServerCandidate>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<ServerCandidate>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// 列表是否为空
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// 按顺序列出地址
    pub fn addresses(&self) -> Vec<String> {
        self.read_entries().iter().map(|e| e.ip_address.clone()).collect()
    }

    /// 合并新条目：已知地址原地更新，未知地址追加到末尾
    pub fn merge(&self, fetched: Vec<ServerCandidate>) -> usize {
        let mut entries = self.write_entries();
        let mut added = 0;
        for candidate in fetched {
            match entries.iter_mut().find(|e| e.same_server(&candidate)) {
                Some(existing) => {
                    let conn_type = existing.conn_type;
                    let front = existing.front.clone();
                    *existing = candidate;
                    if existing.conn_type.is_none() {
                        existing.conn_type = conn_type;
                    }
                    if existing.front.is_none() {
                        existing.front = front;
                    }
                }
                None => {
                    entries.push(candidate);
                    added += 1;
                }
            }
        }
        added
    }

    fn refresh_due(&self) -> bool {
        let last = self.last_refresh.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) => at.elapsed() >= self.min_refresh_interval,
            None => true,
        }
    }
}

#[async_trait]
impl ServerListStore for InMemoryServerList {
    fn candidates(&self) -> Vec<ServerCandidate> {
        self.read_entries().clone()
    }

    fn move_to_front(&self, winners: &[ServerCandidate]) -> Result<()> {
        let mut entries = self.write_entries();
        let mut front = Vec::with_capacity(winners.len());

        for winner in winners {
            if front.iter().any(|e: &ServerCandidate| e.same_server(winner)) {
                continue;
            }
            if let Some(index) = entries.iter().position(|e| e.same_server(winner)) {
                let mut entry = entries.remove(index);
                if winner.conn_type.is_some() {
                    entry.conn_type = winner.conn_type;
                }
                if winner.front.is_some() {
                    entry.front = winner.front.clone();
                }
                front.push(entry);
            }
        }

        front.append(&mut *entries);
        *entries = front;
        Ok(())
    }

    async fn refresh_from_remote(&self, protector: Option<Arc<dyn SocketProtector>>) -> Result<()> {
        let remote = match &self.remote {
            Some(remote) => remote.clone(),
            None => return Ok(()),
        };
        if !self.refresh_due() {
            crate::sel_debug!("remote server list fetched recently, skipping");
            return Ok(());
        }

        let fetched = remote
            .fetch(protector)
            .await
            .map_err(|e| SelectorError::remote_fetch(e.to_string()))?;
        let added = self.merge(fetched);
        *self.last_refresh.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        crate::sel_info!("remote server list fetched, {} new entries", added);
        Ok(())
    }
}
