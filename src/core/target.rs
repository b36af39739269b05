//! 目标协议序列模块
//!
//! 维护一组按顺序排列的协议偏好集合，任一时刻只有一个集合是"当前"的。
//! 一个轮次没有产生可用连接时前进到下一个集合，以放宽或收窄下一轮的协议搜索范围。

use std::sync::{Mutex, MutexGuard};

use super::candidate::ServerCandidate;
use super::protocol::RelayProtocol;
use crate::error::{Result, SelectorError};

/// 目标协议序列
#[derive(Debug)]
pub struct ProtocolTargetSequence {
    targets: Vec<Vec<RelayProtocol>>,
    current: Mutex<usize>,
}

impl ProtocolTargetSequence {
    /// 用给定的协议集合列表创建序列
    ///
    /// 列表和其中的每个集合都不能为空。
    pub fn new(targets: Vec<Vec<RelayProtocol>>) -> Result<Self> {
        if targets.is_empty() {
            return Err(SelectorError::config_error("protocol target list is empty"));
        }
        if let Some(index) = targets.iter().position(|set| set.is_empty()) {
            return Err(SelectorError::config_error(format!(
                "protocol target set {} is empty",
                index
            )));
        }
        Ok(Self {
            targets,
            current: Mutex::new(0),
        })
    }

    fn current_index_guard(&self) -> MutexGuard<'_, usize> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 为候选服务器选择协议
    ///
    /// 按声明顺序扫描当前集合，返回候选服务器支持的第一个协议。
    pub fn select_protocol(&self, candidate: &ServerCandidate) -> Option<RelayProtocol> {
        let current = self.current_index_guard();
        self.targets[*current]
            .iter()
            .copied()
            .find(|protocol| candidate.supports_protocol(*protocol))
    }

    /// 前进到下一个协议集合，到末尾后回绕
    pub fn advance(&self) {
        let mut current = self.current_index_guard();
        *current = (*current + 1) % self.targets.len();
        crate::sel_warn!("rotating target protocol state to {}", self.label_at(*current));
    }

    /// 当前集合的诊断字符串
    pub fn current_label(&self) -> String {
        let current = self.current_index_guard();
        self.label_at(*current)
    }

    fn label_at(&self, index: usize) -> String {
        self.targets[index]
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 当前集合的下标
    pub fn current_index(&self) -> usize {
        *self.current_index_guard()
    }

    /// 当前集合
    pub fn current_target(&self) -> Vec<RelayProtocol> {
        let current = self.current_index_guard();
        self.targets[*current].clone()
    }

    /// 集合数量
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// 序列是否为空（构造时已保证非空）
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for ProtocolTargetSequence {
    /// 默认序列：先尝试全部三种协议，然后依次只尝试单一协议
    fn default() -> Self {
        Self {
            targets: vec![
                RelayProtocol::all(),
                vec![RelayProtocol::Ossh],
                vec![RelayProtocol::UnfrontedMeekOssh],
                vec![RelayProtocol::FrontedMeekOssh],
            ],
            current: Mutex::new(0),
        }
    }
}
