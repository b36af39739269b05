//! 轮次统计

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use super::protocol::RelayProtocol;

/// 单个轮次的摘要
#[derive(Debug, Clone)]
pub struct RoundSummary {
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 派发的工作单元数
    pub dispatched: usize,
    /// 在轮次结束前完成的工作单元数
    pub completed: usize,
    /// 成功响应的工作单元数
    pub responded: usize,
    /// 获胜服务器地址
    pub winner: Option<String>,
    /// 获胜协议
    pub winner_protocol: Option<RelayProtocol>,
    /// 获胜者的响应时间
    pub winner_response_time: Option<Duration>,
    /// 轮次耗时
    pub duration: Duration,
    /// 是否因调用方中止而结束
    pub aborted: bool,
}

impl RoundSummary {
    /// 创建刚开始的轮次摘要
    pub fn started() -> Self {
        Self {
            started_at: Utc::now(),
            dispatched: 0,
            completed: 0,
            responded: 0,
            winner: None,
            winner_protocol: None,
            winner_response_time: None,
            duration: Duration::ZERO,
            aborted: false,
        }
    }

    /// 轮次是否选出了获胜者
    pub fn succeeded(&self) -> bool {
        self.winner.is_some()
    }
}

/// 选择统计
#[derive(Debug, Clone, Default)]
pub struct SelectionStats {
    /// 总轮次
    pub total_rounds: u64,
    /// 成功轮次
    pub successful_rounds: u64,
    /// 失败轮次
    pub failed_rounds: u64,
    /// 派发的工作单元总数
    pub probes_dispatched: u64,
    /// 响应的工作单元总数
    pub probes_responded: u64,
    /// 获胜者平均响应时间
    pub avg_winner_response_time: Duration,
    /// 各协议获胜次数
    pub protocol_wins: HashMap<RelayProtocol, u64>,
    /// 最近一个轮次
    pub last_round: Option<RoundSummary>,
}

impl SelectionStats {
    /// 创建新的统计信息
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个轮次
    pub fn record_round(&mut self, summary: &RoundSummary) {
        self.total_rounds += 1;
        self.probes_dispatched += summary.dispatched as u64;
        self.probes_responded += summary.responded as u64;

        if summary.succeeded() {
            self.successful_rounds += 1;
            if let Some(protocol) = summary.winner_protocol {
                *self.protocol_wins.entry(protocol).or_insert(0) += 1;
            }
            if let Some(elapsed) = summary.winner_response_time {
                self.update_avg_time(elapsed);
            }
        } else {
            self.failed_rounds += 1;
        }

        self.last_round = Some(summary.clone());
    }

    /// 获取成功率
    pub fn success_rate(&self) -> f64 {
        if self.total_rounds == 0 {
            0.0
        } else {
            self.successful_rounds as f64 / self.total_rounds as f64
        }
    }

    /// 获取最常获胜的协议
    pub fn most_common_protocol(&self) -> Option<RelayProtocol> {
        self.protocol_wins
            .iter()
            .max_by_key(|(protocol, count)| (**count, std::cmp::Reverse(**protocol)))
            .map(|(protocol, _)| *protocol)
    }

    fn update_avg_time(&mut self, new_duration: Duration) {
        if self.successful_rounds == 1 {
            self.avg_winner_response_time = new_duration;
        } else {
            let total_nanos = self.avg_winner_response_time.as_nanos()
                * (self.successful_rounds - 1) as u128
                + new_duration.as_nanos();
            self.avg_winner_response_time =
                Duration::from_nanos((total_nanos / self.successful_rounds as u128) as u64);
        }
    }
}
