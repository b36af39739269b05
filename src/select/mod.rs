//! 选择模块
//!
//! 有界工作池、单轮选择协调器以及外层重试循环。

pub mod coordinator;
pub mod pool;
pub mod run_loop;

pub use coordinator::{RunRequest, SelectionCoordinator};
pub use pool::WorkerPool;
pub use run_loop::ServerSelector;
