//! 日志模块
//!
//! 封装rat_logger日志库，提供统一的日志接口和配置。
//! 在调用 [`init_logger`] 之前，所有日志宏都保持静默。

use once_cell::sync::OnceCell;

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 是否启用日志
    pub enabled: bool,
    /// 日志级别
    pub level: LogLevel,
    /// 输出目标
    pub target: LogTarget,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// 错误
    Error,
    /// 警告
    Warn,
    /// 信息
    Info,
    /// 调试
    Debug,
    /// 跟踪
    Trace,
}

/// 日志输出目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// 终端输出
    Terminal,
    /// 无输出（仅做级别过滤，由宿主程序自行安装后端）
    None,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            target: LogTarget::Terminal,
        }
    }
}

impl From<LogLevel> for rat_logger::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => rat_logger::LevelFilter::Error,
            LogLevel::Warn => rat_logger::LevelFilter::Warn,
            LogLevel::Info => rat_logger::LevelFilter::Info,
            LogLevel::Debug => rat_logger::LevelFilter::Debug,
            LogLevel::Trace => rat_logger::LevelFilter::Trace,
        }
    }
}

/// 日志器
#[derive(Debug)]
pub struct Logger {
    config: LoggerConfig,
}

impl Logger {
    /// 创建新的日志器
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    /// 初始化日志后端
    pub fn init(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.config.enabled || self.config.target == LogTarget::None {
            return Ok(());
        }

        rat_logger::LoggerBuilder::new()
            .with_level(self.config.level.into())
            .add_terminal_with_config(rat_logger::handler::term::TermConfig::default())
            .init_global_logger()
            .map_err(|e| format!("failed to initialize logger: {:?}", e))?;

        Ok(())
    }

    /// 获取配置
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// 检查是否启用了指定级别的日志
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.config.enabled && level <= self.config.level
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}

/// 全局日志器实例
static GLOBAL_LOGGER: OnceCell<Logger> = OnceCell::new();

/// 初始化全局日志器
///
/// 只有第一次调用生效，之后的调用直接返回。
pub fn init_logger(config: LoggerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if GLOBAL_LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = Logger::new(config);
    logger.init()?;
    let _ = GLOBAL_LOGGER.set(logger);
    Ok(())
}

/// 获取全局日志器
pub fn get_logger() -> Option<&'static Logger> {
    GLOBAL_LOGGER.get()
}

/// 检查全局日志器是否启用了指定级别
pub fn enabled(level: LogLevel) -> bool {
    get_logger().map_or(false, |logger| logger.is_enabled(level))
}

/// 错误日志
#[macro_export]
macro_rules! sel_error {
    ($($arg:tt)*) => {
        if $crate::utils::logger::enabled($crate::utils::logger::LogLevel::Error) {
            $crate::utils::logger::backend::error!($($arg)*);
        }
    };
}

/// 警告日志
#[macro_export]
macro_rules! sel_warn {
    ($($arg:tt)*) => {
        if $crate::utils::logger::enabled($crate::utils::logger::LogLevel::Warn) {
            $crate::utils::logger::backend::warn!($($arg)*);
        }
    };
}

/// 信息日志
#[macro_export]
macro_rules! sel_info {
    ($($arg:tt)*) => {
        if $crate::utils::logger::enabled($crate::utils::logger::LogLevel::Info) {
            $crate::utils::logger::backend::info!($($arg)*);
        }
    };
}

/// 调试日志
#[macro_export]
macro_rules! sel_debug {
    ($($arg:tt)*) => {
        if $crate::utils::logger::enabled($crate::utils::logger::LogLevel::Debug) {
            $crate::utils::logger::backend::debug!($($arg)*);
        }
    };
}

/// 跟踪日志
#[macro_export]
macro_rules! sel_trace {
    ($($arg:tt)*) => {
        if $crate::utils::logger::enabled($crate::utils::logger::LogLevel::Trace) {
            $crate::utils::logger::backend::trace!($($arg)*);
        }
    };
}

/// 日志后端，供宏内部使用
#[doc(hidden)]
pub mod backend {
    pub use rat_logger::{debug, error, info, trace, warn};
}

/// 构建器模式的日志配置
#[derive(Debug)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 创建新的配置构建器
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    /// 设置是否启用日志
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// 设置日志级别
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// 设置输出目标
    pub fn target(mut self, target: LogTarget) -> Self {
        self.config.target = target;
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }

    /// 构建并初始化日志器
    pub fn init(self) -> Result<(), Box<dyn std::error::Error>> {
        init_logger(self.config)
    }
}

impl Default for LoggerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 创建禁用日志的配置
pub fn disabled_config() -> LoggerConfig {
    LoggerConfig {
        enabled: false,
        ..Default::default()
    }
}

/// 创建开发环境的日志配置
pub fn dev_config() -> LoggerConfig {
    LoggerConfigBuilder::new()
        .level(LogLevel::Debug)
        .target(LogTarget::Terminal)
        .build()
}

/// 创建生产环境的日志配置
pub fn prod_config() -> LoggerConfig {
    LoggerConfigBuilder::new()
        .level(LogLevel::Info)
        .target(LogTarget::Terminal)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        let logger = Logger::new(dev_config());
        assert!(logger.is_enabled(LogLevel::Error));
        assert!(logger.is_enabled(LogLevel::Debug));
        assert!(!logger.is_enabled(LogLevel::Trace));

        let logger = Logger::new(disabled_config());
        assert!(!logger.is_enabled(LogLevel::Error));
    }

    #[test]
    fn test_builder_presets() {
        let config = prod_config();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.target, LogTarget::Terminal);
        assert!(config.enabled);
    }

    #[test]
    fn test_init_terminal_logger() {
        assert!(init_logger(prod_config()).is_ok());
        assert!(enabled(LogLevel::Info));
        assert!(!enabled(LogLevel::Debug));

        // 再次初始化不会替换已安装的日志器
        assert!(init_logger(dev_config()).is_ok());
        assert!(!enabled(LogLevel::Debug));
    }
}
