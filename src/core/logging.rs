//! 日志系统
//!
//! 进程级日志订阅器的初始化，以及每个插件独立的日志句柄。

use crate::config::LoggingConfig;
use std::fmt::Display;
use std::sync::Arc;
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
///
/// `RUST_LOG` 优先于配置中的级别。已经安装过订阅器时返回 `false`。
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose)
        .try_init()
        .is_ok()
}

/// 插件日志句柄
///
/// 每条日志都在以插件ID命名的 span 内输出。由插件记录惰性创建，
/// 同一插件身份只会有一个实例。
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: Arc<str>,
    span: Span,
}

impl PluginLogger {
    pub fn new(plugin_id: &str) -> Self {
        Self {
            plugin: Arc::from(plugin_id),
            span: tracing::info_span!("plugin", id = %plugin_id),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn trace(&self, message: impl Display) {
        let _entered = self.span.enter();
        tracing::trace!("{}", message);
    }

    pub fn debug(&self, message: impl Display) {
        let _entered = self.span.enter();
        tracing::debug!("{}", message);
    }

    pub fn info(&self, message: impl Display) {
        let _entered = self.span.enter();
        tracing::info!("{}", message);
    }

    pub fn warn(&self, message: impl Display) {
        let _entered = self.span.enter();
        tracing::warn!("{}", message);
    }

    pub fn error(&self, message: impl Display) {
        let _entered = self.span.enter();
        tracing::error!("{}", message);
    }
}
