//! Pluggable 错误处理系统
//!
//! 统一的错误类型和错误处理机制。跨越插件边界的错误都会被逐层包装，
//! 调用方看到的是 插件 → 阶段/事件 → 根因 的完整链条。

use crate::types::PluginId;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use thiserror::Error;

/// 框架统一错误类型
///
/// 错误需要同时存放在事件的错误槽里并返回给调用方，因此实现了 `Clone`；
/// 不可克隆的底层错误放在 `Arc` 中共享。
#[derive(Error, Debug, Clone)]
pub enum PluggableError {
    #[error("Option {key:?}, required by {required_by}, does not have a provider")]
    UnresolvedOption { key: String, required_by: PluginId },

    #[error("Required option {key:?}, provided by {provider}, is not set")]
    MissingOption { key: String, provider: PluginId },

    #[error("Dependency cycle detected among plugins: {}", nodes.join(", "))]
    CycleDetected { nodes: Vec<PluginId> },

    #[error("Plugin {reference:?} not registered (referenced by {declared_by})")]
    UnknownOrderReference { reference: String, declared_by: PluginId },

    #[error("Registration is closed while the controller is {state}")]
    RegistrationClosed { state: String },

    #[error("Cannot run {operation} while the controller is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Plugins have not been initialized")]
    NotInitialized,

    #[error("Plugin {plugin:?}: {source}")]
    InPlugin {
        plugin: PluginId,
        source: Box<PluggableError>,
    },

    #[error("{phase}: {source}")]
    Hook {
        phase: &'static str,
        source: Box<PluggableError>,
    },

    #[error("Trigger {event:?}: {source}")]
    Trigger {
        event: String,
        source: Box<PluggableError>,
    },

    #[error("Extension {name:?}: {source}")]
    Extension {
        name: String,
        source: Box<PluggableError>,
    },

    #[error("{0}")]
    Failure(Arc<anyhow::Error>),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl PluggableError {
    /// 创建插件钩子失败错误
    pub fn failure(message: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::Failure(Arc::new(anyhow::Error::msg(message)))
    }

    /// 创建配置相关错误
    pub fn config(message: &str) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    /// 以插件身份包装
    pub fn in_plugin(self, plugin: impl Into<PluginId>) -> Self {
        Self::InPlugin {
            plugin: plugin.into(),
            source: Box::new(self),
        }
    }

    /// 以生命周期阶段包装
    pub fn in_hook(self, phase: &'static str) -> Self {
        Self::Hook {
            phase,
            source: Box::new(self),
        }
    }

    /// 以事件名称包装
    pub fn in_trigger(self, event: impl Into<String>) -> Self {
        Self::Trigger {
            event: event.into(),
            source: Box::new(self),
        }
    }

    /// 以扩展名称包装
    pub fn in_extension(self, name: impl Into<String>) -> Self {
        Self::Extension {
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// 沿包装链找到根因
    pub fn root(&self) -> &PluggableError {
        match self {
            Self::InPlugin { source, .. }
            | Self::Hook { source, .. }
            | Self::Trigger { source, .. }
            | Self::Extension { source, .. } => source.root(),
            other => other,
        }
    }

    /// 包装链上出现过的插件ID，由外向内
    pub fn plugin_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self;
        loop {
            match current {
                Self::InPlugin { plugin, source } => {
                    chain.push(plugin.as_str());
                    current = &**source;
                }
                Self::Hook { source, .. }
                | Self::Trigger { source, .. }
                | Self::Extension { source, .. } => current = &**source,
                _ => return chain,
            }
        }
    }
}

impl From<anyhow::Error> for PluggableError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failure(Arc::new(error))
    }
}

impl From<std::io::Error> for PluggableError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PluggableError>;
