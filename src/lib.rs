//! Pluggable - 基于能力的插件装配框架
//!
//! 宿主提供插件实例，框架为每个实例分配稳定身份，根据显式的先后声明和
//! 选项提供者/使用者关系构建依赖图，做稳定拓扑排序，然后驱动多阶段的
//! 初始化流水线，并在每个阶段通知进程级总线和插件自己的总线。
//!
//! # 架构分层
//!
//! - **插件层**: 能力标记、注册表、排序器、钩子调度、生命周期控制器、扩展
//! - **核心基础层**: 选项存储、依赖图、分层事件总线、日志
//!
//! # 流水线
//!
//! 注册 → 排序 → 提供选项 → 初始化 → 初始化之后

pub mod config;
pub mod core;
pub mod error;
pub mod plugins;
pub mod types;

// 重新导出核心类型
pub use self::core::*;
pub use config::{ConfigManager, ControllerConfig, LogLevel, LoggingConfig};
pub use error::*;
pub use plugins::*;
pub use types::*;

/// 框架信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FRAMEWORK_NAME: &str = "Pluggable";

/// 快速启动函数：安装日志订阅器
pub fn initialize(config: &LoggingConfig) -> Result<()> {
    if !init_logging(config) {
        tracing::debug!("Logging subscriber already installed");
    }

    tracing::info!("Initializing {} v{}", FRAMEWORK_NAME, VERSION);
    Ok(())
}
