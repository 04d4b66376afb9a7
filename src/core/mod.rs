//! 核心基础层模块
//!
//! 提供框架的核心基础设施：选项存储、依赖图、事件总线和日志

pub mod event_bus;
pub mod graph;
pub mod logging;
pub mod options;

// 重新导出核心组件
pub use event_bus::*;
pub use graph::*;
pub use logging::*;
pub use options::*;
