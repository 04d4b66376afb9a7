//! 插件层模块
//!
//! 基于能力标记的插件特征、注册表、排序器和生命周期控制器

pub mod core;
pub mod extensions;
pub mod hooks;
pub mod lifecycle;
pub mod registry;
pub mod sorter;

// 重新导出核心组件
pub use self::core::*;
pub use extensions::*;
pub use hooks::{init_shape, register_shape};
pub use lifecycle::*;
pub use registry::*;
pub use sorter::*;
