//! 插件系统核心特征定义
//!
//! 插件按能力而不是按类型层级区分：每个插件声明一组能力标记，
//! 调度器在每个生命周期阶段检查标记，只调用插件声明过的钩子。
//! 未声明的钩子即使有实现也不会被调用。

use crate::core::{EventDispatcher, Options, PluginLogger};
use crate::plugins::registry::PluginHandle;
use crate::types::{compose_id, PluginId};
use crate::Result;
use bitflags::bitflags;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;

bitflags! {
    /// 插件能力标记 - 封闭的可选操作集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// 注册通知，无参数
        const REGISTER = 1 << 0;
        /// 注册通知，参数为自身记录的句柄
        const REGISTER_WITH_RECORD = 1 << 1;
        /// 注册通知，参数为全局选项存储
        const REGISTER_WITH_OPTIONS = 1 << 2;
        /// 命名实例，名称作为身份区分符
        const NAMED = 1 << 3;
        /// 提供选项（声明键列表，并在提供阶段写入）
        const PROVIDES_OPTIONS = 1 << 4;
        /// 依赖选项
        const REQUIRES_OPTIONS = 1 << 5;
        /// 显式声明排在某些插件之前
        const BEFORE = 1 << 6;
        /// 显式声明排在某些插件之后
        const AFTER = 1 << 7;
        /// 初始化：无参数
        const INIT = 1 << 8;
        /// 初始化：返回错误
        const INIT_FALLIBLE = 1 << 9;
        /// 初始化：参数为选项
        const INIT_WITH_OPTIONS = 1 << 10;
        /// 初始化：参数为选项并返回错误
        const INIT_FALLIBLE_WITH_OPTIONS = 1 << 11;
        /// 接收日志句柄
        const LOGGER = 1 << 12;
        /// 接收选项存储
        const OPTIONS_STORE = 1 << 13;
        /// 接收自身记录的句柄
        const PLUGIN_ACCESS = 1 << 14;
        /// 拥有自己的事件总线
        const DISPATCHER = 1 << 15;
        /// 自定义资源命名空间
        const NAMESPACE = 1 << 16;
        /// 资源根目录
        const ASSETS_ROOT = 1 << 17;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::empty()
    }
}

/// 类型擦除转换，所有 `'static` 类型自动实现
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 核心插件特征
///
/// 只有 [`Plugin::capabilities`] 必须实现。其余方法都有空的默认实现，
/// 插件按需覆盖，并在能力标记中声明对应的位。
pub trait Plugin: AsAny + Send + Sync {
    /// 插件声明的能力
    fn capabilities(&self) -> Capabilities;

    /// 实现类型的完整名称，身份推导的基础
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 实例名称（`NAMED`）
    fn name(&self) -> String {
        String::new()
    }

    /// 注册通知（`REGISTER`）
    fn on_register(&mut self) {}

    /// 注册通知（`REGISTER_WITH_RECORD`）
    fn on_register_record(&mut self, _plugin: &PluginHandle) {}

    /// 注册通知（`REGISTER_WITH_OPTIONS`）
    fn on_register_options(&mut self, _options: &mut Options) {}

    /// 本插件提供的选项键（`PROVIDES_OPTIONS`）
    fn provides_options(&self) -> Vec<String> {
        Vec::new()
    }

    /// 把提供的选项写入存储（`PROVIDES_OPTIONS`）
    fn provide_options(&mut self, _options: &mut Options) -> Result<()> {
        Ok(())
    }

    /// 本插件依赖的选项键（`REQUIRES_OPTIONS`）
    fn requires_options(&self) -> Vec<String> {
        Vec::new()
    }

    /// 本插件必须排在这些插件之前（`BEFORE`）
    fn before(&self) -> Vec<OrderRef> {
        Vec::new()
    }

    /// 本插件必须排在这些插件之后（`AFTER`）
    fn after(&self) -> Vec<OrderRef> {
        Vec::new()
    }

    fn init(&mut self) {}

    fn try_init(&mut self) -> Result<()> {
        Ok(())
    }

    fn init_with_options(&mut self, _options: &Options) {}

    fn try_init_with_options(&mut self, _options: &Options) -> Result<()> {
        Ok(())
    }

    fn set_logger(&mut self, _logger: PluginLogger) {}

    /// 选项存储（`OPTIONS_STORE`）。值以 `Arc` 共享，需要保留时克隆即可。
    fn set_options(&mut self, _options: &Options) {}

    fn set_plugin(&mut self, _plugin: PluginHandle) {}

    /// 插件自己的事件总线（`DISPATCHER`）
    fn dispatcher(&self) -> Option<&EventDispatcher> {
        None
    }

    fn dispatcher_mut(&mut self) -> Option<&mut EventDispatcher> {
        None
    }

    fn namespace(&self) -> Option<String> {
        None
    }

    fn assets_root(&self) -> Option<PathBuf> {
        None
    }
}

/// 推导插件实例的身份
pub fn identity_of(plugin: &dyn Plugin) -> PluginId {
    if plugin.capabilities().contains(Capabilities::NAMED) {
        compose_id(plugin.type_name(), Some(&plugin.name()))
    } else {
        compose_id(plugin.type_name(), None)
    }
}

/// 排序声明中对另一个插件的引用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderRef {
    /// 字面ID
    Id(PluginId),
    /// 由实现类型（和可选名称）推导
    Type {
        type_name: &'static str,
        name: Option<String>,
    },
}

impl OrderRef {
    pub fn id(id: impl Into<PluginId>) -> Self {
        OrderRef::Id(id.into())
    }

    pub fn of<T: ?Sized>() -> Self {
        OrderRef::Type {
            type_name: std::any::type_name::<T>(),
            name: None,
        }
    }

    pub fn named<T: ?Sized>(name: impl Into<String>) -> Self {
        OrderRef::Type {
            type_name: std::any::type_name::<T>(),
            name: Some(name.into()),
        }
    }

    /// 引用某个实例的完整身份
    pub fn instance(plugin: &dyn Plugin) -> Self {
        OrderRef::Id(identity_of(plugin))
    }

    /// 解析为插件ID
    pub fn resolve(&self) -> PluginId {
        match self {
            OrderRef::Id(id) => id.clone(),
            OrderRef::Type { type_name, name } => compose_id(type_name, name.as_deref()),
        }
    }
}

impl From<&str> for OrderRef {
    fn from(id: &str) -> Self {
        OrderRef::Id(id.to_string())
    }
}

impl From<String> for OrderRef {
    fn from(id: String) -> Self {
        OrderRef::Id(id)
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{named_plugin_id, plugin_id_of};

    struct Bare;

    impl Plugin for Bare {
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }
    }

    struct Tenant {
        name: &'static str,
    }

    impl Plugin for Tenant {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NAMED
        }

        fn name(&self) -> String {
            self.name.to_string()
        }
    }

    /// 实现了 name 但没有声明 NAMED
    struct Undeclared;

    impl Plugin for Undeclared {
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }

        fn name(&self) -> String {
            "ignored".to_string()
        }
    }

    #[test]
    fn test_identity_from_type_name() {
        let plugin = Bare;
        assert_eq!(identity_of(&plugin), plugin_id_of::<Bare>());
    }

    #[test]
    fn test_identity_with_discriminator() {
        let eu = Tenant { name: "eu" };
        let us = Tenant { name: "us" };
        assert_eq!(identity_of(&eu), named_plugin_id::<Tenant>("eu"));
        assert_ne!(identity_of(&eu), identity_of(&us));
    }

    #[test]
    fn test_undeclared_capability_is_ignored() {
        assert_eq!(identity_of(&Undeclared), plugin_id_of::<Undeclared>());
    }

    #[test]
    fn test_order_ref_resolution() {
        assert_eq!(OrderRef::of::<Bare>().resolve(), plugin_id_of::<Bare>());
        assert_eq!(
            OrderRef::named::<Tenant>("eu").resolve(),
            named_plugin_id::<Tenant>("eu")
        );
        assert_eq!(
            OrderRef::instance(&Tenant { name: "us" }),
            OrderRef::Id(named_plugin_id::<Tenant>("us"))
        );
        assert_eq!(OrderRef::from("x::Y").resolve(), "x::Y");
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let boxed: Box<dyn Plugin> = Box::new(Tenant { name: "eu" });
        let any = AsAny::as_any(&*boxed);
        assert_eq!(any.downcast_ref::<Tenant>().map(|t| t.name), Some("eu"));
    }
}
