//! Pluggable 核心数据类型
//!
//! 插件身份、事件名称等在各层之间共享的基础类型

/// 插件唯一标识符
pub type PluginId = String;

/// 插件注册事件
pub const E_REGISTER: &str = "register";
/// 插件初始化事件（钩子前后各触发一次）
pub const E_INIT: &str = "init";
/// 插件初始化完成事件
pub const E_INIT_DONE: &str = "initDone";
/// 全部插件初始化完成之后的事件
pub const E_POST_INIT: &str = "postInit";
/// 扩展晚于初始化加入时，为每个已有插件补发的事件
pub const E_PLUGIN_REGISTER: &str = "pluginRegister";

/// 进程级总线上镜像插件事件时使用的前缀
pub const PLUGIN_EVENT_PREFIX: &str = "plugin:";

/// 通配订阅，接收总线上触发的所有事件
pub const E_ALL: &str = "*";

/// 由实现类型推导的插件ID
pub fn plugin_id_of<T: ?Sized>() -> PluginId {
    std::any::type_name::<T>().to_string()
}

/// 带名称区分符的插件ID，同一实现类型的多个实例以此共存
pub fn named_plugin_id<T: ?Sized>(name: &str) -> PluginId {
    compose_id(std::any::type_name::<T>(), Some(name))
}

/// 组合类型名和可选区分符
pub(crate) fn compose_id(type_name: &str, name: Option<&str>) -> PluginId {
    match name {
        Some(name) => format!("{}#{}", type_name, name),
        None => type_name.to_string(),
    }
}

/// 插件事件在进程级总线上的镜像名称
pub fn plugin_event_name(name: &str) -> String {
    format!("{}{}", PLUGIN_EVENT_PREFIX, name)
}

/// 类型名去掉最后一段即为模块路径
pub(crate) fn module_path_of(type_name: &str) -> String {
    // 泛型参数里也可能出现 "::"，只看尖括号之前的部分
    let base = type_name.split('<').next().unwrap_or(type_name);
    match base.rfind("::") {
        Some(pos) => base[..pos].to_string(),
        None => String::new(),
    }
}
