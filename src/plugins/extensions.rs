//! 控制器扩展
//!
//! 扩展是挂在控制器上的协作者，不参与排序。它们在初始化开始时被初始化，
//! 可以订阅进程级总线、读写选项存储，并为每个已注册插件收到一次
//! `pluginRegister` 事件。

use super::registry::Registry;
use crate::core::{Event, EventDispatcher, Options};
use crate::types::{E_PLUGIN_REGISTER, E_REGISTER};
use crate::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// 扩展初始化时可以访问的控制器部件
pub struct ExtensionContext<'a> {
    pub events: &'a mut EventDispatcher,
    pub options: &'a mut Options,
    pub registry: &'a Registry,
}

/// 控制器扩展
pub trait Extension: Send + Sync {
    /// 用于错误包装和日志
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn init(&mut self, context: &mut ExtensionContext<'_>) -> Result<()>;

    /// 扩展自己的事件总线，接收 `pluginRegister`
    fn dispatcher(&self) -> Option<&EventDispatcher> {
        None
    }
}

/// 资源目录登记
///
/// 插件注册时，若声明的资源根目录存在，按命名空间记录下来。
/// 登记表可以克隆，克隆之间共享同一份数据。
#[derive(Debug, Clone)]
pub struct AssetPaths {
    roots: Arc<Mutex<BTreeMap<String, PathBuf>>>,
    bus: EventDispatcher,
}

impl AssetPaths {
    pub fn new() -> Self {
        let roots = Arc::new(Mutex::new(BTreeMap::new()));
        let mut bus = EventDispatcher::new();
        let shared = roots.clone();
        bus.on(E_PLUGIN_REGISTER, move |e| {
            Self::record(&shared, e);
            Ok(())
        });
        Self { roots, bus }
    }

    /// 命名空间 -> 资源根目录
    pub fn roots(&self) -> BTreeMap<String, PathBuf> {
        self.roots.lock().clone()
    }

    pub fn get(&self, namespace: &str) -> Option<PathBuf> {
        self.roots.lock().get(namespace).cloned()
    }

    fn record(roots: &Mutex<BTreeMap<String, PathBuf>>, event: &Event<'_>) {
        let Some(plugin) = event.plugin() else {
            return;
        };
        let Some(root) = plugin.assets_root.as_ref() else {
            return;
        };
        if !root.is_dir() {
            debug!("Assets root {} of {} does not exist", root.display(), plugin.id);
            return;
        }

        debug!("Assets of {} registered at {}", plugin.namespace, root.display());
        roots.lock().insert(plugin.namespace.clone(), root.clone());
    }
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for AssetPaths {
    fn name(&self) -> &str {
        "AssetPaths"
    }

    fn init(&mut self, context: &mut ExtensionContext<'_>) -> Result<()> {
        let roots = self.roots.clone();
        context.events.on_plugin(E_REGISTER, move |e| {
            Self::record(&roots, e);
            Ok(())
        });
        Ok(())
    }

    fn dispatcher(&self) -> Option<&EventDispatcher> {
        Some(&self.bus)
    }
}
