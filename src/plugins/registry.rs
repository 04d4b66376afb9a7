//! 插件注册表
//!
//! 记录按注册顺序存放在数组里（arena），身份到下标的映射保证唯一性。
//! 顺序序列在排序完成后整体替换，不会部分更新。

use super::core::{identity_of, AsAny, Capabilities, Plugin};
use crate::core::{EventDispatcher, PluginLogger};
use crate::types::{module_path_of, PluginId};
use crate::{PluggableError, Result};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// 插件的静态信息
///
/// 注册时确定，之后不再变化。事件通过 `Arc` 携带它，不需要借用记录本身。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    /// 插件ID
    pub id: PluginId,
    /// 注册序号，排序时用于稳定
    pub index: usize,
    /// 实现类型所在的模块路径
    pub path: String,
    /// 资源命名空间，默认为模块路径
    pub namespace: String,
    /// 资源根目录
    pub assets_root: Option<PathBuf>,
    /// 是否为优先插件（不参与排序）
    pub priority: bool,
}

/// 指向插件自身记录的非拥有句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginHandle {
    id: PluginId,
    index: usize,
}

impl PluginHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// 插件记录，独占插件实例
pub struct PluginRecord {
    info: Arc<PluginInfo>,
    instance: Box<dyn Plugin>,
    logger: OnceCell<PluginLogger>,
}

impl PluginRecord {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &Arc<PluginInfo> {
        &self.info
    }

    pub fn handle(&self) -> PluginHandle {
        PluginHandle {
            id: self.info.id.clone(),
            index: self.info.index,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.instance.capabilities()
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }

    pub fn instance(&self) -> &dyn Plugin {
        &*self.instance
    }

    pub fn instance_mut(&mut self) -> &mut dyn Plugin {
        &mut *self.instance
    }

    pub fn downcast_ref<T: Plugin>(&self) -> Option<&T> {
        AsAny::as_any(&*self.instance).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Plugin>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(&mut *self.instance).downcast_mut::<T>()
    }

    /// 插件日志句柄，第一次访问时创建
    pub fn logger(&self) -> &PluginLogger {
        self.logger.get_or_init(|| PluginLogger::new(&self.info.id))
    }

    /// 插件自己的事件总线，未声明 `DISPATCHER` 时为空
    pub fn dispatcher(&self) -> Option<&EventDispatcher> {
        if self.has(Capabilities::DISPATCHER) {
            self.instance.dispatcher()
        } else {
            None
        }
    }
}

impl fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecord")
            .field("info", &self.info)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// 注册结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// 新记录
    Registered(PluginId),
    /// 身份重复，已忽略
    Duplicate(PluginId),
}

impl Registration {
    pub fn id(&self) -> &str {
        match self {
            Registration::Registered(id) | Registration::Duplicate(id) => id,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Registration::Registered(_))
    }
}

/// 插件注册表
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<PluginRecord>,
    by_id: HashMap<PluginId, usize>,
    /// 优先插件，按注册顺序排在最前面
    priority: Vec<usize>,
    /// 参与排序的插件，排序前为注册顺序
    order: Vec<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件实例
    ///
    /// 身份重复时保留先注册的记录，新实例被丢弃。
    pub fn register(&mut self, mut instance: Box<dyn Plugin>, priority: bool) -> Registration {
        let id = identity_of(&*instance);
        if self.by_id.contains_key(&id) {
            warn!("{:?} duplicated. Ignored.", id);
            return Registration::Duplicate(id);
        }

        let caps = instance.capabilities();
        let path = module_path_of(instance.type_name());
        let namespace = caps
            .contains(Capabilities::NAMESPACE)
            .then(|| instance.namespace())
            .flatten()
            .unwrap_or_else(|| path.clone());
        let assets_root = caps
            .contains(Capabilities::ASSETS_ROOT)
            .then(|| instance.assets_root())
            .flatten();

        let index = self.records.len();
        let info = Arc::new(PluginInfo {
            id: id.clone(),
            index,
            path,
            namespace,
            assets_root,
            priority,
        });

        if caps.contains(Capabilities::DISPATCHER) {
            if let Some(dispatcher) = instance.dispatcher_mut() {
                dispatcher.bind(id.clone());
            }
        }

        let mut record = PluginRecord {
            info,
            instance,
            logger: OnceCell::new(),
        };
        if caps.contains(Capabilities::PLUGIN_ACCESS) {
            let handle = record.handle();
            record.instance.set_plugin(handle);
        }
        self.records.push(record);

        self.by_id.insert(id.clone(), index);
        if priority {
            self.priority.push(index);
        } else {
            self.order.push(index);
        }

        debug!("Registered plugin {} (#{})", id, index);
        Registration::Registered(id)
    }

    pub fn get(&self, id: &str) -> Option<&PluginRecord> {
        self.by_id.get(id).map(|&idx| &self.records[idx])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PluginRecord> {
        let idx = *self.by_id.get(id)?;
        Some(&mut self.records[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// 按注册序号访问记录
    pub(crate) fn record(&self, index: usize) -> &PluginRecord {
        &self.records[index]
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> &mut PluginRecord {
        &mut self.records[index]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 当前序列：优先插件在前，其余按注册顺序或排序结果
    pub fn sequence(&self) -> Vec<usize> {
        self.priority.iter().chain(&self.order).copied().collect()
    }

    /// 参与排序的记录下标，按当前顺序
    pub fn sortable(&self) -> &[usize] {
        &self.order
    }

    pub fn priority(&self) -> &[usize] {
        &self.priority
    }

    /// 按当前序列遍历记录
    pub fn all(&self) -> impl Iterator<Item = &PluginRecord> + '_ {
        self.priority
            .iter()
            .chain(&self.order)
            .map(move |&idx| &self.records[idx])
    }

    pub fn ids(&self) -> Vec<PluginId> {
        self.all().map(|record| record.id().to_string()).collect()
    }

    /// 整体替换排序序列
    ///
    /// 新序列必须恰好是当前可排序记录的一个排列，否则保持原序列不变。
    pub(crate) fn set_order(&mut self, order: Vec<usize>) -> Result<()> {
        let mut expected = self.order.clone();
        let mut given = order.clone();
        expected.sort_unstable();
        given.sort_unstable();
        if expected != given {
            return Err(PluggableError::InvalidState {
                operation: "set_order",
                state: format!(
                    "holding {} sortable plugins, got order {:?}",
                    self.order.len(),
                    order
                ),
            });
        }
        self.order = order;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{named_plugin_id, plugin_id_of};

    struct Cache;

    impl Plugin for Cache {
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }
    }

    #[derive(Default)]
    struct SelfAware {
        handle: Option<PluginHandle>,
    }

    impl Plugin for SelfAware {
        fn capabilities(&self) -> Capabilities {
            Capabilities::PLUGIN_ACCESS | Capabilities::NAMESPACE
        }

        fn set_plugin(&mut self, plugin: PluginHandle) {
            self.handle = Some(plugin);
        }

        fn namespace(&self) -> Option<String> {
            Some("self-aware".to_string())
        }
    }

    struct Shard(&'static str);

    impl Plugin for Shard {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NAMED
        }

        fn name(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_duplicate_identity_keeps_first() {
        let mut registry = Registry::new();
        assert!(registry.register(Box::new(Cache), false).is_registered());

        let second = registry.register(Box::new(Cache), false);
        assert_eq!(second, Registration::Duplicate(plugin_id_of::<Cache>()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_named_instances_coexist() {
        let mut registry = Registry::new();
        registry.register(Box::new(Shard("a")), false);
        registry.register(Box::new(Shard("b")), false);

        assert_eq!(registry.len(), 2);
        let b = registry.get(&named_plugin_id::<Shard>("b")).unwrap();
        assert_eq!(b.info().index, 1);
        assert_eq!(b.downcast_ref::<Shard>().map(|s| s.0), Some("b"));
    }

    #[test]
    fn test_plugin_access_receives_handle() {
        let mut registry = Registry::new();
        registry.register(Box::new(Cache), false);
        registry.register(Box::new(SelfAware::default()), false);

        let record = registry.get(&plugin_id_of::<SelfAware>()).unwrap();
        let handle = record.downcast_ref::<SelfAware>().and_then(|p| p.handle.clone());
        assert_eq!(handle, Some(record.handle()));
        assert_eq!(record.info().namespace, "self-aware");
    }

    #[test]
    fn test_provenance_defaults_to_module_path() {
        let mut registry = Registry::new();
        registry.register(Box::new(Cache), false);

        let info = registry.all().next().unwrap().info().clone();
        assert!(info.path.ends_with("registry::tests"));
        assert_eq!(info.namespace, info.path);
        assert!(info.assets_root.is_none());
    }

    #[test]
    fn test_priority_records_come_first() {
        let mut registry = Registry::new();
        registry.register(Box::new(Shard("late")), false);
        registry.register(Box::new(Cache), true);

        assert_eq!(
            registry.ids(),
            vec![plugin_id_of::<Cache>(), named_plugin_id::<Shard>("late")]
        );
        assert_eq!(registry.sortable(), &[0]);
        assert_eq!(registry.priority(), &[1]);
    }

    #[test]
    fn test_set_order_replaces_sequence() {
        let mut registry = Registry::new();
        for name in ["a", "b", "c"] {
            registry.register(Box::new(Shard(name)), false);
        }
        registry.set_order(vec![2, 0, 1]).unwrap();
        assert_eq!(
            registry.ids(),
            vec![
                named_plugin_id::<Shard>("c"),
                named_plugin_id::<Shard>("a"),
                named_plugin_id::<Shard>("b"),
            ]
        );
    }

    #[test]
    fn test_set_order_rejects_non_permutation() {
        let mut registry = Registry::new();
        for name in ["a", "b"] {
            registry.register(Box::new(Shard(name)), false);
        }

        for order in [vec![0], vec![0, 0], vec![0, 1, 5]] {
            let err = registry.set_order(order).unwrap_err();
            assert!(matches!(err, PluggableError::InvalidState { operation: "set_order", .. }));
        }
        assert_eq!(
            registry.ids(),
            vec![named_plugin_id::<Shard>("a"), named_plugin_id::<Shard>("b")]
        );
    }

    #[test]
    fn test_logger_created_once() {
        let mut registry = Registry::new();
        registry.register(Box::new(Cache), false);

        let record = registry.all().next().unwrap();
        let first = record.logger() as *const PluginLogger;
        let second = record.logger() as *const PluginLogger;
        assert_eq!(first, second);
        assert_eq!(record.logger().plugin_id(), record.id());
    }
}
