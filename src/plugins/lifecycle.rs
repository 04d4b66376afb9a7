//! 插件生命周期控制器
//!
//! 把注册表、排序器、钩子调度和事件总线组合成流水线：
//! 注册 → 排序 → 提供选项 → 初始化 → 初始化之后。
//! 整条流水线是同步的，在一个线程内完成。

use super::core::{Capabilities, OrderRef, Plugin};
use super::extensions::{Extension, ExtensionContext};
use super::hooks;
use super::registry::{PluginRecord, Registration, Registry};
use super::sorter::{OrderingRules, ProviderIndex, Sorter};
use crate::config::{ConfigManager, ControllerConfig};
use crate::core::{trigger_plugins, Event, EventDispatcher, Options};
use crate::types::{
    plugin_id_of, PluginId, E_INIT, E_INIT_DONE, E_PLUGIN_REGISTER, E_POST_INIT, E_REGISTER,
};
use crate::{PluggableError, Result};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// 接受注册
    Unsorted,
    /// 初始化顺序已确定
    Sorted,
    /// 正在（或已经）运行选项提供钩子
    ProvidingOptions,
    /// 正在初始化插件
    Initializing,
    /// 全部完成
    Done,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Unsorted => "unsorted",
            ControllerState::Sorted => "sorted",
            ControllerState::ProvidingOptions => "providing options",
            ControllerState::Initializing => "initializing",
            ControllerState::Done => "done",
        };
        f.write_str(name)
    }
}

/// 阶段调用结果
///
/// 重复调用同一阶段不是错误，返回对应的哨兵值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    AlreadySorted,
    AlreadyProvided,
    AlreadyInitialized,
}

impl PhaseOutcome {
    pub fn is_completed(self) -> bool {
        self == PhaseOutcome::Completed
    }
}

/// 插件生命周期控制器
pub struct PluginController {
    config: ControllerConfig,
    registry: Registry,
    /// 全局选项存储
    options: Options,
    /// 进程级事件总线
    events: EventDispatcher,
    rules: OrderingRules,
    providers: ProviderIndex,
    extensions: Vec<Box<dyn Extension>>,
    /// 已初始化的扩展数量
    extensions_ready: usize,
    state: ControllerState,
    sorted: bool,
    options_provided: bool,
}

impl PluginController {
    /// 创建控制器，配置中的预置选项写入全局选项存储
    pub fn new(config: ControllerConfig) -> Self {
        let mut options = Options::new();
        options.extend_json(config.options.clone());

        debug!(
            "Creating plugin controller {} with {} preset options",
            config.name,
            options.len()
        );

        Self {
            config,
            registry: Registry::new(),
            options,
            events: EventDispatcher::new(),
            rules: OrderingRules::new(),
            providers: ProviderIndex::default(),
            extensions: Vec::new(),
            extensions_ready: 0,
            state: ControllerState::Unsorted,
            sorted: false,
            options_provided: false,
        }
    }

    /// 从YAML配置文件创建控制器
    pub async fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = ConfigManager::load_from_file(path).await?;
        manager.validate()?;
        Ok(Self::new(manager.into_config()))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    /// 在进程级总线上订阅事件
    pub fn on<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.events.on(name, handler);
    }

    /// 订阅所有插件的 `plugin:<name>` 局部事件
    pub fn on_plugin<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.events.on_plugin(name, handler);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 注册插件
    pub fn add<P: Plugin>(&mut self, plugin: P) -> Result<Registration> {
        self.register(Box::new(plugin))
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<Registration> {
        self.register_with(plugin, false)
    }

    /// 注册优先插件：不参与排序，按注册顺序排在所有插件之前
    pub fn register_priority(&mut self, plugin: Box<dyn Plugin>) -> Result<Registration> {
        self.register_with(plugin, true)
    }

    fn register_with(&mut self, plugin: Box<dyn Plugin>, priority: bool) -> Result<Registration> {
        match self.state {
            ControllerState::Unsorted => {}
            ControllerState::Done if self.config.allow_late_registration => {}
            state => {
                return Err(PluggableError::RegistrationClosed {
                    state: state.to_string(),
                })
            }
        }

        let registration = self.registry.register(plugin, priority);
        if !registration.is_registered() {
            return Ok(registration);
        }
        let idx = self.registry.len() - 1;

        hooks::notify_register(self.registry.record_mut(idx), &mut self.options);
        self.trigger_records(E_REGISTER, &[idx])?;

        if self.state == ControllerState::Done {
            // 晚注册不重新排序，依赖约束只对已初始化的插件成立
            warn!(
                "Plugin {} registered after initialization; initializing without resorting",
                registration.id()
            );
            if self.registry.record(idx).has(Capabilities::PROVIDES_OPTIONS) {
                self.providers = ProviderIndex::build(&self.registry, &self.registry.sequence());
                let record = self.registry.record_mut(idx);
                let id = record.id().to_string();
                hooks::provide_options(record, &mut self.options)
                    .map_err(|e| e.in_hook("ProvideOptions").in_plugin(id))?;
            }
            self.init_record(idx)?;
        }

        Ok(registration)
    }

    /// `first` 必须在 `then` 之前初始化
    pub fn before(&mut self, first: impl Into<OrderRef>, then: impl Into<OrderRef>) {
        if self.sorted {
            warn!("Ordering rule added after sorting has no effect");
        }
        self.rules.before(first.into(), then.into());
    }

    /// `dependent` 必须在 `dependency` 之后初始化
    pub fn after(&mut self, dependent: impl Into<OrderRef>, dependency: impl Into<OrderRef>) {
        if self.sorted {
            warn!("Ordering rule added after sorting has no effect");
        }
        self.rules.after(dependent.into(), dependency.into());
    }

    /// 添加扩展。初始化完成后添加的扩展立即初始化。
    pub fn extension(&mut self, extension: Box<dyn Extension>) -> Result<()> {
        debug!("Adding extension {}", extension.name());
        self.extensions.push(extension);
        if self.state == ControllerState::Done {
            self.init_extensions()?;
        }
        Ok(())
    }

    /// 确定初始化顺序
    pub fn sort(&mut self) -> Result<PhaseOutcome> {
        if self.sorted {
            return Ok(PhaseOutcome::AlreadySorted);
        }

        debug!("Sorting {} plugins", self.registry.sortable().len());
        let providers = ProviderIndex::build(&self.registry, &self.registry.sequence());
        let order = Sorter::new(&self.registry, &providers, &self.rules, &self.options)
            .sort(self.registry.sortable())?;

        self.registry.set_order(order)?;
        self.providers = providers;
        self.sorted = true;
        if self.state == ControllerState::Unsorted {
            self.state = ControllerState::Sorted;
        }

        debug!("Plugin order: {:?}", self.registry.ids());
        Ok(PhaseOutcome::Completed)
    }

    /// 按提供者顺序运行选项提供钩子
    pub fn provide_options(&mut self) -> Result<PhaseOutcome> {
        if self.options_provided {
            return Ok(PhaseOutcome::AlreadyProvided);
        }
        self.sort()?;
        if matches!(
            self.state,
            ControllerState::Unsorted | ControllerState::Sorted
        ) {
            self.state = ControllerState::ProvidingOptions;
        }

        let providers = ProviderIndex::build(&self.registry, &self.registry.sequence());
        let provides = |registry: &Registry, idx: usize| {
            registry.record(idx).has(Capabilities::PROVIDES_OPTIONS)
        };
        let subset: Vec<usize> = self
            .registry
            .sortable()
            .iter()
            .copied()
            .filter(|&idx| provides(&self.registry, idx))
            .collect();
        let sorted = Sorter::new(&self.registry, &providers, &self.rules, &self.options)
            .sort(&subset)?;

        let run: Vec<usize> = self
            .registry
            .priority()
            .iter()
            .copied()
            .filter(|&idx| provides(&self.registry, idx))
            .chain(sorted)
            .collect();

        for idx in run {
            let record = self.registry.record_mut(idx);
            let id = record.id().to_string();
            debug!("Providing options from {}", id);
            hooks::provide_options(record, &mut self.options)
                .map_err(|e| e.in_hook("ProvideOptions").in_plugin(id))?;
        }

        self.providers = providers;
        self.options_provided = true;
        Ok(PhaseOutcome::Completed)
    }

    /// 初始化全部插件
    ///
    /// 失败时已经初始化的插件保持初始化状态，不回滚。
    pub fn init(&mut self) -> Result<PhaseOutcome> {
        match self.state {
            ControllerState::Done => return Ok(PhaseOutcome::AlreadyInitialized),
            ControllerState::Initializing => {
                return Err(PluggableError::InvalidState {
                    operation: "init",
                    state: self.state.to_string(),
                })
            }
            _ => {}
        }

        self.sort()?;
        self.provide_options()?;
        self.init_extensions()?;

        self.state = ControllerState::Initializing;
        info!(
            "Initializing {} plugins for {}",
            self.registry.len(),
            self.config.name
        );

        self.trigger(E_INIT)?;
        for idx in self.registry.sequence() {
            self.init_record(idx)?;
        }
        self.trigger(E_INIT_DONE)?;
        self.trigger(E_POST_INIT)?;

        self.state = ControllerState::Done;
        info!("{} plugins initialized", self.registry.len());
        Ok(PhaseOutcome::Completed)
    }

    fn init_record(&mut self, idx: usize) -> Result<()> {
        let record = self.registry.record(idx);
        let id = record.id().to_string();
        debug!("Init plugin {}", id);

        if record.has(Capabilities::REQUIRES_OPTIONS) {
            for key in record.instance().requires_options() {
                if self.options.has(&key) {
                    continue;
                }
                let error = match self.providers.provider(&key) {
                    Some(provider) => PluggableError::MissingOption {
                        key,
                        provider: self.registry.record(provider).id().to_string(),
                    },
                    None => PluggableError::UnresolvedOption {
                        key,
                        required_by: id.clone(),
                    },
                };
                return Err(error.in_plugin(id));
            }
        }

        hooks::assign_context(self.registry.record_mut(idx), &self.options);
        self.trigger_records(E_INIT, &[idx])?;

        hooks::init(self.registry.record_mut(idx), &self.options)
            .map_err(|e| e.in_hook("Init").in_plugin(id.as_str()))?;

        self.trigger_records(E_INIT, &[idx])?;
        self.trigger_records(E_INIT_DONE, &[idx])
    }

    fn init_extensions(&mut self) -> Result<()> {
        while self.extensions_ready < self.extensions.len() {
            let extension = self.extensions[self.extensions_ready].as_mut();
            init_extension(
                extension,
                &mut self.events,
                &mut self.options,
                &self.registry,
            )?;
            self.extensions_ready += 1;
        }
        Ok(())
    }

    /// 在进程级总线上触发事件
    pub fn trigger(&mut self, name: &str) -> Result<()> {
        let mut event = Event::new(name, &mut self.options);
        self.events
            .trigger(&mut event)
            .map_err(|e| e.in_trigger(name))
    }

    /// 对插件触发事件，`targets` 为空时作用于整个序列
    ///
    /// 未注册的ID被忽略。
    pub fn trigger_plugins(&mut self, name: &str, targets: &[&str]) -> Result<()> {
        let records: Vec<usize> = if targets.is_empty() {
            self.registry.sequence()
        } else {
            targets
                .iter()
                .filter_map(|id| self.registry.index_of(id))
                .collect()
        };
        self.trigger_records(name, &records)
    }

    fn trigger_records(&mut self, name: &str, records: &[usize]) -> Result<()> {
        let registry = &self.registry;
        let mut event = Event::new(name, &mut self.options);
        trigger_plugins(
            &self.events,
            &mut event,
            records.iter().map(|&idx| registry.record(idx)),
        )
    }

    /// 按初始化顺序遍历插件，只能在初始化完成后调用
    pub fn each<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(&PluginRecord) -> Result<()>,
    {
        if self.state != ControllerState::Done {
            return Err(PluggableError::NotInitialized);
        }
        for record in self.registry.all() {
            callback(record).map_err(|e| e.in_plugin(record.id()))?;
        }
        Ok(())
    }

    /// 当前序列中的插件ID
    pub fn ids(&self) -> Vec<PluginId> {
        self.registry.ids()
    }

    pub fn record(&self, id: &str) -> Option<&PluginRecord> {
        self.registry.get(id)
    }

    /// 按ID取出插件实例并向下转型
    pub fn plugin<T: Plugin>(&self, id: &str) -> Option<&T> {
        self.registry.get(id)?.downcast_ref::<T>()
    }

    pub fn plugin_mut<T: Plugin>(&mut self, id: &str) -> Option<&mut T> {
        self.registry.get_mut(id)?.downcast_mut::<T>()
    }

    /// 按类型取出未命名插件
    pub fn plugin_of<T: Plugin>(&self) -> Option<&T> {
        self.plugin::<T>(&plugin_id_of::<T>())
    }
}

impl Default for PluginController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl fmt::Debug for PluginController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginController")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("plugins", &self.registry.ids())
            .field("options", &self.options)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// 初始化扩展，并为每个已注册插件补发 `pluginRegister`
fn init_extension(
    extension: &mut dyn Extension,
    events: &mut EventDispatcher,
    options: &mut Options,
    registry: &Registry,
) -> Result<()> {
    let name = extension.name().to_string();
    debug!("Init extension {}", name);

    let mut context = ExtensionContext {
        events: &mut *events,
        options: &mut *options,
        registry,
    };
    extension
        .init(&mut context)
        .map_err(|e| e.in_extension(name.as_str()))?;

    if let Some(dispatcher) = extension.dispatcher() {
        for record in registry.all() {
            let mut event = Event::for_plugin(E_PLUGIN_REGISTER, record.info().clone(), &mut *options);
            dispatcher
                .trigger(&mut event)
                .map_err(|e| e.in_plugin(record.id()).in_extension(name.as_str()))?;
        }
    }
    Ok(())
}
