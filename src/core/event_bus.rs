//! 分层事件总线
//!
//! 两级派发目标：控制器持有的进程级总线，以及声明了 `DISPATCHER`
//! 能力的插件自己的总线。对插件集合触发事件时，每个插件先在进程级总线上
//! 镜像一个 `plugin:<name>` 局部事件，再把原事件交给插件自己的总线。

use crate::core::Options;
use crate::plugins::registry::{PluginInfo, PluginRecord};
use crate::types::{plugin_event_name, PluginId, E_ALL};
use crate::{PluggableError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// 事件处理器
pub type EventHandler = Arc<dyn Fn(&mut Event<'_>) -> Result<()> + Send + Sync>;

/// 单次触发的事件
///
/// 选项存储以可变借用的方式随事件传递，事件在派发结束后即被丢弃。
pub struct Event<'a> {
    name: String,
    parent: Option<String>,
    plugin: Option<Arc<PluginInfo>>,
    options: &'a mut Options,
    error: Option<PluggableError>,
}

impl<'a> Event<'a> {
    pub fn new(name: impl Into<String>, options: &'a mut Options) -> Self {
        Self {
            name: name.into(),
            parent: None,
            plugin: None,
            options,
            error: None,
        }
    }

    /// 以插件为上下文的事件
    pub fn for_plugin(
        name: impl Into<String>,
        plugin: Arc<PluginInfo>,
        options: &'a mut Options,
    ) -> Self {
        let mut event = Self::new(name, options);
        event.plugin = Some(plugin);
        event
    }

    /// 由原事件派生的 `plugin:<name>` 局部事件，共享同一个选项存储
    fn local<'p>(parent: &'p mut Event<'_>, plugin: Arc<PluginInfo>) -> Event<'p> {
        Event {
            name: plugin_event_name(&parent.name),
            parent: Some(parent.name.clone()),
            plugin: Some(plugin),
            options: &mut *parent.options,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 局部事件对应的原事件名称
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn plugin(&self) -> Option<&Arc<PluginInfo>> {
        self.plugin.as_ref()
    }

    pub fn options(&self) -> &Options {
        self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        self.options
    }

    pub fn error(&self) -> Option<&PluggableError> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// 记录错误；槽位已被占用时保留第一个错误，返回是否写入
    pub fn set_error(&mut self, error: PluggableError) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.error = Some(error);
        true
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("plugin", &self.plugin.as_ref().map(|p| p.id.as_str()))
            .field("error", &self.error)
            .finish()
    }
}

/// 事件分发器
#[derive(Clone, Default)]
pub struct EventDispatcher {
    /// 所属插件，进程级总线为空
    owner: Option<PluginId>,
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅事件，同名处理器按订阅顺序执行
    pub fn on<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// 订阅 `plugin:<name>` 局部事件
    pub fn on_plugin<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.on(&plugin_event_name(name), handler);
    }

    /// 订阅所有事件，在具名处理器之后执行
    pub fn on_all<F>(&mut self, handler: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.on(E_ALL, handler);
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    /// 绑定到所属插件，由注册表在注册时调用
    pub fn bind(&mut self, owner: impl Into<PluginId>) {
        self.owner = Some(owner.into());
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// 派发事件
    ///
    /// 第一个失败的处理器中止派发，错误写入事件的错误槽并原样返回。
    /// 处理器通过 `set_error` 写入错误槽同样中止派发。
    pub fn trigger(&self, event: &mut Event<'_>) -> Result<()> {
        let named = self.handlers.get(event.name()).into_iter().flatten();
        let wildcard = if event.name() == E_ALL {
            None
        } else {
            self.handlers.get(E_ALL)
        };

        for handler in named.chain(wildcard.into_iter().flatten()) {
            if let Err(e) = handler(&mut *event) {
                debug!(
                    "Handler for {:?} failed on {}: {}",
                    event.name(),
                    self.owner().unwrap_or("global bus"),
                    e
                );
                event.set_error(e.clone());
                return Err(e);
            }
            if let Some(e) = event.error() {
                return Err(e.clone());
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<(&str, usize)> = self
            .handlers
            .iter()
            .map(|(name, handlers)| (name.as_str(), handlers.len()))
            .collect();
        events.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("owner", &self.owner)
            .field("events", &events)
            .finish()
    }
}

/// 对一组插件记录按顺序触发事件
///
/// 每个插件：先在 `global` 上触发 `plugin:<name>` 局部事件，再在插件自己的
/// 总线上触发原事件。第一个错误中止剩余插件，错误依次包装插件ID和事件名称。
pub fn trigger_plugins<'r, I>(
    global: &EventDispatcher,
    event: &mut Event<'_>,
    records: I,
) -> Result<()>
where
    I: IntoIterator<Item = &'r PluginRecord>,
{
    for record in records {
        trace!("Trigger {:?} on {}", event.name(), record.id());

        let mirrored = {
            let mut local = Event::local(event, record.info().clone());
            global.trigger(&mut local)
        };

        let result = mirrored.and_then(|_| match record.dispatcher() {
            Some(dispatcher) => dispatcher.trigger(event),
            None => Ok(()),
        });

        if let Err(e) = result {
            let error = e.in_plugin(record.id()).in_trigger(event.name());
            event.set_error(error.clone());
            return Err(error);
        }
    }
    Ok(())
}
