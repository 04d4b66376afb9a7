//! 能力钩子调度
//!
//! 每个阶段先检查插件声明的能力标记，再调用对应的钩子。
//! 注册通知和初始化都有多种形态，按固定优先级只调用第一个匹配的形态。

use super::core::Capabilities;
use super::registry::PluginRecord;
use crate::core::Options;
use crate::Result;
use tracing::trace;

/// 注册通知形态，按优先级排列
const REGISTER_SHAPES: [Capabilities; 3] = [
    Capabilities::REGISTER,
    Capabilities::REGISTER_WITH_RECORD,
    Capabilities::REGISTER_WITH_OPTIONS,
];

/// 初始化形态，按优先级排列
const INIT_SHAPES: [Capabilities; 4] = [
    Capabilities::INIT,
    Capabilities::INIT_FALLIBLE,
    Capabilities::INIT_WITH_OPTIONS,
    Capabilities::INIT_FALLIBLE_WITH_OPTIONS,
];

fn first_shape(caps: Capabilities, shapes: &[Capabilities]) -> Option<Capabilities> {
    shapes.iter().copied().find(|shape| caps.contains(*shape))
}

/// 插件会被调用的注册通知形态
pub fn register_shape(caps: Capabilities) -> Option<Capabilities> {
    first_shape(caps, &REGISTER_SHAPES)
}

/// 插件会被调用的初始化形态
pub fn init_shape(caps: Capabilities) -> Option<Capabilities> {
    first_shape(caps, &INIT_SHAPES)
}

pub(crate) fn notify_register(record: &mut PluginRecord, options: &mut Options) {
    let Some(shape) = register_shape(record.capabilities()) else {
        return;
    };
    trace!("Register hook {:?} on {}", shape, record.id());

    if shape == Capabilities::REGISTER {
        record.instance_mut().on_register();
    } else if shape == Capabilities::REGISTER_WITH_RECORD {
        let handle = record.handle();
        record.instance_mut().on_register_record(&handle);
    } else {
        record.instance_mut().on_register_options(options);
    }
}

pub(crate) fn provide_options(record: &mut PluginRecord, options: &mut Options) -> Result<()> {
    if !record.has(Capabilities::PROVIDES_OPTIONS) {
        return Ok(());
    }
    record.instance_mut().provide_options(options)
}

/// 在初始化钩子之前交给插件的上下文：日志句柄和选项存储
pub(crate) fn assign_context(record: &mut PluginRecord, options: &Options) {
    let caps = record.capabilities();
    if caps.contains(Capabilities::LOGGER) {
        let logger = record.logger().clone();
        record.instance_mut().set_logger(logger);
    }
    if caps.contains(Capabilities::OPTIONS_STORE) {
        record.instance_mut().set_options(options);
    }
}

/// 调用初始化钩子，返回实际调用的形态
pub(crate) fn init(record: &mut PluginRecord, options: &Options) -> Result<Option<Capabilities>> {
    let Some(shape) = init_shape(record.capabilities()) else {
        return Ok(None);
    };
    trace!("Init hook {:?} on {}", shape, record.id());

    let plugin = record.instance_mut();
    if shape == Capabilities::INIT {
        plugin.init();
    } else if shape == Capabilities::INIT_FALLIBLE {
        plugin.try_init()?;
    } else if shape == Capabilities::INIT_WITH_OPTIONS {
        plugin.init_with_options(options);
    } else {
        plugin.try_init_with_options(options)?;
    }
    Ok(Some(shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PluginLogger;
    use crate::plugins::{Plugin, PluginHandle, Registry};
    use crate::PluggableError;

    #[derive(Default)]
    struct Recorder {
        caps: Capabilities,
        calls: Vec<&'static str>,
        logger: Option<PluginLogger>,
        seen_keys: usize,
    }

    impl Recorder {
        fn with(caps: Capabilities) -> Box<Self> {
            Box::new(Self {
                caps,
                ..Self::default()
            })
        }
    }

    impl Plugin for Recorder {
        fn capabilities(&self) -> Capabilities {
            self.caps
        }

        fn on_register(&mut self) {
            self.calls.push("register");
        }

        fn on_register_record(&mut self, _plugin: &PluginHandle) {
            self.calls.push("register_record");
        }

        fn on_register_options(&mut self, options: &mut Options) {
            options.set("registered", true);
            self.calls.push("register_options");
        }

        fn init(&mut self) {
            self.calls.push("init");
        }

        fn try_init(&mut self) -> Result<()> {
            self.calls.push("try_init");
            Err(PluggableError::failure("not ready"))
        }

        fn init_with_options(&mut self, options: &Options) {
            self.seen_keys = options.len();
            self.calls.push("init_with_options");
        }

        fn try_init_with_options(&mut self, _options: &Options) -> Result<()> {
            self.calls.push("try_init_with_options");
            Ok(())
        }

        fn set_logger(&mut self, logger: PluginLogger) {
            self.logger = Some(logger);
        }
    }

    fn record_for(caps: Capabilities) -> (Registry, usize) {
        let mut registry = Registry::new();
        registry.register(Recorder::with(caps), false);
        (registry, 0)
    }

    fn calls(registry: &Registry, idx: usize) -> Vec<&'static str> {
        registry
            .record(idx)
            .downcast_ref::<Recorder>()
            .map(|r| r.calls.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_init_shape_priority() {
        let all = Capabilities::INIT
            | Capabilities::INIT_FALLIBLE
            | Capabilities::INIT_WITH_OPTIONS
            | Capabilities::INIT_FALLIBLE_WITH_OPTIONS;
        assert_eq!(init_shape(all), Some(Capabilities::INIT));
        assert_eq!(
            init_shape(Capabilities::INIT_WITH_OPTIONS | Capabilities::INIT_FALLIBLE_WITH_OPTIONS),
            Some(Capabilities::INIT_WITH_OPTIONS)
        );
        assert_eq!(init_shape(Capabilities::LOGGER), None);
    }

    #[test]
    fn test_exactly_one_init_shape_invoked() {
        let (mut registry, idx) =
            record_for(Capabilities::INIT_WITH_OPTIONS | Capabilities::INIT_FALLIBLE_WITH_OPTIONS);
        let mut options = Options::new();
        options.set("db", 1u8);

        let shape = init(registry.record_mut(idx), &options).unwrap();
        assert_eq!(shape, Some(Capabilities::INIT_WITH_OPTIONS));
        assert_eq!(calls(&registry, idx), vec!["init_with_options"]);
        assert_eq!(
            registry.record(idx).downcast_ref::<Recorder>().map(|r| r.seen_keys),
            Some(1)
        );
    }

    #[test]
    fn test_fallible_init_propagates() {
        let (mut registry, idx) = record_for(Capabilities::INIT_FALLIBLE);
        let err = init(registry.record_mut(idx), &Options::new()).unwrap_err();
        assert_eq!(err.to_string(), "not ready");
    }

    #[test]
    fn test_undeclared_hooks_are_skipped() {
        let (mut registry, idx) = record_for(Capabilities::empty());
        let mut options = Options::new();

        notify_register(registry.record_mut(idx), &mut options);
        assert_eq!(init(registry.record_mut(idx), &options).unwrap(), None);
        assert!(calls(&registry, idx).is_empty());
    }

    #[test]
    fn test_register_with_options() {
        let (mut registry, idx) = record_for(Capabilities::REGISTER_WITH_OPTIONS);
        let mut options = Options::new();

        notify_register(registry.record_mut(idx), &mut options);
        assert_eq!(calls(&registry, idx), vec!["register_options"]);
        assert_eq!(options.get_as::<bool>("registered"), Some(&true));
    }

    #[test]
    fn test_register_shape_priority() {
        let (mut registry, idx) =
            record_for(Capabilities::REGISTER_WITH_RECORD | Capabilities::REGISTER_WITH_OPTIONS);
        notify_register(registry.record_mut(idx), &mut Options::new());
        assert_eq!(calls(&registry, idx), vec!["register_record"]);
    }

    #[test]
    fn test_logger_assignment() {
        let (mut registry, idx) = record_for(Capabilities::LOGGER);
        assign_context(registry.record_mut(idx), &Options::new());

        let record = registry.record(idx);
        let logger = record.downcast_ref::<Recorder>().and_then(|r| r.logger.clone());
        assert_eq!(logger.map(|l| l.plugin_id().to_string()), Some(record.id().to_string()));
    }
}
