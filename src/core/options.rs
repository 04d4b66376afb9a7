//! 全局选项存储
//!
//! 插件之间共享的可变键值命名空间。整条流水线是单线程的，
//! 存储本身不加锁，由控制器持有并作为上下文参数显式传递。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 选项值，任意类型
pub type OptionValue = Arc<dyn Any + Send + Sync>;

/// 选项存储
///
/// 值以 `Arc` 共享，克隆整个存储只复制引用，插件在初始化时可以留一份快照。
#[derive(Clone, Default)]
pub struct Options {
    values: HashMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取原始值
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    /// 按类型获取值，类型不符时返回 `None`
    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref::<T>()
    }

    /// 设置值，返回旧值
    pub fn set<T>(&mut self, key: impl Into<String>, value: T) -> Option<OptionValue>
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.into(), Arc::new(value))
    }

    /// 设置已共享的值
    pub fn set_shared(&mut self, key: impl Into<String>, value: OptionValue) -> Option<OptionValue> {
        self.values.insert(key.into(), value)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 批量写入配置文件中的预置值，以 `serde_json::Value` 存放
    pub fn extend_json<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Options").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_has() {
        let mut options = Options::new();
        assert!(!options.has("db"));

        options.set("db", "postgres://localhost".to_string());
        assert!(options.has("db"));
        assert_eq!(
            options.get_as::<String>("db").map(String::as_str),
            Some("postgres://localhost")
        );
        assert!(options.get_as::<u32>("db").is_none());
    }

    #[test]
    fn test_overwrite_returns_previous() {
        let mut options = Options::new();
        assert!(options.set("pool", 4u32).is_none());

        let previous = options.set("pool", 8u32).unwrap();
        assert_eq!(previous.downcast_ref::<u32>(), Some(&4));
        assert_eq!(options.get_as::<u32>("pool"), Some(&8));
    }

    #[test]
    fn test_clone_shares_values() {
        let mut options = Options::new();
        options.set("cache", vec![1, 2, 3]);
        let snapshot = options.clone();

        options.remove("cache");
        assert!(!options.has("cache"));
        assert_eq!(snapshot.get_as::<Vec<i32>>("cache"), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_extend_json() {
        let mut options = Options::new();
        options.extend_json(vec![("port".to_string(), serde_json::json!(8080))]);
        assert_eq!(
            options.get_as::<serde_json::Value>("port"),
            Some(&serde_json::json!(8080))
        );
        assert_eq!(options.len(), 1);
    }
}
