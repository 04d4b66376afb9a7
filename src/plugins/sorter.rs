//! 插件排序
//!
//! 把显式的先后声明和选项提供者/使用者关系转换成依赖图，
//! 再做稳定拓扑排序。同一个排序器会运行两次：先只对选项提供者排序，
//! 确定提供钩子的执行顺序；再对全部插件排序，确定初始化顺序。

use super::core::{Capabilities, OrderRef};
use super::registry::Registry;
use crate::core::{DependencyGraph, Options};
use crate::types::PluginId;
use crate::{PluggableError, Result};
use std::collections::HashMap;
use tracing::debug;

/// 控制器级别的排序声明者
pub const CONTROLLER_DECLARER: &str = "controller";

/// 通过控制器登记的先后规则
#[derive(Debug, Clone, Default)]
pub struct OrderingRules {
    /// (dependent, dependency)：dependent 排在 dependency 之后
    afters: Vec<(OrderRef, OrderRef)>,
}

impl OrderingRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dependent` 排在 `dependency` 之后
    pub fn after(&mut self, dependent: OrderRef, dependency: OrderRef) {
        self.afters.push((dependent, dependency));
    }

    /// `first` 排在 `then` 之前
    pub fn before(&mut self, first: OrderRef, then: OrderRef) {
        self.afters.push((then, first));
    }

    pub fn len(&self) -> usize {
        self.afters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.afters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(OrderRef, OrderRef)> {
        self.afters.iter()
    }
}

/// 选项键到提供者的索引
///
/// 同一个键有多个提供者时，最后注册的提供者生效，
/// 并且它必须排在前一个提供者之后。
#[derive(Debug, Clone, Default)]
pub struct ProviderIndex {
    latest: HashMap<String, usize>,
    /// (newer, older)
    overrides: Vec<(usize, usize)>,
}

impl ProviderIndex {
    /// 按给定顺序扫描记录建立索引
    pub fn build(registry: &Registry, records: &[usize]) -> Self {
        let mut index = Self::default();
        for &idx in records {
            let record = registry.record(idx);
            if !record.has(Capabilities::PROVIDES_OPTIONS) {
                continue;
            }
            for key in record.instance().provides_options() {
                if let Some(previous) = index.latest.insert(key, idx) {
                    if previous != idx {
                        index.overrides.push((idx, previous));
                    }
                }
            }
        }
        index
    }

    /// 键当前的提供者（记录下标）
    pub fn provider(&self, key: &str) -> Option<usize> {
        self.latest.get(key).copied()
    }

    pub fn provides(&self, key: &str) -> bool {
        self.latest.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// 依赖图构建器与排序器
pub struct Sorter<'a> {
    registry: &'a Registry,
    providers: &'a ProviderIndex,
    rules: &'a OrderingRules,
    options: &'a Options,
}

impl<'a> Sorter<'a> {
    pub fn new(
        registry: &'a Registry,
        providers: &'a ProviderIndex,
        rules: &'a OrderingRules,
        options: &'a Options,
    ) -> Self {
        Self {
            registry,
            providers,
            rules,
            options,
        }
    }

    /// 对记录子集排序，返回记录下标
    ///
    /// 指向子集之外（但已注册）插件的边被忽略；引用未注册的插件返回错误。
    pub fn sort(&self, subset: &[usize]) -> Result<Vec<usize>> {
        let mut graph = DependencyGraph::new();
        for &idx in subset {
            graph.add_node(self.registry.record(idx).id());
        }

        for &(newer, older) in &self.providers.overrides {
            let newer = self.registry.record(newer).id();
            let older = self.registry.record(older).id();
            self.link(&mut graph, newer, older, newer)?;
        }

        for &idx in subset {
            let record = self.registry.record(idx);
            let id = record.id();

            if record.has(Capabilities::REQUIRES_OPTIONS) {
                for key in record.instance().requires_options() {
                    if self.options.has(&key) {
                        continue;
                    }
                    match self.providers.provider(&key) {
                        Some(provider) if provider != idx => {
                            let provider = self.registry.record(provider).id();
                            self.link(&mut graph, id, provider, id)?;
                        }
                        Some(_) => {}
                        None => {
                            return Err(PluggableError::UnresolvedOption {
                                key,
                                required_by: id.to_string(),
                            })
                        }
                    }
                }
            }

            if record.has(Capabilities::AFTER) {
                for reference in record.instance().after() {
                    self.link(&mut graph, id, &reference.resolve(), id)?;
                }
            }

            if record.has(Capabilities::BEFORE) {
                for reference in record.instance().before() {
                    self.link(&mut graph, &reference.resolve(), id, id)?;
                }
            }
        }

        for (dependent, dependency) in self.rules.iter() {
            self.link(
                &mut graph,
                &dependent.resolve(),
                &dependency.resolve(),
                CONTROLLER_DECLARER,
            )?;
        }

        let sorted = graph.top_sort()?;
        debug!("Sorted {} plugins", sorted.len());

        Ok(sorted
            .iter()
            .filter_map(|id| self.registry.index_of(id))
            .collect())
    }

    /// 添加 "dependent 在 dependency 之后" 的边
    fn link(
        &self,
        graph: &mut DependencyGraph,
        dependent: &str,
        dependency: &str,
        declared_by: &str,
    ) -> Result<()> {
        for reference in [dependent, dependency] {
            if !self.registry.contains(reference) {
                return Err(PluggableError::UnknownOrderReference {
                    reference: reference.to_string(),
                    declared_by: PluginId::from(declared_by),
                });
            }
        }

        if graph.contains_node(dependent) && graph.contains_node(dependency) {
            graph.add_edge(dependent, dependency)?;
        }
        Ok(())
    }
}
