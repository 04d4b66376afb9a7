//! 依赖图与稳定拓扑排序
//!
//! 节点存放在按插入顺序编号的数组里，边用下标表示，不存在对象间的互相引用。
//! 排序使用 Kahn 算法，就绪节点按插入顺序出队，因此没有约束的节点
//! 保持注册顺序。

use crate::types::PluginId;
use crate::{PluggableError, Result};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// 有向依赖图
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// 节点ID，下标即插入顺序
    nodes: Vec<PluginId>,
    /// ID -> 下标
    index: HashMap<PluginId, usize>,
    /// 依赖 -> 依赖它的节点
    dependents: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加节点，已存在时返回原下标
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        self.dependents.push(BTreeSet::new());
        idx
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 添加边：`dependent` 必须排在 `dependency` 之后。
    ///
    /// 两端都必须已经是图中的节点；重复的边只记一次。
    pub fn add_edge(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        let from = self.node_index(dependency, dependent)?;
        let to = self.node_index(dependent, dependency)?;
        self.dependents[from].insert(to);
        Ok(())
    }

    /// `dependent` 是否直接依赖 `dependency`
    pub fn has_edge(&self, dependent: &str, dependency: &str) -> bool {
        match (self.index.get(dependency), self.index.get(dependent)) {
            (Some(&from), Some(&to)) => self.dependents[from].contains(&to),
            _ => false,
        }
    }

    /// 稳定拓扑排序
    pub fn top_sort(&self) -> Result<Vec<PluginId>> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for targets in &self.dependents {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        // 小顶堆：多个节点同时就绪时先取插入早的
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(idx)) = ready.pop() {
            sorted.push(self.nodes[idx].clone());
            for &to in &self.dependents[idx] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.push(Reverse(to));
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let nodes = in_degree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(idx, _)| self.nodes[idx].clone())
                .collect();
            return Err(PluggableError::CycleDetected { nodes });
        }

        Ok(sorted)
    }

    fn node_index(&self, id: &str, declared_by: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| PluggableError::UnknownOrderReference {
                reference: id.to_string(),
                declared_by: declared_by.to_string(),
            })
    }
}
