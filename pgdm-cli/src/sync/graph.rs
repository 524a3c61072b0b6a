//! Dependency graph logic for ordering bulk imports
//!
//! This module provides functions to:
//! - Build a dependency graph from foreign-key references
//! - Order tables so referenced tables are loaded first
//! - Detect reference cycles

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::db::Catalog;
use crate::error::{Result, SyncError};

/// Table with the tables it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub table: String,
    /// Referenced tables, self-references and the registry excluded
    pub depends_on: BTreeSet<String>,
}

/// Dependency graph for a set of tables
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in discovery order: input tables first, then discovered ones
    nodes: Vec<DependencyNode>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, or merge dependencies into an existing node
    pub fn add_table<I, S>(&mut self, table: &str, depends_on: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deps = depends_on
            .into_iter()
            .map(Into::into)
            // Don't include self-references
            .filter(|dep| dep != table);

        match self.index.get(table) {
            Some(&idx) => self.nodes[idx].depends_on.extend(deps),
            None => {
                self.index.insert(table.to_string(), self.nodes.len());
                self.nodes.push(DependencyNode {
                    table: table.to_string(),
                    depends_on: deps.collect(),
                });
            }
        }
    }

    /// Build the graph for `tables`, following references to tables outside
    /// the input set.
    pub async fn load<C: Catalog + ?Sized>(
        catalog: &mut C,
        tables: &[String],
        registry_table: &str,
    ) -> Result<Self> {
        let mut graph = DependencyGraph::new();
        let mut pending: Vec<String> = Vec::new();
        let mut queued: HashSet<String> = HashSet::new();

        for table in tables {
            if queued.insert(table.clone()) {
                pending.push(table.clone());
            }
        }

        let mut next = 0;
        while next < pending.len() {
            let table = pending[next].clone();
            next += 1;

            let depends_on: BTreeSet<String> = catalog
                .referenced_tables(&table)
                .await?
                .into_iter()
                .filter(|dep| *dep != table && dep != registry_table)
                .collect();

            for dep in &depends_on {
                if queued.insert(dep.clone()) {
                    log::debug!("Discovered {} through a reference from {}", dep, table);
                    pending.push(dep.clone());
                }
            }
            graph.add_table(&table, depends_on);
        }

        log::debug!("Dependency graph has {} table(s)", graph.len());
        Ok(graph)
    }

    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn node(&self, table: &str) -> Option<&DependencyNode> {
        self.index.get(table).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, table: &str) -> bool {
        self.index.contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert order: every table after the tables it references.
    ///
    /// Depth-first placement in discovery order. Tables that do not depend on
    /// each other keep their relative order, so resolving an already sorted
    /// list returns it unchanged.
    pub fn resolve(&self) -> Result<Vec<String>> {
        let mut placed: HashSet<&str> = HashSet::new();
        let mut resolving: Vec<&str> = Vec::new();
        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            self.place(node, &mut placed, &mut resolving, &mut order)?;
        }
        Ok(order)
    }

    fn place<'a>(
        &'a self,
        node: &'a DependencyNode,
        placed: &mut HashSet<&'a str>,
        resolving: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if placed.contains(node.table.as_str()) {
            return Ok(());
        }
        if let Some(start) = resolving.iter().position(|t| *t == node.table) {
            let mut cycle: Vec<String> = resolving[start..].iter().map(|t| t.to_string()).collect();
            cycle.push(node.table.clone());
            return Err(SyncError::CyclicDependency { cycle });
        }

        resolving.push(&node.table);
        for dep in &node.depends_on {
            // Dependencies outside the graph are assumed to be loaded already
            if let Some(dep_node) = self.node(dep) {
                self.place(dep_node, placed, resolving, order)?;
            }
        }
        resolving.pop();

        placed.insert(&node.table);
        order.push(node.table.clone());
        Ok(())
    }

    /// Delete order (dependents before dependencies - reverse of insert)
    pub fn delete_order(&self) -> Result<Vec<String>> {
        let mut order = self.resolve()?;
        order.reverse();
        Ok(order)
    }
}

/// Load order for `tables`, including tables they reference
pub async fn resolve_tables<C: Catalog + ?Sized>(
    catalog: &mut C,
    tables: &[String],
    registry_table: &str,
) -> Result<Vec<String>> {
    DependencyGraph::load(catalog, tables, registry_table)
        .await?
        .resolve()
}
