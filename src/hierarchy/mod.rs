//! Hierarchy maintenance.
//!
//! Tree-shaped entities keep a closure table: one (ascendor, descendor)
//! pair for every ancestor relationship, including the reflexive pair
//! (n, n). The closure makes "all descendants of X" a single lookup
//! instead of a recursive walk.
//!
//! Mutations lock the affected tree by its root. Lock acquisition is a
//! bounded retry; a tree that stays busy fails the operation with
//! `Conflict` rather than blocking indefinitely.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;

use dashmap::DashMap;
use thiserror::Error;

/// Attempts before a busy tree aborts the mutation.
const LOCK_RETRIES: usize = 64;

#[derive(Debug, Error)]
pub enum ClosureError {
    #[error("Unknown node '{node}'")]
    UnknownNode { node: String },

    #[error("Node '{node}' already exists")]
    DuplicateNode { node: String },

    #[error("Moving '{node}' under '{parent}' would create a cycle")]
    WouldCycle { node: String, parent: String },

    #[error("Tree rooted at '{root}' is busy, gave up after {retries} attempts")]
    Conflict { root: String, retries: usize },
}

pub type ClosureResult<T> = Result<T, ClosureError>;

/// In-memory closure table over one entity's tree.
///
/// Each node stores its full ancestor chain, self first, root last. The
/// chain doubles as the closure row set: every element is an ascendor of
/// the chain's owner.
#[derive(Debug, Default)]
pub struct ClosureStore {
    parents: DashMap<String, Option<String>>,
    chains: DashMap<String, Vec<String>>,
    /// Ascendor → strict descendants. Kept in lockstep with `chains` so
    /// descendant reads are one lookup, not a scan of every chain.
    descendants: DashMap<String, BTreeSet<String>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ClosureStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn contains(&self, node: &str) -> bool {
        self.parents.contains_key(node)
    }

    pub fn parent_of(&self, node: &str) -> ClosureResult<Option<String>> {
        self.parents
            .get(node)
            .map(|p| p.clone())
            .ok_or_else(|| unknown(node))
    }

    /// Ancestors of `node`, the node itself first (the reflexive closure
    /// pair), then nearest ancestor outward to the root.
    pub fn ancestors_of(&self, node: &str) -> ClosureResult<Vec<String>> {
        let chain = self.chains.get(node).ok_or_else(|| unknown(node))?;
        Ok(chain.clone())
    }

    /// All descendants of `node`, sorted, excluding the node itself.
    /// A single index lookup regardless of store size.
    pub fn descendants_of(&self, node: &str) -> ClosureResult<Vec<String>> {
        let set = self.descendants.get(node).ok_or_else(|| unknown(node))?;
        Ok(set.iter().cloned().collect())
    }

    pub fn is_ancestor(&self, ascendor: &str, descendor: &str) -> ClosureResult<bool> {
        let chain = self.chains.get(descendor).ok_or_else(|| unknown(descendor))?;
        Ok(chain.iter().any(|a| a == ascendor))
    }

    /// Every (ascendor, descendor) pair, reflexive pairs included,
    /// sorted for stable comparison.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for entry in self.chains.iter() {
            for ascendor in entry.value() {
                out.push((ascendor.clone(), entry.key().clone()));
            }
        }
        out.sort();
        out
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a node under `parent`, or as a new root when `parent` is
    /// `None`.
    pub fn insert(&self, node: &str, parent: Option<&str>) -> ClosureResult<()> {
        if self.contains(node) {
            return Err(ClosureError::DuplicateNode {
                node: node.to_string(),
            });
        }
        match parent {
            None => {
                self.parents.insert(node.to_string(), None);
                self.chains.insert(node.to_string(), vec![node.to_string()]);
                self.descendants.insert(node.to_string(), BTreeSet::new());
                Ok(())
            }
            Some(parent) => self.locked(parent, || {
                let mut chain = self
                    .chains
                    .get(parent)
                    .map(|c| c.clone())
                    .ok_or_else(|| unknown(parent))?;
                chain.insert(0, node.to_string());
                self.parents
                    .insert(node.to_string(), Some(parent.to_string()));
                self.descendants.insert(node.to_string(), BTreeSet::new());
                for ancestor in chain.iter().skip(1) {
                    if let Some(mut set) = self.descendants.get_mut(ancestor) {
                        set.insert(node.to_string());
                    }
                }
                self.chains.insert(node.to_string(), chain);
                Ok(())
            }),
        }
    }

    /// Move `node` (with its whole subtree) under `new_parent`, or make
    /// it a root when `None`.
    pub fn reparent(&self, node: &str, new_parent: Option<&str>) -> ClosureResult<()> {
        if !self.contains(node) {
            return Err(unknown(node));
        }
        if let Some(parent) = new_parent {
            if parent == node || self.is_ancestor(node, parent)? {
                return Err(ClosureError::WouldCycle {
                    node: node.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        self.locked_pair(node, new_parent, || {
            if let Some(parent) = new_parent {
                // Revalidate under the lock: a concurrent move may have
                // pushed the new parent into our subtree.
                if self.is_ancestor(node, parent)? {
                    return Err(ClosureError::WouldCycle {
                        node: node.to_string(),
                        parent: parent.to_string(),
                    });
                }
            }
            let subtree = self.subtree(node)?;
            self.parents
                .insert(node.to_string(), new_parent.map(str::to_string));
            self.rebuild(&subtree)
        })
    }

    /// Delete a node. Its direct children are promoted to the deleted
    /// node's parent so the rest of the subtree stays attached.
    pub fn remove(&self, node: &str) -> ClosureResult<()> {
        if !self.contains(node) {
            return Err(unknown(node));
        }
        self.locked(node, || {
            let grandparent = self.parent_of(node)?;
            let children: Vec<String> = self
                .parents
                .iter()
                .filter(|entry| entry.value().as_deref() == Some(node))
                .map(|entry| entry.key().clone())
                .collect();
            let subtree = self.subtree(node)?;

            for child in &children {
                self.parents.insert(child.clone(), grandparent.clone());
            }
            self.parents.remove(node);
            if let Some((_, old)) = self.chains.remove(node) {
                for ancestor in old.iter().skip(1) {
                    if let Some(mut set) = self.descendants.get_mut(ancestor) {
                        set.remove(node);
                    }
                }
            }
            self.descendants.remove(node);

            let survivors: Vec<String> =
                subtree.into_iter().filter(|n| n != node).collect();
            self.rebuild(&survivors)
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// A node's subtree from the current chains, the node included.
    fn subtree(&self, node: &str) -> ClosureResult<Vec<String>> {
        let mut out = self.descendants_of(node)?;
        out.push(node.to_string());
        Ok(out)
    }

    /// Recompute chains for the given nodes by walking parent pointers.
    fn rebuild(&self, nodes: &[String]) -> ClosureResult<()> {
        for node in nodes {
            let mut chain = vec![node.clone()];
            let mut cursor = self.parent_of(node)?;
            // The walk is bounded by the map size; a longer walk means a
            // corrupted parent pointer.
            let limit = self.parents.len();
            while let Some(parent) = cursor {
                if chain.len() > limit {
                    return Err(ClosureError::WouldCycle {
                        node: node.clone(),
                        parent: parent.clone(),
                    });
                }
                cursor = self.parent_of(&parent)?;
                chain.push(parent);
            }
            // Re-key the descendant index from the old chain to the new.
            if let Some(old) = self.chains.insert(node.clone(), chain.clone()) {
                for ancestor in old.iter().skip(1) {
                    if let Some(mut set) = self.descendants.get_mut(ancestor) {
                        set.remove(node);
                    }
                }
            }
            for ancestor in chain.iter().skip(1) {
                if let Some(mut set) = self.descendants.get_mut(ancestor) {
                    set.insert(node.clone());
                }
            }
        }
        Ok(())
    }

    fn root_of(&self, node: &str) -> ClosureResult<String> {
        let chain = self.chains.get(node).ok_or_else(|| unknown(node))?;
        Ok(chain.last().cloned().unwrap_or_else(|| node.to_string()))
    }

    fn root_lock(&self, root: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(root.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the lock of `node`'s tree. The root is
    /// revalidated after acquisition in case a concurrent reparent moved
    /// the tree.
    fn locked<T, F>(&self, node: &str, f: F) -> ClosureResult<T>
    where
        F: FnOnce() -> ClosureResult<T>,
    {
        let mut op = Some(f);
        let mut root = self.root_of(node)?;
        for _ in 0..LOCK_RETRIES {
            let lock = self.root_lock(&root);
            let guard = match acquire(&lock) {
                Some(guard) => guard,
                None => {
                    thread::yield_now();
                    continue;
                }
            };
            let current = self.root_of(node)?;
            if current != root {
                drop(guard);
                root = current;
                continue;
            }
            if let Some(f) = op.take() {
                return f();
            }
        }
        Err(ClosureError::Conflict {
            root,
            retries: LOCK_RETRIES,
        })
    }

    /// Like `locked`, but for operations spanning two trees. Locks are
    /// taken in sorted root order so two movers cannot deadlock.
    fn locked_pair<T, F>(&self, node: &str, other: Option<&str>, f: F) -> ClosureResult<T>
    where
        F: FnOnce() -> ClosureResult<T>,
    {
        let mut op = Some(f);
        for _ in 0..LOCK_RETRIES {
            let root_a = self.root_of(node)?;
            let root_b = match other {
                Some(other) => self.root_of(other)?,
                None => root_a.clone(),
            };
            let (first, second) = if root_a <= root_b {
                (root_a.clone(), root_b.clone())
            } else {
                (root_b.clone(), root_a.clone())
            };

            let lock_first = self.root_lock(&first);
            let guard_first = match acquire(&lock_first) {
                Some(guard) => guard,
                None => {
                    thread::yield_now();
                    continue;
                }
            };
            let lock_second;
            let guard_second = if second != first {
                lock_second = self.root_lock(&second);
                match acquire(&lock_second) {
                    Some(guard) => Some(guard),
                    None => {
                        drop(guard_first);
                        thread::yield_now();
                        continue;
                    }
                }
            } else {
                None
            };

            let still_a = self.root_of(node)?;
            let still_b = match other {
                Some(other) => self.root_of(other)?,
                None => still_a.clone(),
            };
            if still_a != root_a || still_b != root_b {
                drop(guard_second);
                drop(guard_first);
                continue;
            }
            if let Some(f) = op.take() {
                return f();
            }
        }
        Err(ClosureError::Conflict {
            root: self.root_of(node)?,
            retries: LOCK_RETRIES,
        })
    }
}

fn acquire(lock: &Mutex<()>) -> Option<MutexGuard<'_, ()>> {
    match lock.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

fn unknown(node: &str) -> ClosureError {
    ClosureError::UnknownNode {
        node: node.to_string(),
    }
}
