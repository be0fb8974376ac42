use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::snapshot::snapshot_model::{Element, ElementId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("element {0} not found")]
pub struct ElementNotFound(pub ElementId);

/// O(1) id lookup for one snapshot. Built once, never mutated.
#[derive(Debug, Clone, Default)]
pub struct ElementIndex {
    by_id: HashMap<ElementId, Element>,
}

impl ElementIndex {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            by_id: elements.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn resolve(&self, id: ElementId) -> Result<&Element, ElementNotFound> {
        self.by_id.get(&id).ok_or(ElementNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Session-scoped mapping from structural node signatures to element ids.
///
/// A signature present in consecutive trees keeps its id. A signature that
/// disappears is retired; its id is never handed out again. A fresh registry
/// numbers nodes 1..n in traversal order, so identical trees get identical ids.
#[derive(Debug, Clone)]
pub struct IdRegistry {
    next: u32,
    live: HashMap<String, ElementId>,
    retired: u64,
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdRegistry {
    pub fn new() -> Self {
        Self {
            next: 1,
            live: HashMap::new(),
            retired: 0,
        }
    }

    /// Assign ids to signatures given in traversal order.
    pub fn assign(&mut self, signatures: &[String]) -> Vec<ElementId> {
        let mut live = HashMap::with_capacity(signatures.len());
        let mut ids = Vec::with_capacity(signatures.len());

        for sig in signatures {
            let id = match self.live.get(sig) {
                Some(id) if !live.contains_key(sig) => *id,
                _ => {
                    let id = ElementId(self.next);
                    self.next += 1;
                    id
                }
            };
            live.insert(sig.clone(), id);
            ids.push(id);
        }

        let kept: HashSet<&String> = live.keys().collect();
        let retired = self.live.keys().filter(|sig| !kept.contains(sig)).count();
        if retired > 0 {
            debug!(retired, "retired element ids");
        }
        self.retired += retired as u64;
        self.live = live;

        ids
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn retired_count(&self) -> u64 {
        self.retired
    }
}
