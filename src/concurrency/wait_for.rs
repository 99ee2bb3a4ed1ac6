//! Wait-for graph used for deadlock detection.

use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet};

/// Directed graph: an edge `a -> b` means transaction `a` waits for a lock `b` holds.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `waiter -> holder`. Returns false if the edge was already present.
    pub fn add_edge(&mut self, waiter: TransactionId, holder: TransactionId) -> bool {
        self.edges.entry(waiter).or_default().insert(holder)
    }

    pub fn waits_for(&self, waiter: TransactionId) -> Vec<TransactionId> {
        self.edges
            .get(&waiter)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Depth-first search over the whole graph; a back edge to a vertex still
    /// on the recursion stack is a cycle.
    pub fn has_cycle(&self) -> bool {
        let mut marks: HashMap<TransactionId, Mark> = HashMap::new();
        self.edges
            .keys()
            .any(|&start| !marks.contains_key(&start) && self.visit(start, &mut marks))
    }

    fn visit(&self, tid: TransactionId, marks: &mut HashMap<TransactionId, Mark>) -> bool {
        marks.insert(tid, Mark::OnStack);
        if let Some(targets) = self.edges.get(&tid) {
            for &next in targets {
                match marks.get(&next) {
                    Some(Mark::OnStack) => return true,
                    Some(Mark::Done) => {}
                    None => {
                        if self.visit(next, marks) {
                            return true;
                        }
                    }
                }
            }
        }
        marks.insert(tid, Mark::Done);
        false
    }
}
