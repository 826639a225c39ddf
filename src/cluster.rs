//! Union-find clustering over match edges.
//!
//! Accepted edges only ever join clusters; nothing in the automatic path
//! splits one. The engine unions record nodes with each other and with
//! the canonical companies they matched, then reads the final partition
//! back out. Nodes are interned to dense indices so the hot loop works
//! on plain vectors.
//!
//! A structurally impossible parent table (index out of range, or a walk
//! that does not terminate) means the run's bookkeeping can no longer be
//! trusted; those surface as [`PipelineError::ClusterCorruption`] and the
//! caller must abort without committing.

use std::collections::HashMap;

use crate::company::CompanyId;
use crate::error::PipelineError;
use crate::record::RecordId;

/// One node in the cluster graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterNode {
    /// A raw record in the current batch.
    Record(RecordId),
    /// An existing canonical company acting as cluster representative.
    Company(CompanyId),
}

/// Disjoint-set forest with path compression and union by size.
#[derive(Debug, Default)]
pub struct ClusterSet {
    parents: Vec<usize>,
    sizes: Vec<u32>,
    index: HashMap<ClusterNode, usize>,
    nodes: Vec<ClusterNode>,
}

impl ClusterSet {
    /// An empty cluster set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interned nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Interns a node, returning its dense index. Idempotent.
    pub fn intern(&mut self, node: ClusterNode) -> usize {
        if let Some(idx) = self.index.get(&node) {
            return *idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.parents.push(idx);
        self.sizes.push(1);
        self.index.insert(node, idx);
        idx
    }

    /// Root index of `idx`, compressing the path walked.
    fn find(&mut self, idx: usize) -> Result<usize, PipelineError> {
        let bound = self.parents.len();
        let mut current = idx;
        let mut steps = 0usize;
        loop {
            let parent = *self
                .parents
                .get(current)
                .ok_or_else(|| corruption(format!("parent index {current} out of range")))?;
            if parent == current {
                break;
            }
            current = parent;
            steps += 1;
            if steps > bound {
                return Err(corruption(format!(
                    "parent walk from {idx} did not terminate"
                )));
            }
        }
        let root = current;
        // Second pass: point everything on the walked path at the root.
        let mut rewrite = idx;
        while rewrite != root {
            let next = self.parents[rewrite];
            self.parents[rewrite] = root;
            rewrite = next;
        }
        Ok(root)
    }

    /// Joins the clusters containing `a` and `b`, interning either side
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ClusterCorruption` if the parent table is
    /// structurally broken; the run must abort.
    pub fn union(&mut self, a: ClusterNode, b: ClusterNode) -> Result<(), PipelineError> {
        let ia = self.intern(a);
        let ib = self.intern(b);
        let ra = self.find(ia)?;
        let rb = self.find(ib)?;
        if ra == rb {
            return Ok(());
        }
        // Attach the smaller tree under the larger; ties go to the lower
        // index so rebuilds of the same edge list land identically.
        let (winner, loser) = if self.sizes[ra] > self.sizes[rb]
            || (self.sizes[ra] == self.sizes[rb] && ra < rb)
        {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parents[loser] = winner;
        self.sizes[winner] += self.sizes[loser];
        Ok(())
    }

    /// Whether two nodes currently share a cluster. Interns either side
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ClusterCorruption` if the parent table is
    /// structurally broken.
    pub fn same_cluster(&mut self, a: ClusterNode, b: ClusterNode) -> Result<bool, PipelineError> {
        let ia = self.intern(a);
        let ib = self.intern(b);
        Ok(self.find(ia)? == self.find(ib)?)
    }

    /// The final partition: every cluster's members sorted, clusters
    /// ordered by their first member. Deterministic for a given node and
    /// edge set regardless of insertion order quirks.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ClusterCorruption` if the parent table is
    /// structurally broken.
    pub fn clusters(&mut self) -> Result<Vec<Vec<ClusterNode>>, PipelineError> {
        let mut by_root: HashMap<usize, Vec<ClusterNode>> = HashMap::new();
        for idx in 0..self.nodes.len() {
            let root = self.find(idx)?;
            by_root.entry(root).or_default().push(self.nodes[idx]);
        }
        let mut clusters: Vec<Vec<ClusterNode>> = by_root.into_values().collect();
        for members in &mut clusters {
            members.sort_unstable();
        }
        clusters.sort_unstable_by(|a, b| a[0].cmp(&b[0]));
        Ok(clusters)
    }

    #[cfg(test)]
    fn force_parent(&mut self, idx: usize, parent: usize) {
        self.parents[idx] = parent;
    }
}

fn corruption(reason: String) -> PipelineError {
    PipelineError::ClusterCorruption { reason }
}
