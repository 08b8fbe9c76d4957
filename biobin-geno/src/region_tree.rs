//! Group/region nesting supplied by the annotation layer.
//!
//! Groups (pathways) nest other groups and regions; regions (genes)
//! cover a chromosome interval and own the loci inside it. Nodes are
//! addressed by stable [`NodeId`]s in insertion order.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::locus::LocusId;
use crate::store::GenotypeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Group,
    Region,
}

/// Chromosome interval `[start, end]`, inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn contains(&self, chrom: &str, pos: u64) -> bool {
        self.chrom == chrom && pos >= self.start && pos <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct RegionNode {
    pub name: String,
    pub kind: NodeKind,
    pub span: Option<Span>,
    /// Loci owned directly by this node.
    pub loci: Vec<LocusId>,
    /// Ordered child nodes.
    pub children: Vec<NodeId>,
    has_parent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegionTree {
    nodes: Vec<RegionNode>,
}

impl RegionTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: String, kind: NodeKind, span: Option<Span>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(RegionNode {
            name,
            kind,
            span,
            loci: Vec::new(),
            children: Vec::new(),
            has_parent: false,
        });
        id
    }

    pub fn add_group(&mut self, name: impl Into<String>) -> NodeId {
        self.push(name.into(), NodeKind::Group, None)
    }

    pub fn add_region(
        &mut self,
        name: impl Into<String>,
        chrom: &str,
        start: u64,
        end: u64,
    ) -> NodeId {
        let chrom = chrom.strip_prefix("chr").unwrap_or(chrom).to_string();
        self.push(name.into(), NodeKind::Region, Some(Span { chrom, start, end }))
    }

    /// Nest `child` under `parent`. Rejects edges that would form a cycle.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent == child || self.reaches(child, parent) {
            bail!(
                "nesting '{}' under '{}' would create a cycle",
                self.nodes[child.index()].name,
                self.nodes[parent.index()].name
            );
        }
        let node = &mut self.nodes[parent.index()];
        if !node.children.contains(&child) {
            node.children.push(child);
        }
        self.nodes[child.index()].has_parent = true;
        Ok(())
    }

    pub fn add_locus(&mut self, node: NodeId, locus: LocusId) {
        let loci = &mut self.nodes[node.index()].loci;
        if !loci.contains(&locus) {
            loci.push(locus);
        }
    }

    /// Give every region the store loci that fall inside its span.
    pub fn assign_loci(&mut self, store: &GenotypeStore) {
        for id in store.locus_ids() {
            let locus = store.locus(id);
            for node in self.nodes.iter_mut() {
                if let Some(span) = &node.span {
                    if span.contains(&locus.chrom, locus.pos) && !node.loci.contains(&id) {
                        node.loci.push(id);
                    }
                }
            }
        }
    }

    pub fn node(&self, id: NodeId) -> &RegionNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    /// Nodes without a parent, in insertion order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|id| !self.nodes[id.index()].has_parent)
            .collect()
    }

    /// Union of the loci of `id` and all of its descendants.
    pub fn accumulated_loci(&self, id: NodeId) -> Vec<LocusId> {
        let mut seen_nodes = HashSet::new();
        let mut loci = HashSet::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !seen_nodes.insert(n) {
                continue;
            }
            let node = &self.nodes[n.index()];
            loci.extend(node.loci.iter().copied());
            stack.extend(node.children.iter().copied());
        }
        let mut out: Vec<LocusId> = loci.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Loci claimed by at least one region.
    pub fn claimed_loci(&self) -> HashSet<LocusId> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Region)
            .flat_map(|n| n.loci.iter().copied())
            .collect()
    }

    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if seen.insert(n) {
                stack.extend(self.nodes[n.index()].children.iter().copied());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_and_accumulation() {
        let mut t = RegionTree::new();
        let pathway = t.add_group("P1");
        let g1 = t.add_region("GENE1", "chr1", 100, 200);
        let g2 = t.add_region("GENE2", "1", 300, 400);
        t.add_child(pathway, g1).unwrap();
        t.add_child(pathway, g2).unwrap();
        t.add_locus(g1, LocusId(0));
        t.add_locus(g1, LocusId(1));
        t.add_locus(g2, LocusId(1));
        t.add_locus(g2, LocusId(5));

        assert_eq!(t.roots(), vec![pathway]);
        assert_eq!(
            t.accumulated_loci(pathway),
            vec![LocusId(0), LocusId(1), LocusId(5)]
        );
        assert_eq!(t.node(g1).span.as_ref().unwrap().chrom, "1");
    }

    #[test]
    fn test_cycle_rejected() {
        let mut t = RegionTree::new();
        let a = t.add_group("A");
        let b = t.add_group("B");
        t.add_child(a, b).unwrap();
        assert!(t.add_child(b, a).is_err());
        assert!(t.add_child(a, a).is_err());
    }
}
