//! Bin construction and collapsing.
//!
//! Pathway roots are expanded top-down: a node with more rare loci than
//! the expand threshold is replaced by its children, a node with fewer
//! than the minimum bin size is dropped. Gene bins and intergenic window
//! bins are added on request. Bins with the same origin are merged and
//! the result is kept in total order.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use biobin_geno::{GenotypeStore, LocusId, NodeId, NodeKind, RegionTree};

use super::bin::{Bin, BinKind};
use crate::config::{BinConfig, ConfigError};

/// Index of a bin inside a [`BinHierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinId(pub u32);

impl BinId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The ordered, deduplicated bins of a study.
#[derive(Debug)]
pub struct BinHierarchy {
    bins: Vec<Bin>,
    locus_bins: Vec<Vec<BinId>>,
    rare_loci: Vec<LocusId>,
}

struct Builder<'a> {
    tree: &'a RegionTree,
    config: &'a BinConfig,
    rare: &'a HashSet<LocusId>,
    pending: BTreeMap<BinKind, (String, Vec<LocusId>)>,
}

impl Builder<'_> {
    fn rare_loci_of(&self, node: NodeId) -> Vec<LocusId> {
        self.tree
            .accumulated_loci(node)
            .into_iter()
            .filter(|l| self.rare.contains(l))
            .collect()
    }

    fn kind_of(&self, node: NodeId) -> BinKind {
        match self.tree.node(node).kind {
            NodeKind::Group => BinKind::Group(node),
            NodeKind::Region => BinKind::Region(node),
        }
    }

    fn emit(&mut self, kind: BinKind, name: String, loci: Vec<LocusId>) {
        if loci.is_empty() {
            return;
        }
        let entry = self.pending.entry(kind).or_insert_with(|| (name, Vec::new()));
        entry.1.extend(loci);
    }

    /// Materialize `node`, or descend into its children when it is too big.
    fn expand(&mut self, node: NodeId, path: &mut Vec<NodeId>) {
        if path.contains(&node) {
            return;
        }
        let tree = self.tree;
        let loci = self.rare_loci_of(node);
        let n = tree.node(node);
        if loci.len() > self.config.expand_threshold && !n.children.is_empty() {
            debug!(
                "Expanding '{}' ({} loci) into {} children",
                n.name,
                loci.len(),
                n.children.len()
            );
            path.push(node);
            for &child in &n.children {
                self.expand(child, path);
            }
            path.pop();
        } else {
            let kind = self.kind_of(node);
            self.emit(kind, n.name.clone(), loci);
        }
    }
}

impl BinHierarchy {
    /// Build bins over the rare loci of `store`.
    ///
    /// A locus is rare when its overall MAF lies in
    /// `[config.min_maf, config.max_maf]`.
    pub fn build(
        tree: &RegionTree,
        store: &GenotypeStore,
        config: &BinConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let rare_loci: Vec<LocusId> = store
            .locus_ids()
            .filter(|&id| {
                store
                    .minor_allele_freq(id, None)
                    .is_some_and(|m| m >= config.min_maf && m <= config.max_maf)
            })
            .collect();
        let rare: HashSet<LocusId> = rare_loci.iter().copied().collect();

        let mut builder = Builder {
            tree,
            config,
            rare: &rare,
            pending: BTreeMap::new(),
        };

        if config.use_pathways {
            for root in tree.roots() {
                builder.expand(root, &mut Vec::new());
            }
        }

        if config.expand_by_genes {
            for id in tree.node_ids() {
                if tree.node(id).kind == NodeKind::Region {
                    let loci = builder.rare_loci_of(id);
                    builder.emit(BinKind::Region(id), tree.node(id).name.clone(), loci);
                }
            }
        }

        if config.include_intergenic {
            let claimed = tree.claimed_loci();
            for &id in &rare_loci {
                if claimed.contains(&id) {
                    continue;
                }
                let locus = store.locus(id);
                let width = config.intergenic_width;
                let step = config.intergenic_step;
                for window in windows_containing(locus.pos, width, step) {
                    let name = Bin::intergenic_name(&locus.chrom, window, step, width);
                    builder.emit(
                        BinKind::Intergenic {
                            chrom: locus.chrom.clone(),
                            window,
                        },
                        name,
                        vec![id],
                    );
                }
            }
        }

        let mut bins: Vec<Bin> = builder
            .pending
            .into_iter()
            .map(|(kind, (name, loci))| Bin::new(name, kind, loci))
            .filter(|b| b.n_loci() >= config.min_bin_size)
            .collect();
        bins.sort();

        let mut locus_bins = vec![Vec::new(); store.n_loci()];
        for (i, bin) in bins.iter().enumerate() {
            for &l in bin.loci() {
                locus_bins[l.index()].push(BinId(i as u32));
            }
        }

        info!(
            "Built {} bins from {} rare loci ({} loci total)",
            bins.len(),
            rare_loci.len(),
            store.n_loci()
        );

        Ok(Self {
            bins,
            locus_bins,
            rare_loci,
        })
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bin(&self, id: BinId) -> &Bin {
        &self.bins[id.index()]
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn iter(&self) -> impl Iterator<Item = (BinId, &Bin)> {
        self.bins
            .iter()
            .enumerate()
            .map(|(i, b)| (BinId(i as u32), b))
    }

    /// Memoized bin size.
    pub fn size(&self, id: BinId, store: &GenotypeStore) -> u64 {
        self.bin(id).size(store)
    }

    /// Bins containing `locus`, in bin order.
    pub fn locus_bins(&self, locus: LocusId) -> &[BinId] {
        self.locus_bins
            .get(locus.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Loci that passed the rarity filter, in store order.
    pub fn rare_loci(&self) -> &[LocusId] {
        &self.rare_loci
    }
}

/// Indices k with `k*step <= pos < k*step + width`.
fn windows_containing(pos: u64, width: u64, step: u64) -> impl Iterator<Item = u64> {
    let last = pos / step;
    let first = if pos + 1 > width {
        (pos + 1 - width).div_ceil(step)
    } else {
        0
    };
    first..=last
}
