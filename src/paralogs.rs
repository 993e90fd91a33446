use identity_hash::IntMap;
use log::*;

use crate::errors::DataError;
use crate::species::{SpeciesBook, SpeciesSet};
use crate::tree::{GeneTree, NodeID};

/// Collapse clades made of a single species (in-paralogs) down to a single leaf.
///
/// The tree is processed as if unrooted: after the bottom-up pass, clades that
/// straddle the current root are collapsed as well. Returns the number of
/// removed leaves.
pub fn remove_in_paralogs(tree: &mut GeneTree, book: &SpeciesBook) -> Result<usize, DataError> {
    tree.suppress_unifurcations();
    let root = tree.root();
    if tree.is_leaf(root) {
        return Ok(0);
    }
    tree.resolve_polytomy(root);

    let mut removed = 0;
    let mut species = IntMap::<NodeID, SpeciesSet>::default();
    for n in tree.postorder(root) {
        let set = if tree.is_leaf(n) {
            SpeciesSet::from_iter([book.species_of(tree, n)?])
        } else {
            tree.children(n).iter().flat_map(|c| species[c].iter().copied()).collect()
        };
        if !tree.is_leaf(n) && set.len() == 1 {
            for c in tree.children(n)[1..].to_vec() {
                tree.delete_subtree(c);
                removed += 1;
            }
        }
        species.insert(n, set);
    }

    if species[&root].len() > 1 && tree.children(root).iter().any(|c| species[c].len() == 1) {
        removed += collapse_around_root(tree, &species);
    }

    tree.suppress_unifurcations();
    debug!("{} in-paralogs removed", removed);
    Ok(removed)
}

/// Find the deepest node whose outside, i.e. all the leaves not below it, is
/// made of a single species, and collapse this outside to its first leaf.
fn collapse_around_root(tree: &mut GeneTree, species: &IntMap<NodeID, SpeciesSet>) -> usize {
    let root = tree.root();
    let outside_of = |n: NodeID, above: &SpeciesSet| -> SpeciesSet {
        let mut outside = above.clone();
        for s in tree.siblings(n) {
            outside.extend(species[&s].iter().copied());
        }
        outside
    };

    let mut deepest: Option<(NodeID, usize)> = None;
    let mut todo = tree
        .children(root)
        .iter()
        .map(|&c| (c, outside_of(c, &SpeciesSet::default()), 1))
        .collect::<Vec<_>>();
    while let Some((n, outside, depth)) = todo.pop() {
        // The outside can only grow when going down
        if outside.len() > 1 {
            continue;
        }
        if deepest.map(|d| d.1 < depth).unwrap_or(true) {
            deepest = Some((n, depth));
        }
        for &c in tree.children(n) {
            todo.push((c, outside_of(c, &outside), depth + 1));
        }
    }

    if let Some((n, _)) = deepest {
        let inside = tree.descendants(n);
        let outside_leaves = tree
            .leaves(root)
            .into_iter()
            .filter(|l| !inside.contains(l))
            .collect::<Vec<_>>();
        for &l in outside_leaves.iter().skip(1) {
            tree.prune_leaf(l);
        }
        outside_leaves.len().saturating_sub(1)
    } else {
        0
    }
}
