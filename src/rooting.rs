use anyhow::Result;
use identity_hash::IntMap;
use log::*;

use crate::species::{SpeciesBook, SpeciesSet};
use crate::tree::{GeneTree, NodeID};

/// An optimal rooting edge, identified by the node below it.
#[derive(Debug, Clone)]
pub struct Tie {
    pub node: NodeID,
    /// The species on each side of the edge
    pub sides: (SpeciesSet, SpeciesSet),
}

#[derive(Debug, Clone)]
pub struct Rooting {
    pub best: NodeID,
    pub score: usize,
    pub ties: Vec<Tie>,
}

/// The cost of joining two sides `a` and `b` under a single node.
fn score(total: &SpeciesSet, a: &SpeciesSet, b: &SpeciesSet) -> usize {
    if a.is_disjoint(b) {
        0
    } else if total == a || total == b {
        if a == b {
            1
        } else {
            2
        }
    } else {
        3
    }
}

struct Pass {
    set: SpeciesSet,
    score: usize,
}

fn edge_score(up: &Pass, down: &Pass) -> usize {
    let total = &up.set | &down.set;
    up.score + down.score + score(&total, &up.set, &down.set)
}

/// Find the edges on which rooting the tree minimizes the duplication score.
///
/// Every edge is scored from a bottom-up pass (the species and score of the
/// subtree below each node) and a top-down one (the species and score of
/// everything outside of it). The tree is made strictly binary beforehand.
/// Edges leading to a leaf are never selected, except in a two-leaves tree where
/// the current root is kept.
pub fn min_root(tree: &mut GeneTree, book: &SpeciesBook) -> Result<Rooting> {
    tree.suppress_unifurcations();
    let root = tree.root();
    if tree.is_leaf(root) {
        return Ok(Rooting { best: root, score: 0, ties: Vec::new() });
    }
    tree.resolve_polytomies();

    let mut down = IntMap::<NodeID, Pass>::default();
    for n in tree.postorder(root) {
        let pass = if tree.is_leaf(n) {
            Pass { set: SpeciesSet::from_iter([book.species_of(tree, n)?]), score: 0 }
        } else {
            let [left, right] = tree.pair(n)?;
            let (l, r) = (&down[&left], &down[&right]);
            let set = &l.set | &r.set;
            let score = l.score + r.score + score(&set, &l.set, &r.set);
            Pass { set, score }
        };
        down.insert(n, pass);
    }

    let [left, right] = tree.pair(root)?;
    let mut up = IntMap::<NodeID, Pass>::default();
    up.insert(left, Pass { set: down[&right].set.clone(), score: down[&right].score });
    up.insert(right, Pass { set: down[&left].set.clone(), score: down[&left].score });

    let mut min_score = edge_score(&up[&left], &down[&left]);
    let best = if !tree.is_leaf(left) {
        left
    } else if !tree.is_leaf(right) {
        right
    } else {
        root
    };
    let mut ties = vec![best];

    for n in tree.preorder(root) {
        if n == left || n == right || tree.is_leaf(n) {
            continue;
        }
        let Some(parent) = tree.parent(n) else { continue };
        let [a, b] = tree.pair(parent)?;
        let other = if a == n { b } else { a };

        let (p, o) = (&up[&parent], &down[&other]);
        let set = &p.set | &o.set;
        let score = p.score + o.score + score(&set, &p.set, &o.set);
        let pass = Pass { set, score };

        let total = edge_score(&pass, &down[&n]);
        up.insert(n, pass);
        if total < min_score {
            min_score = total;
            ties = vec![n];
        } else if total == min_score {
            ties.push(n);
        }
    }

    debug!("Best root had score {}; there were {} ties", min_score, ties.len());
    let ties = ties
        .into_iter()
        .map(|n| {
            let sides = if n == root {
                (down[&left].set.clone(), down[&right].set.clone())
            } else {
                (down[&n].set.clone(), up[&n].set.clone())
            };
            Tie { node: n, sides }
        })
        .collect::<Vec<_>>();
    Ok(Rooting { best: ties[0].node, score: min_score, ties })
}
