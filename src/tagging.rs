use anyhow::Result;
use identity_hash::IntMap;

use crate::species::{species_sets, SpeciesBook, SpeciesSet};
use crate::tree::{GeneTree, NodeID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Speciation,
    Duplication,
}

/// A binary gene tree where every internal node is labeled as a speciation or a
/// duplication, along with the species and duplications count of each subtree.
#[derive(Debug, Clone)]
pub struct TaggedTree {
    pub tree: GeneTree,
    species: IntMap<NodeID, SpeciesSet>,
    events: IntMap<NodeID, Event>,
    dups: IntMap<NodeID, usize>,
    n_dups: usize,
}

impl TaggedTree {
    pub fn species(&self, n: NodeID) -> &SpeciesSet {
        &self.species[&n]
    }

    pub fn event(&self, n: NodeID) -> Option<Event> {
        self.events.get(&n).copied()
    }

    pub fn is_duplication(&self, n: NodeID) -> bool {
        self.event(n) == Some(Event::Duplication)
    }

    /// Number of duplications in the subtree rooted at `n`, `n` included.
    pub fn dups(&self, n: NodeID) -> usize {
        self.dups[&n]
    }

    pub fn n_dups(&self) -> usize {
        self.n_dups
    }

    pub fn n_species(&self) -> usize {
        self.species(self.tree.root()).len()
    }

    /// The internal nodes, children first.
    pub fn internal_postorder(&self) -> Vec<NodeID> {
        self.tree.postorder(self.tree.root()).into_iter().filter(|&n| !self.tree.is_leaf(n)).collect()
    }
}

/// Tag a tree according to its current rooting.
pub fn tag(mut tree: GeneTree, book: &SpeciesBook) -> Result<TaggedTree> {
    tree.suppress_unifurcations();
    tree.resolve_polytomies();

    let species = species_sets(&tree, book)?;
    let mut events = IntMap::<NodeID, Event>::default();
    let mut dups = IntMap::<NodeID, usize>::default();
    for n in tree.postorder(tree.root()) {
        if tree.is_leaf(n) {
            dups.insert(n, 0);
        } else {
            let [left, right] = tree.pair(n)?;
            let event = if species[&left].is_disjoint(&species[&right]) {
                Event::Speciation
            } else {
                Event::Duplication
            };
            events.insert(n, event);
            dups.insert(
                n,
                dups[&left] + dups[&right] + usize::from(event == Event::Duplication),
            );
        }
    }

    let n_dups = dups[&tree.root()];
    Ok(TaggedTree { tree, species, events, dups, n_dups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick;
    use crate::rooting;

    fn tagged(s: &str) -> (TaggedTree, SpeciesBook) {
        let mut t = newick::from_str(s).unwrap();
        let book = SpeciesBook::from_tree(&t, "_").unwrap();
        let r = rooting::min_root(&mut t, &book).unwrap();
        t.reroot(r.best);
        (tag(t, &book).unwrap(), book)
    }

    #[test]
    fn simple_duplication() {
        let (t, book) = tagged("((A_1,A_2),(B_1,C_1));");
        let root = t.tree.root();
        let [left, right] = t.tree.pair(root).unwrap();
        assert_eq!(t.event(root), Some(Event::Speciation));
        assert_eq!(t.event(left), Some(Event::Duplication));
        assert_eq!(t.event(right), Some(Event::Speciation));
        assert_eq!(t.n_dups(), 1);
        assert_eq!(book.names(t.species(left)), ["A"]);
        assert_eq!(book.names(t.species(root)), ["A", "B", "C"]);
    }

    #[test]
    fn leaves_have_no_event() {
        let (t, _) = tagged("((A_1,A_2),(B_1,C_1));");
        for l in t.tree.leaves(t.tree.root()) {
            assert_eq!(t.event(l), None);
            assert_eq!(t.dups(l), 0);
        }
    }

    #[test]
    fn dup_count_matches_independent_count() {
        for s in [
            "((A_1,(B_1,C_1)),(A_2,(B_2,C_2)));",
            "(((A_1,A_2),(A_3,B_1)),((C_1,C_2),(D_1,(D_2,D_3))));",
            "(A_1,B_1,(A_2,(B_2,C_1)),(D_1,A_3),E_1);",
            "A_1;",
        ] {
            let (t, _) = tagged(s);
            let counted = t.internal_postorder().into_iter().filter(|&n| t.is_duplication(n)).count();
            assert_eq!(t.n_dups(), counted, "{}", s);
            for n in t.internal_postorder() {
                let [l, r] = t.tree.pair(n).unwrap();
                assert_eq!(t.dups(n), t.dups(l) + t.dups(r) + usize::from(t.is_duplication(n)));
            }
        }
    }

    #[test]
    fn root_species_are_all_species() {
        let s = "(((A_1,A_2),(A_3,B_1)),((C_1,C_2),(D_1,(D_2,D_3))));";
        let (t, book) = tagged(s);
        assert_eq!(book.names(t.species(t.tree.root())), ["A", "B", "C", "D"]);
        assert_eq!(t.n_species(), 4);
    }

    #[test]
    fn retagging_after_round_trip() {
        let (t, book) = tagged("(((A_1,A_2),B_1),((C_1,B_2),D_1));");
        let copy = newick::from_str(&t.tree.to_newick()).unwrap();
        let mut labels = copy.leaf_labels();
        let mut original = t.tree.leaf_labels();
        labels.sort();
        original.sort();
        assert_eq!(labels, original);
        let again = tag(copy, &book).unwrap();
        assert_eq!(again.n_dups(), t.n_dups());
    }
}
