use std::collections::HashMap;

use identity_hash::{IntMap, IntSet};
use itertools::Itertools;

use crate::errors::DataError;
use crate::tree::{GeneTree, NodeID};

pub type SpeciesID = usize;
pub type SpeciesSet = IntSet<SpeciesID>;

/// Maps the species part of leaf labels to compact integer IDs.
///
/// The species of a leaf is the part of its label before the first occurence
/// of the delimiter, or the whole label if the delimiter is empty or absent.
pub struct SpeciesBook {
    delimiter: String,
    names: Vec<String>,
    ids: HashMap<String, SpeciesID>,
}

impl SpeciesBook {
    pub fn new(delimiter: &str) -> SpeciesBook {
        SpeciesBook { delimiter: delimiter.to_owned(), names: Vec::new(), ids: HashMap::new() }
    }

    /// Register the species of all the leaves of `tree`.
    pub fn from_tree(tree: &GeneTree, delimiter: &str) -> Result<SpeciesBook, DataError> {
        let mut book = SpeciesBook::new(delimiter);
        for l in tree.leaves(tree.root()) {
            let label = tree.label(l).ok_or(DataError::UnlabeledLeaf)?;
            book.register(label);
        }
        Ok(book)
    }

    pub fn species_name<'a>(&self, label: &'a str) -> &'a str {
        if self.delimiter.is_empty() {
            label
        } else {
            label.split(self.delimiter.as_str()).next().unwrap_or(label)
        }
    }

    pub fn register(&mut self, label: &str) -> SpeciesID {
        let name = self.species_name(label);
        if let Some(&id) = self.ids.get(name) {
            id
        } else {
            let id = self.names.len();
            self.names.push(name.to_owned());
            self.ids.insert(name.to_owned(), id);
            id
        }
    }

    pub fn species_of(&self, tree: &GeneTree, leaf: NodeID) -> Result<SpeciesID, DataError> {
        let label = tree.label(leaf).ok_or(DataError::UnlabeledLeaf)?;
        let name = self.species_name(label);
        self.ids.get(name).copied().ok_or_else(|| DataError::UnknownSpecies(name.to_owned()))
    }

    pub fn name(&self, id: SpeciesID) -> &str {
        &self.names[id]
    }

    /// The sorted names of a set of species.
    pub fn names<'a>(&'a self, species: &SpeciesSet) -> Vec<&'a str> {
        species.iter().map(|&s| self.name(s)).sorted().collect()
    }
}

/// The species found below each node of the tree.
pub fn species_sets(
    tree: &GeneTree,
    book: &SpeciesBook,
) -> Result<IntMap<NodeID, SpeciesSet>, DataError> {
    let mut sets = IntMap::<NodeID, SpeciesSet>::default();
    for n in tree.postorder(tree.root()) {
        let set = if tree.is_leaf(n) {
            SpeciesSet::from_iter([book.species_of(tree, n)?])
        } else {
            tree.children(n).iter().flat_map(|c| sets[c].iter().copied()).collect()
        };
        sets.insert(n, set);
    }
    Ok(sets)
}
