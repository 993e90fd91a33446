use itertools::Itertools;

use crate::rooting::Tie;
use crate::species::SpeciesBook;
use crate::tree::GeneTree;

/// The species on the smaller side of an optimal rooting edge; on equal
/// sizes, the side whose sorted names come first.
pub fn outgroup<'a>(tie: &Tie, book: &'a SpeciesBook) -> Vec<&'a str> {
    let a = book.names(&tie.sides.0);
    let b = book.names(&tie.sides.1);
    std::cmp::min((a.len(), a), (b.len(), b)).1
}

/// Whether a tree holds no quartet, i.e. has at most one internal node.
pub fn is_trivial(tree: &GeneTree) -> bool {
    tree.preorder(tree.root()).into_iter().filter(|&n| !tree.is_leaf(n)).nth(1).is_none()
}

/// Format the outgroups suggested for the `index`-th tree of a file.
pub fn report(index: usize, outgroups: &[Vec<String>]) -> String {
    let mut r = format!("Tree {}:\n", index);
    for o in outgroups {
        r.push_str(&format!("{{{}}}\n", o.iter().join(",")));
    }
    r
}
