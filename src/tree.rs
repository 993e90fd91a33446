use identity_hash::{IntMap, IntSet};
use smallvec::SmallVec;

use crate::errors::TopologyError;

pub type NodeID = usize;

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub children: SmallVec<[NodeID; 2]>,
    pub parent: Option<NodeID>,
    pub label: Option<String>,
    pub length: Option<f64>,
}
impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An arena-backed gene tree.
///
/// Nodes are addressed by stable [`NodeID`]s; children are owned as ID lists and
/// parents are plain back-references. Nodes unplugged from the tree stay in the
/// arena until explicitly deleted, so that they can be plugged back.
#[derive(Clone, Debug)]
pub struct GeneTree {
    nodes: IntMap<NodeID, Node>,
    root: NodeID,
    next_id: NodeID,
    rooted: bool,
}

impl std::ops::Index<NodeID> for GeneTree {
    type Output = Node;
    fn index(&self, i: NodeID) -> &Self::Output {
        &self.nodes[&i]
    }
}
impl std::ops::IndexMut<NodeID> for GeneTree {
    fn index_mut(&mut self, i: NodeID) -> &mut Self::Output {
        self.nodes.get_mut(&i).unwrap()
    }
}

impl Default for GeneTree {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneTree {
    /// Create a tree made of a single, unlabeled root.
    pub fn new() -> GeneTree {
        let mut nodes = IntMap::default();
        nodes.insert(0, Node::default());
        GeneTree { nodes, root: 0, next_id: 1, rooted: false }
    }

    fn fresh(&mut self, node: Node) -> NodeID {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn add_node(
        &mut self,
        parent: NodeID,
        label: Option<String>,
        length: Option<f64>,
    ) -> NodeID {
        assert!(self.nodes.contains_key(&parent));
        let id = self.fresh(Node { children: SmallVec::new(), parent: Some(parent), label, length });
        self[parent].children.push(id);
        id
    }

    pub fn root(&self) -> NodeID {
        self.root
    }

    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn set_rooted(&mut self, rooted: bool) {
        self.rooted = rooted;
    }

    pub fn contains(&self, n: NodeID) -> bool {
        self.nodes.contains_key(&n)
    }

    pub fn children(&self, n: NodeID) -> &[NodeID] {
        &self.nodes[&n].children
    }

    pub fn parent(&self, n: NodeID) -> Option<NodeID> {
        self.nodes[&n].parent
    }

    pub fn label(&self, n: NodeID) -> Option<&str> {
        self.nodes[&n].label.as_deref()
    }

    pub fn is_leaf(&self, n: NodeID) -> bool {
        self.nodes[&n].is_leaf()
    }

    /// The two children of a node that must be binary.
    pub fn pair(&self, n: NodeID) -> Result<[NodeID; 2], TopologyError> {
        match self.children(n) {
            &[l, r] => Ok([l, r]),
            cs => Err(TopologyError::NotBinary { node: n, children: cs.len() }),
        }
    }

    /// The siblings of `n`, in order.
    pub fn siblings(&self, n: NodeID) -> impl Iterator<Item = NodeID> + '_ {
        self.parent(n)
            .map(|p| self.children(p))
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(move |&s| s != n)
    }

    /// Number of nodes in the arena, including currently unplugged ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn postorder(&self, from: NodeID) -> Vec<NodeID> {
        let mut r = Vec::new();
        let mut todo = vec![(from, false)];
        while let Some((n, expanded)) = todo.pop() {
            if expanded || self[n].children.is_empty() {
                r.push(n);
            } else {
                todo.push((n, true));
                todo.extend(self[n].children.iter().rev().map(|&c| (c, false)));
            }
        }
        r
    }

    pub fn preorder(&self, from: NodeID) -> Vec<NodeID> {
        let mut r = Vec::new();
        let mut todo = vec![from];
        while let Some(n) = todo.pop() {
            r.push(n);
            todo.extend(self[n].children.iter().rev().copied());
        }
        r
    }

    pub fn leaves(&self, from: NodeID) -> Vec<NodeID> {
        self.preorder(from).into_iter().filter(|&n| self.is_leaf(n)).collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves(self.root).len()
    }

    pub fn leaf_labels(&self) -> Vec<&str> {
        self.leaves(self.root).into_iter().filter_map(|l| self.label(l)).collect()
    }

    pub fn plug(&mut self, target: NodeID, n: NodeID) {
        let len = self[target].children.len();
        self.insert_child(target, len, n);
    }

    pub fn insert_child(&mut self, target: NodeID, position: usize, n: NodeID) {
        assert!(self.nodes[&n].parent.is_none());
        assert!(!self.nodes[&target].children.contains(&n));
        self[n].parent = Some(target);
        self[target].children.insert(position, n);
    }

    /// Detach `n` from its parent, returning the position it occupied there.
    /// The node and its subtree are kept in the arena.
    pub fn unplug(&mut self, n: NodeID) -> Option<usize> {
        let parent = self.nodes[&n].parent?;
        self[n].parent = None;
        let siblings = &mut self[parent].children;
        let position = siblings.iter().position(|&c| c == n);
        assert!(position.is_some());
        if let Some(position) = position {
            siblings.remove(position);
        }
        position
    }

    /// Detach `n` and drop it, together with all its descendants, from the arena.
    pub fn delete_subtree(&mut self, n: NodeID) {
        assert!(n != self.root);
        self.unplug(n);
        for k in self.postorder(n) {
            self.nodes.remove(&k);
        }
    }

    /// Move the subtree rooted at `n` out of this tree into a new, independent one.
    pub fn split_off(&mut self, n: NodeID) -> GeneTree {
        assert!(n != self.root);
        self.unplug(n);
        let nodes = self
            .postorder(n)
            .into_iter()
            .filter_map(|k| self.nodes.remove(&k).map(|node| (k, node)))
            .collect();
        GeneTree { nodes, root: n, next_id: self.next_id, rooted: self.rooted }
    }

    /// Remove the internal node `n`, handing its children over to its parent at
    /// its former position.
    pub fn contract(&mut self, n: NodeID) {
        assert!(n != self.root);
        let parent = self[n].parent.unwrap();
        let length = self[n].length;
        let children = std::mem::take(&mut self[n].children);
        let position = self.unplug(n).unwrap_or(0);
        for (i, &c) in children.iter().enumerate() {
            self[c].parent = None;
            self[c].length = add_lengths(self[c].length, length);
            self.insert_child(parent, position + i, c);
        }
        self.nodes.remove(&n);
    }

    /// Replace every single-child node by its child.
    pub fn suppress_unifurcations(&mut self) {
        for n in self.postorder(self.root) {
            if n != self.root && self[n].children.len() == 1 {
                self.contract(n);
            }
        }
        while self[self.root].children.len() == 1 {
            let old_root = self.root;
            let child = self[old_root].children[0];
            self[child].parent = None;
            self[child].length = None;
            self.nodes.remove(&old_root);
            self.root = child;
        }
    }

    /// Break a multifurcation at `n` into a caterpillar of bifurcations,
    /// keeping the first child at the top.
    pub fn resolve_polytomy(&mut self, n: NodeID) {
        let mut current = n;
        while self[current].children.len() > 2 {
            let rest = self[current].children.drain(1..).collect::<SmallVec<[NodeID; 2]>>();
            let alpha = self.fresh(Node {
                children: rest.clone(),
                parent: Some(current),
                label: None,
                length: None,
            });
            for c in rest {
                self[c].parent = Some(alpha);
            }
            self[current].children.push(alpha);
            current = alpha;
        }
    }

    pub fn resolve_polytomies(&mut self) {
        for n in self.postorder(self.root) {
            if self[n].children.len() > 2 {
                self.resolve_polytomy(n);
            }
        }
    }

    /// Place the root on the edge between `n` and its parent.
    pub fn reroot(&mut self, n: NodeID) {
        if n == self.root {
            return;
        }

        let mut path = vec![n];
        while let Some(parent) = self[*path.last().unwrap()].parent {
            path.push(parent);
        }
        // path: n, parent(n), ..., old root
        let lengths = path.iter().map(|&k| self[k].length).collect::<Vec<_>>();
        for &k in path.iter() {
            self.unplug(k);
        }

        let old_root = self.root;
        let new_root = self.fresh(Node::default());
        let half = lengths[0].map(|l| l / 2.);
        self.plug(new_root, path[0]);
        self[path[0]].length = half;
        self.plug(new_root, path[1]);
        self[path[1]].length = half;
        for i in 2..path.len() {
            self.plug(path[i - 1], path[i]);
            self[path[i]].length = lengths[i - 1];
        }
        self.root = new_root;
        self.rooted = true;

        if self[old_root].children.len() == 1 {
            self.contract(old_root);
        }
    }

    /// Remove the root bifurcation by contracting one of the root children,
    /// preferring the second one; never collapses a tree to a single leaf.
    pub fn unroot(&mut self) {
        if let &[left, right] = self.children(self.root) {
            if !self.is_leaf(right) {
                self.contract(right);
            } else if !self.is_leaf(left) {
                self.contract(left);
            }
        }
        self.rooted = false;
    }

    /// Remove a leaf, then every ancestor left childless by its removal.
    pub fn prune_leaf(&mut self, leaf: NodeID) {
        let mut current = leaf;
        while current != self.root && self[current].children.is_empty() {
            let parent = self[current].parent;
            self.delete_subtree(current);
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    /// Prune all the unlabeled leaves, typically left over by subtree removals.
    pub fn prune_empty(&mut self) {
        let empties = self
            .postorder(self.root)
            .into_iter()
            .filter(|&k| k != self.root && self.is_leaf(k) && self[k].label.is_none())
            .collect::<Vec<_>>();
        for k in empties {
            if self.contains(k) && self.is_leaf(k) {
                self.prune_leaf(k);
            }
        }
    }

    /// The set of nodes below `n`, `n` included.
    pub fn descendants(&self, n: NodeID) -> IntSet<NodeID> {
        self.preorder(n).into_iter().collect()
    }
}

fn add_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.) + b.unwrap_or(0.)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick;

    fn parse(s: &str) -> GeneTree {
        newick::from_str(s).unwrap()
    }

    #[test]
    fn traversals() {
        let t = parse("((A,B)X,(C,D)Y)R;");
        let labels = |v: Vec<NodeID>| v.into_iter().map(|n| t.label(n).unwrap()).collect::<Vec<_>>();
        assert_eq!(labels(t.postorder(t.root())), ["A", "B", "X", "C", "D", "Y", "R"]);
        assert_eq!(labels(t.preorder(t.root())), ["R", "X", "A", "B", "Y", "C", "D"]);
        assert_eq!(t.leaf_count(), 4);
    }

    #[test]
    fn deep_trees_do_not_overflow() {
        let depth = 200_000;
        let mut s = String::with_capacity(depth * 6);
        for _ in 0..depth {
            s.push('(');
        }
        s.push_str("A_0");
        for i in 1..=depth {
            s.push_str(&format!(",A_{})", i));
        }
        s.push(';');
        let mut t = parse(&s);
        assert_eq!(t.leaf_count(), depth + 1);
        assert_eq!(t.postorder(t.root()).len(), 2 * depth + 1);
        t.suppress_unifurcations();
        let back = t.to_newick();
        assert_eq!(back.len(), s.len());
    }

    #[test]
    fn polytomies_become_caterpillars() {
        let mut t = parse("(A,B,C,D);");
        t.resolve_polytomies();
        assert_eq!(t.to_newick(), "(A,(B,(C,D)));");
        assert!(t.postorder(t.root()).iter().all(|&n| t.is_leaf(n) || t.pair(n).is_ok()));
    }

    #[test]
    fn unifurcations_are_suppressed() {
        let mut t = parse("(((A:1,B:1):1):2,C:1);");
        t.suppress_unifurcations();
        assert_eq!(t.to_newick(), "((A:1,B:1):3,C:1);");

        let mut t = parse("((A,B));");
        t.suppress_unifurcations();
        assert_eq!(t.to_newick(), "(A,B);");
    }

    #[test]
    fn reroot_on_inner_edge() {
        let mut t = parse("((A,B)X,(C,D)Y);");
        let x = t.preorder(t.root()).into_iter().find(|&n| t.label(n) == Some("X")).unwrap();
        let a = t.children(x)[0];
        t.reroot(a);
        assert_eq!(t.to_newick(), "(A,(B,(C,D)Y)X);");
        assert!(t.is_rooted());
        assert_eq!(t.leaf_count(), 4);
    }

    #[test]
    fn reroot_on_root_child_keeps_topology() {
        let mut t = parse("((A,B),(C,D));");
        let before = t.to_newick();
        let first = t.children(t.root())[0];
        t.reroot(first);
        assert_eq!(t.to_newick(), before);
    }

    #[test]
    fn reroot_splits_lengths() {
        let mut t = parse("((A:2,B:1):1,C:1);");
        let a = t.leaves(t.root())[0];
        t.reroot(a);
        assert_eq!(t.to_newick(), "(A:1,(B:1,C:2):1);");
    }

    #[test]
    fn unrooting() {
        let mut t = parse("((A,B),(C,D));");
        t.unroot();
        assert_eq!(t.to_newick(), "((A,B),C,D);");
        assert!(!t.is_rooted());

        let mut t = parse("(A,B);");
        t.unroot();
        assert_eq!(t.to_newick(), "(A,B);");
    }

    #[test]
    fn split_off_moves_subtree() {
        let mut t = parse("((A,B)X,(C,D)Y);");
        let y = t.children(t.root())[1];
        let sub = t.split_off(y);
        assert_eq!(sub.to_newick(), "(C,D)Y;");
        assert_eq!(t.to_newick(), "((A,B)X);");
        assert!(!t.contains(y));
    }

    #[test]
    fn unplug_and_restore() {
        let mut t = parse("(A,B,C);");
        let before = t.to_newick();
        let b = t.children(t.root())[1];
        let position = t.unplug(b).unwrap();
        assert_eq!(t.to_newick(), "(A,C);");
        t.insert_child(t.root(), position, b);
        assert_eq!(t.to_newick(), before);
    }

    #[test]
    fn pruning_cascades() {
        let mut t = parse("(((A)),B);");
        let a = t.leaves(t.root())[0];
        t.prune_leaf(a);
        assert_eq!(t.to_newick(), "(B);");
    }

    #[test]
    fn non_binary_nodes_are_reported() {
        let t = parse("(A,B,C);");
        assert_eq!(t.pair(t.root()), Err(TopologyError::NotBinary { node: t.root(), children: 3 }));
    }
}
