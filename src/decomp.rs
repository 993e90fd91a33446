use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use log::*;
use rand::Rng;

use crate::errors::RuntimeError;
use crate::newick;
use crate::tagging::TaggedTree;
use crate::tree::{GeneTree, NodeID};

/// The (smaller, larger) children of a binary node, by species count. The first
/// child is the smaller one on equal counts.
fn sides(t: &TaggedTree, n: NodeID) -> Result<(NodeID, NodeID)> {
    let [left, right] = t.tree.pair(n)?;
    Ok(if t.species(left).len() <= t.species(right).len() { (left, right) } else { (right, left) })
}

/// Split a tagged tree at its duplications.
///
/// At each duplication, the child spanning the fewest species is cut off; it is
/// emitted as a tree of its own unless `max_only` is set, or `no_subsets` is set
/// and its species are a strict subset of the other side's. The pruned main tree
/// always comes last.
pub fn decompose(mut t: TaggedTree, max_only: bool, no_subsets: bool) -> Result<Vec<GeneTree>> {
    let mut out = Vec::new();
    for n in t.internal_postorder() {
        if !t.is_duplication(n) {
            continue;
        }
        let (excised, kept) = sides(&t, n)?;
        let redundant = no_subsets && {
            let (e, k) = (t.species(excised), t.species(kept));
            e.len() < k.len() && e.is_subset(k)
        };
        if max_only || redundant {
            t.tree.delete_subtree(excised);
        } else {
            out.push(t.tree.split_off(excised));
        }
    }
    t.tree.suppress_unifurcations();
    out.push(t.tree);
    Ok(out)
}

/// Remove duplicated leaves under every duplication of a copy of `t`.
///
/// At each duplication, the leaves of the species shared by both children are
/// removed from the child spanning the fewest species if `smallest` is set,
/// from the other one otherwise.
pub fn trim(t: &TaggedTree, smallest: bool) -> Result<GeneTree> {
    let mut tree = t.tree.clone();
    for n in t.internal_postorder() {
        if !t.is_duplication(n) {
            continue;
        }
        let (small, large) = sides(t, n)?;
        let [left, right] = t.tree.pair(n)?;
        let shared = t.species(left) & t.species(right);
        let from = if smallest { small } else { large };

        for v in tree.postorder(from) {
            if !tree.contains(v) {
                continue;
            }
            let empty = tree.is_leaf(v) && tree.label(v).is_none();
            if empty || t.species(v).is_subset(&shared) {
                tree.delete_subtree(v);
            }
        }
    }
    tree.prune_empty();
    tree.suppress_unifurcations();
    Ok(tree)
}

/// How many trees to draw from a gene tree, as a function of its number of
/// duplications.
#[derive(Clone)]
pub enum SamplingMethod {
    /// One more than the number of duplications
    Linear,
    /// Two to the power of the number of duplications
    Exponential,
    Fixed(usize),
    Custom(Arc<dyn Fn(usize) -> usize + Send + Sync>),
}
impl std::fmt::Debug for SamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingMethod::Linear => write!(f, "linear"),
            SamplingMethod::Exponential => write!(f, "exp"),
            SamplingMethod::Fixed(n) => write!(f, "{}", n),
            SamplingMethod::Custom(_) => write!(f, "custom"),
        }
    }
}
impl FromStr for SamplingMethod {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(SamplingMethod::Linear),
            "exp" => Ok(SamplingMethod::Exponential),
            _ if !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit()) => s
                .parse::<usize>()
                .map(SamplingMethod::Fixed)
                .map_err(|_| RuntimeError::InvalidSamplingMethod(s.to_owned())),
            _ => Err(RuntimeError::InvalidSamplingMethod(s.to_owned())),
        }
    }
}
impl SamplingMethod {
    pub fn count(&self, n_dups: usize) -> Result<usize, RuntimeError> {
        match self {
            SamplingMethod::Linear => Ok(n_dups + 1),
            SamplingMethod::Exponential => u32::try_from(n_dups)
                .ok()
                .and_then(|e| 2usize.checked_pow(e))
                .ok_or(RuntimeError::TooManySamples(n_dups)),
            SamplingMethod::Fixed(n) => Ok(*n),
            SamplingMethod::Custom(f) => Ok(f(n_dups)),
        }
    }
}

/// Draw single-copy trees from `t` by keeping a single child at each
/// duplication.
///
/// The kept child is drawn with a probability growing with its own number of
/// duplications, so that large duplicated clades are not always discarded in
/// favor of the same small one. `t` is restored after each draw.
pub fn sample<R: Rng>(
    t: &mut TaggedTree,
    method: &SamplingMethod,
    rng: &mut R,
) -> Result<Vec<GeneTree>> {
    let n_samples = method.count(t.n_dups())?;
    let duplications =
        t.internal_postorder().into_iter().filter(|&n| t.is_duplication(n)).collect::<Vec<_>>();
    debug!("Drawing {} samples over {} duplications", n_samples, duplications.len());

    let mut out = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let mut removed = Vec::with_capacity(duplications.len());
        for &d in duplications.iter() {
            let [left, right] = t.tree.pair(d)?;
            let bias = (t.dups(left) as f64 + 0.5) / t.dups(d) as f64;
            let delete = if rng.gen::<f64>() > bias { left } else { right };
            let position = t.tree.unplug(delete).unwrap_or(0);
            removed.push((d, position, delete));
        }

        out.push(newick::from_str(&t.tree.to_newick())?);

        for (d, position, child) in removed.into_iter().rev() {
            t.tree.insert_child(d, position, child);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooting;
    use crate::species::{SpeciesBook, SpeciesSet};
    use crate::tagging::tag;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tagged(s: &str) -> (TaggedTree, SpeciesBook) {
        let mut t = newick::from_str(s).unwrap();
        let book = SpeciesBook::from_tree(&t, "_").unwrap();
        let r = rooting::min_root(&mut t, &book).unwrap();
        t.reroot(r.best);
        (tag(t, &book).unwrap(), book)
    }

    fn species_of(t: &GeneTree, book: &SpeciesBook) -> SpeciesSet {
        t.leaves(t.root()).into_iter().map(|l| book.species_of(t, l).unwrap()).collect()
    }

    fn is_single_copy(t: &GeneTree, book: &SpeciesBook) -> bool {
        species_of(t, book).len() == t.leaf_count()
    }

    const FAMILIES: &[&str] = &[
        "((A_1,A_2),(B_1,C_1));",
        "((A_1,(B_1,C_1)),(A_2,(B_2,C_2)));",
        "(((A_1,A_2),(A_3,B_1)),((C_1,C_2),(D_1,(D_2,D_3))));",
        "(((A_1,B_1),(A_2,B_2)),((C_1,D_1),(C_2,E_1)));",
        "((A_1,(B_1,(C_1,D_1))),((A_2,B_2),(C_2,(D_2,E_1))));",
    ];

    #[test]
    fn decompose_simple_duplication() {
        let (t, book) = tagged("((A_1,A_2),(B_1,C_1));");
        let out = decompose(t, false, false).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_newick(), "A_1;");
        assert_eq!(out[1].to_newick(), "(A_2,(B_1,C_1));");
        assert!(out.iter().all(|t| is_single_copy(t, &book)));
    }

    #[test]
    fn decompose_max_only() {
        let (t, _) = tagged("((A_1,A_2),(B_1,C_1));");
        let out = decompose(t, true, false).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_newick(), "(A_2,(B_1,C_1));");
    }

    #[test]
    fn decompose_no_subsets() {
        let (t, book) = tagged("((A_1,(B_1,C_1)),((A_2,B_2),D_1));");
        let species = t.species(t.tree.root()).clone();
        let newicks = |out: &[GeneTree]| out.iter().map(|t| t.to_newick()).collect::<Vec<_>>();

        let all = decompose(t.clone(), false, false).unwrap();
        assert_eq!(newicks(&all), ["(A_2,B_2);", "(D_1,(A_1,(B_1,C_1)));"]);

        // {A, B} is a strict subset of {A, B, C, D}
        let filtered = decompose(t, false, true).unwrap();
        assert_eq!(newicks(&filtered), ["(D_1,(A_1,(B_1,C_1)));"]);
        let skipped = species_of(&all[0], &book);
        let covered = filtered
            .iter()
            .flat_map(|t| species_of(t, &book).into_iter())
            .chain(skipped.into_iter())
            .collect::<SpeciesSet>();
        assert_eq!(covered, species);
        assert!(is_single_copy(&filtered[0], &book));
    }

    #[test]
    fn decompose_covers_all_species() {
        for s in FAMILIES {
            let (t, book) = tagged(s);
            let all = t.species(t.tree.root()).clone();
            let out = decompose(t, false, false).unwrap();
            let covered =
                out.iter().flat_map(|t| species_of(t, &book).into_iter()).collect::<SpeciesSet>();
            assert_eq!(covered, all, "{}", s);
            let main = tag(out.last().unwrap().clone(), &book).unwrap();
            assert_eq!(main.n_dups(), 0, "{}", s);
        }
    }

    #[test]
    fn trimming_yields_single_copy_trees() {
        for s in FAMILIES {
            let (t, book) = tagged(s);
            let before = t.tree.to_newick();
            for smallest in [true, false] {
                let trimmed = trim(&t, smallest).unwrap();
                assert!(is_single_copy(&trimmed, &book), "{} ({})", s, smallest);
                assert!(trimmed.leaf_count() <= t.tree.leaf_count());
            }
            assert_eq!(t.tree.to_newick(), before);
        }
    }

    #[test]
    fn trimming_sides() {
        let (t, _) = tagged("((A_1,(B_1,C_1)),((A_2,B_2),D_1));");
        // Rooted as ((A_2,B_2),(D_1,(A_1,(B_1,C_1)))), with a duplication at the root
        assert_eq!(trim(&t, true).unwrap().to_newick(), "(D_1,(A_1,(B_1,C_1)));");
        assert_eq!(trim(&t, false).unwrap().to_newick(), "((A_2,B_2),(D_1,C_1));");
    }

    #[test]
    fn sampling_methods() {
        assert!(matches!("linear".parse::<SamplingMethod>(), Ok(SamplingMethod::Linear)));
        assert!(matches!("exp".parse::<SamplingMethod>(), Ok(SamplingMethod::Exponential)));
        assert!(matches!("12".parse::<SamplingMethod>(), Ok(SamplingMethod::Fixed(12))));
        assert!("twelve".parse::<SamplingMethod>().is_err());
        assert!("".parse::<SamplingMethod>().is_err());
        assert!("-3".parse::<SamplingMethod>().is_err());

        assert_eq!(SamplingMethod::Linear.count(3).unwrap(), 4);
        assert_eq!(SamplingMethod::Exponential.count(3).unwrap(), 8);
        assert_eq!(SamplingMethod::Fixed(5).count(3).unwrap(), 5);
        assert_eq!(SamplingMethod::Custom(Arc::new(|d| d * 10)).count(3).unwrap(), 30);
        assert!(SamplingMethod::Exponential.count(200).is_err());
    }

    #[test]
    fn sampling_simple_duplication() {
        let (mut t, book) = tagged("((A_1,A_2),(B_1,C_1));");
        let mut rng = StdRng::seed_from_u64(0);
        let out = sample(&mut t, &SamplingMethod::Linear, &mut rng).unwrap();
        assert_eq!(out.len(), 2);
        for s in out.iter() {
            assert!(is_single_copy(s, &book));
            let labels = s.leaf_labels();
            assert_eq!(labels.iter().filter(|l| l.starts_with("A_")).count(), 1);
            assert!(labels.contains(&"B_1") && labels.contains(&"C_1"));
        }
    }

    #[test]
    fn sampling_counts_and_restoration() {
        for s in FAMILIES {
            let (mut t, book) = tagged(s);
            let before = t.tree.to_newick();
            let n_dups = t.n_dups();
            let mut rng = StdRng::seed_from_u64(42);
            for (method, expected) in [
                (SamplingMethod::Linear, n_dups + 1),
                (SamplingMethod::Exponential, 1 << n_dups),
                (SamplingMethod::Fixed(3), 3),
            ] {
                let out = sample(&mut t, &method, &mut rng).unwrap();
                assert_eq!(out.len(), expected);
                for o in out.iter() {
                    assert!(o.leaf_count() <= t.tree.leaf_count());
                    assert!(is_single_copy(o, &book));
                }
                assert_eq!(t.tree.to_newick(), before);
            }
        }
    }

    #[test]
    fn sampling_is_reproducible() {
        let s = "(((A_1,A_2),(A_3,B_1)),((C_1,C_2),(D_1,(D_2,D_3))));";
        let draw = || {
            let (mut t, _) = tagged(s);
            let mut rng = StdRng::seed_from_u64(7);
            sample(&mut t, &SamplingMethod::Fixed(10), &mut rng)
                .unwrap()
                .iter()
                .map(|t| t.to_newick())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(), draw());
    }
}
