use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::ProgressBar;
use log::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::decomp::{self, SamplingMethod};
use crate::errors::{DataError, FileError};
use crate::newick;
use crate::outgroups;
use crate::paralogs;
use crate::rooting;
use crate::species::SpeciesBook;
use crate::tagging;

/// How a tagged tree is turned into single-copy trees.
#[derive(Debug, Clone)]
pub enum Mode {
    Decompose { max_only: bool, no_subsets: bool },
    Trim { both: bool },
    Sample(SamplingMethod),
}
impl Default for Mode {
    fn default() -> Self {
        Mode::Decompose { max_only: false, no_subsets: false }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub delimiter: String,
    pub remove_in_paralogs: bool,
    pub mode: Mode,
    /// Keep the output trees without any quartet
    pub keep_trivial: bool,
    pub outgroups: bool,
    /// Base seed of the sampling generator; tree `i` uses `seed + i`
    pub seed: u64,
}
impl Default for Settings {
    fn default() -> Self {
        Settings {
            delimiter: "_".to_owned(),
            remove_in_paralogs: false,
            mode: Mode::default(),
            keep_trivial: false,
            outgroups: false,
            seed: 0,
        }
    }
}

enum Class {
    Uninformative,
    SingleCopy,
    MultiCopy { score: usize, dups: usize, ties: usize, outgroup: Vec<String> },
}

struct Report {
    line: usize,
    species: usize,
    paralogs: Option<usize>,
    class: Class,
    emitted: usize,
    dropped: usize,
}
impl Report {
    fn log(&self) {
        info!("Tree {}: {} species", self.line, self.species);
        if let Some(paralogs) = self.paralogs {
            info!("{} in-paralogs removed prior to rooting", paralogs);
        }
        match &self.class {
            Class::Uninformative => info!("Uninformative"),
            Class::SingleCopy => info!("Single-Copy"),
            Class::MultiCopy { score, dups, ties, outgroup } => {
                info!(
                    "Best root had score {} with {} {}duplications; there were {} ties",
                    score,
                    dups,
                    if self.paralogs.is_some() { "non-terminal " } else { "" },
                    ties
                );
                info!("Outgroup: {{{}}}", outgroup.join(","));
            }
        }
        info!("{} tree(s) emitted, {} trivial tree(s) dropped", self.emitted, self.dropped);
    }
}

/// The outcome of a single input tree.
pub struct Processed {
    pub trees: Vec<String>,
    pub outgroups: Option<String>,
    report: Report,
}

/// Run a single newick tree through the whole pipeline; `index` is its
/// 0-based line number in the input file.
pub fn process_tree(index: usize, line: &str, settings: &Settings) -> Result<Processed> {
    let line_no = index + 1;
    let mut tree = newick::from_str(line)
        .map_err(|source| DataError::MalformedTree { line: line_no, source })?;
    let book = SpeciesBook::from_tree(&tree, &settings.delimiter)?;

    let paralogs = if settings.remove_in_paralogs {
        Some(paralogs::remove_in_paralogs(&mut tree, &book)?)
    } else {
        None
    };

    let rooting = rooting::min_root(&mut tree, &book)?;
    tree.reroot(rooting.best);
    let mut tagged = tagging::tag(tree, &book)?;
    trace!("Tree {} rooted as {}", line_no, tagged.tree.to_newick());

    let n_species = tagged.n_species();
    let class = if n_species < 2 {
        Class::Uninformative
    } else if tagged.n_dups() == 0 {
        Class::SingleCopy
    } else {
        Class::MultiCopy {
            score: rooting.score,
            dups: tagged.n_dups(),
            ties: rooting.ties.len(),
            outgroup: rooting
                .ties
                .first()
                .map(|tie| outgroups::outgroup(tie, &book).into_iter().map(String::from).collect())
                .unwrap_or_default(),
        }
    };

    let suggestions = if settings.outgroups && n_species >= 2 && tagged.n_dups() >= 1 {
        let suggested = rooting
            .ties
            .iter()
            .map(|tie| outgroups::outgroup(tie, &book).into_iter().map(String::from).collect())
            .collect::<Vec<Vec<String>>>();
        Some(outgroups::report(line_no, &suggested))
    } else {
        None
    };

    let out = match &settings.mode {
        Mode::Decompose { max_only, no_subsets } => {
            decomp::decompose(tagged, *max_only, *no_subsets)?
        }
        Mode::Trim { both } => {
            let mut out = vec![decomp::trim(&tagged, true)?];
            if *both {
                out.push(decomp::trim(&tagged, false)?);
            }
            out
        }
        Mode::Sample(method) => {
            let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(index as u64));
            decomp::sample(&mut tagged, method, &mut rng)?
        }
    };

    let mut trees = Vec::with_capacity(out.len());
    let mut dropped = 0;
    for mut t in out {
        t.suppress_unifurcations();
        t.unroot();
        t.suppress_unifurcations();
        if settings.keep_trivial || !outgroups::is_trivial(&t) {
            trees.push(t.to_newick());
        } else {
            dropped += 1;
        }
    }

    Ok(Processed {
        report: Report {
            line: line_no,
            species: n_species,
            paralogs,
            class,
            emitted: trees.len(),
            dropped,
        },
        trees,
        outgroups: suggestions,
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Non-blank lines of the input file
    pub read: usize,
    pub written: usize,
    /// Trivial trees left out of the output
    pub dropped: usize,
}

fn write_lines<'a>(filename: &str, lines: impl Iterator<Item = &'a str>) -> Result<(), FileError> {
    let mut out = BufWriter::new(File::create(filename).map_err(|source| {
        FileError::WhileCreating { source, filename: filename.to_owned() }
    })?);
    let writing = |source: std::io::Error| FileError::WhileWriting { source, filename: filename.to_owned() };
    for l in lines {
        out.write_all(l.as_bytes()).map_err(writing)?;
    }
    out.flush().map_err(writing)
}

/// Process every tree of `input` and write the resulting trees to `output`,
/// one per line, in input order. Nothing is written unless all the trees have
/// been successfully processed.
pub fn do_file(
    input: &str,
    output: &str,
    outgroups_file: Option<&str>,
    settings: &Settings,
) -> Result<Summary> {
    let lines = BufReader::new(
        File::open(input)
            .map_err(|source| FileError::CannotOpen { source, filename: input.to_owned() })?,
    )
    .lines()
    .collect::<Result<Vec<_>, _>>()
    .with_context(|| format!("while reading {}", input.yellow().bold()))?;
    let todo = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect::<Vec<_>>();
    info!("Processing {} trees from {}", todo.len(), input.bright_yellow().bold());

    let bar = if todo.len() > 100 && atty::is(atty::Stream::Stderr) {
        Some(ProgressBar::new(todo.len() as u64))
    } else {
        None
    };
    let processed = todo
        .par_iter()
        .map(|(i, l)| {
            let r = process_tree(*i, l, settings);
            if let Some(b) = bar.as_ref() {
                b.inc(1);
            }
            r
        })
        .collect::<Result<Vec<_>>>()?;
    if let Some(b) = bar {
        b.finish_and_clear();
    }

    for p in processed.iter() {
        p.report.log();
    }

    let summary = Summary {
        read: processed.len(),
        written: processed.iter().map(|p| p.trees.len()).sum(),
        dropped: processed.iter().map(|p| p.report.dropped).sum(),
    };

    write_lines(
        output,
        processed.iter().flat_map(|p| p.trees.iter()).flat_map(|t| [t.as_str(), "\n"]),
    )?;
    if let Some(outgroups_file) = outgroups_file {
        write_lines(outgroups_file, processed.iter().filter_map(|p| p.outgroups.as_deref()))?;
    }

    Ok(summary)
}
