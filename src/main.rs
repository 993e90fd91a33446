use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::*;

mod decomp;
mod errors;
mod newick;
mod outgroups;
mod paralogs;
mod pipeline;
mod rooting;
mod species;
mod tagging;
mod tree;

use errors::RuntimeError;
use pipeline::{Mode, Settings};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Input file, one newick tree per line
    #[clap(short, long)]
    input: String,

    /// Output file; defaults to <input stem>-decomp.<input extension>
    #[clap(short, long)]
    output: Option<String>,

    /// Separates the species name from the rest of a leaf label
    #[clap(short, long, default_value = "_")]
    delimiter: String,

    /// Only output the pruned main tree of each input tree
    #[clap(short, long)]
    max_only: bool,

    /// Do not output the excised clades whose species are a subset of the other side
    #[clap(short = 's', long)]
    no_subsets: bool,

    /// Remove duplicated leaves from the smallest clade under each duplication
    #[clap(short, long)]
    trim: bool,

    /// Trim both ways, yielding two single-copy trees per input tree
    #[clap(long)]
    trim_both: bool,

    /// Draw single-copy trees by keeping a random side of each duplication
    #[clap(short, long)]
    random_sample: bool,

    /// Number of samples per tree: linear, exp, or a fixed integer
    #[clap(long, default_value = "5")]
    rand_sampling_method: String,

    /// Base seed of the sampling generator
    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// Keep the output trees without any quartet
    #[clap(long)]
    trivial: bool,

    /// Write the suggested outgroups to <input stem>_outgroups.txt
    #[clap(long)]
    outgroups: bool,

    /// Collapse in-paralogs before rooting
    #[clap(long)]
    remove_in_paralogs: bool,

    /// Number of threads; 0 to use all cores
    #[clap(short = 'j', long, default_value_t = 0)]
    threads: usize,

    #[clap(flatten)]
    verbose: Verbosity<WarnLevel>,
}

fn mode(args: &Args) -> Result<Mode, RuntimeError> {
    let trimming = args.trim || args.trim_both;
    let splitting = args.max_only || args.no_subsets;
    if trimming && args.random_sample {
        return Err(RuntimeError::ConflictingModes("--trim", "--random-sample"));
    }
    if splitting && trimming {
        return Err(RuntimeError::ConflictingModes("--max-only/--no-subsets", "--trim"));
    }
    if splitting && args.random_sample {
        return Err(RuntimeError::ConflictingModes("--max-only/--no-subsets", "--random-sample"));
    }

    Ok(if trimming {
        Mode::Trim { both: args.trim_both }
    } else if args.random_sample {
        Mode::Sample(args.rand_sampling_method.parse()?)
    } else {
        Mode::Decompose { max_only: args.max_only, no_subsets: args.no_subsets }
    })
}

/// A file next to `input`, named after its stem.
fn sibling(input: &str, suffix: &str, extension: Option<&str>) -> String {
    let path = Path::new(input);
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match extension.or_else(|| path.extension().and_then(|e| e.to_str())) {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name).to_string_lossy().into_owned()
}

fn main() -> Result<()> {
    let args = Args::parse();
    buche::new()
        .verbosity(args.verbose.log_level_filter())
        .init()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;
    debug!("Using {} threads", rayon::current_num_threads());

    let settings = Settings {
        delimiter: args.delimiter.clone(),
        remove_in_paralogs: args.remove_in_paralogs,
        mode: mode(&args)?,
        keep_trivial: args.trivial,
        outgroups: args.outgroups,
        seed: args.seed,
    };
    let output = args.output.clone().unwrap_or_else(|| sibling(&args.input, "-decomp", None));
    let outgroups = args.outgroups.then(|| sibling(&args.input, "_outgroups", Some("txt")));

    let summary = pipeline::do_file(&args.input, &output, outgroups.as_deref(), &settings)
        .with_context(|| format!("while processing {}", args.input.bright_yellow().bold()))?;
    info!(
        "{} trees read; {} trees written to {}; {} trivial trees dropped",
        summary.read,
        summary.written,
        output.bright_yellow().bold(),
        summary.dropped
    );
    if let Some(outgroups) = outgroups {
        info!("Outgroups written to {}", outgroups.bright_yellow().bold());
    }

    Ok(())
}
