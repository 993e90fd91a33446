use colored::Colorize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to open {}", .filename.bright_yellow().bold())]
    CannotOpen { source: std::io::Error, filename: String },

    #[error("while creating {}", .filename.bright_yellow().bold())]
    WhileCreating { source: std::io::Error, filename: String },

    #[error("while writing to {}", .filename.bright_yellow().bold())]
    WhileWriting { source: std::io::Error, filename: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum NewickError {
    #[error("unexpected character `{found}` at position {pos}")]
    UnexpectedChar { found: char, pos: usize },

    #[error("unbalanced parentheses at position {0}")]
    Unbalanced(usize),

    #[error("missing final `;`")]
    MissingSemicolon,

    #[error("invalid branch length `{0}`")]
    InvalidLength(String),

    #[error("unterminated {what} starting at position {pos}")]
    Unterminated { what: &'static str, pos: usize },

    #[error("trailing characters after `;` at position {0}")]
    Trailing(usize),
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("malformed tree on line {}", .line.to_string().yellow().bold())]
    MalformedTree { line: usize, source: NewickError },

    #[error("found a leaf without label; no species can be assigned to it")]
    UnlabeledLeaf,

    #[error("species {} has not been registered", .0.yellow().bold())]
    UnknownSpecies(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum TopologyError {
    #[error("node {node} has {children} children where a binary node was expected")]
    NotBinary { node: usize, children: usize },
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("invalid sampling method {}; expected `linear`, `exp` or an integer", .0.yellow().bold())]
    InvalidSamplingMethod(String),

    #[error("{} duplications would require too many samples", .0.to_string().yellow().bold())]
    TooManySamples(usize),

    #[error("{} and {} can not be used together", .0.bright_yellow().bold(), .1.bright_yellow().bold())]
    ConflictingModes(&'static str, &'static str),
}
