//! Front end shared by BRL, BCL and BDL: lexer → parser → semantic analysis.

#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(clippy::module_name_repetitions)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
pub mod builtins;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::module_name_repetitions,
)]
pub mod analyzer;
