//! Compiler for the BRL family of game-rule languages.
//!
//! BRL holds rules and functions, BCL holds read-only choice functions, and
//! BDL holds component and entity data. All three compile to a single JSON IR
//! module consumed by the rule runtime.

pub mod config;
pub mod driver;
pub mod dsl;
pub mod ir;

pub use config::{load_config, CompileOptions, Language};
pub use driver::{compile, compile_single, CompileResult, Diagnostic, SourceFile};
pub use dsl::error::{CompileError, ErrorKind};
pub use dsl::parser::EntitySyntax;
pub use ir::{merge_modules, IRModule};
