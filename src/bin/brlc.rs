use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use brl_compiler::config::{load_config, ConfigError, CONFIG_FILE_NAME};
use brl_compiler::driver::parse_source;
use brl_compiler::dsl::builtins::{self, BUILTINS};
use brl_compiler::dsl::error::offset_to_line_col;
use brl_compiler::dsl::lexer::tokenize;
use brl_compiler::{
    compile, merge_modules, CompileError, CompileOptions, Diagnostic, EntitySyntax, IRModule,
    Language, SourceFile,
};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "brlc", about = "Compiler for BRL, BCL and BDL game-rule files", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print diagnostics as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Args)]
struct InputArgs {
    /// Source files, in compilation order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Language for every file, instead of inferring it from the extension
    #[arg(long)]
    lang: Option<Language>,

    /// Options file (defaults to ./brlc.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entity declaration grammar for every file
    #[arg(long, value_enum)]
    entity_syntax: Option<EntitySyntax>,

    /// Name of the generated IR module
    #[arg(long)]
    module_name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source files to IR JSON
    Compile {
        #[command(flatten)]
        input: InputArgs,
        /// Write the IR here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pretty-print the IR
        #[arg(long)]
        pretty: bool,
        /// Embed the sources in the IR
        #[arg(long)]
        source_map: bool,
    },
    /// Report diagnostics without writing IR
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the token stream of a file
    Tokens { file: PathBuf },
    /// Print the parsed AST of a file as JSON
    Ast {
        file: PathBuf,
        #[arg(long, value_enum)]
        entity_syntax: Option<EntitySyntax>,
    },
    /// Merge compiled IR fragments into one module
    Merge {
        /// IR JSON files, in merge order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Name of the merged module
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the JSON Schema of the IR
    Schema,
    /// List the builtin functions callable from every language
    Builtins,
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}: cannot tell the language from the file extension (use --lang)")]
    UnknownLanguage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{path} is not a valid IR module: {source}")]
    InvalidIr {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// Diagnostics were already printed.
    #[error("compilation failed with {0} error(s)")]
    Failed(usize),
}

// ── Helpers ──────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "brl_compiler=warn,brlc=info",
        1 => "brl_compiler=debug,brlc=debug",
        _ => "brl_compiler=trace,brlc=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn read_sources(input: &InputArgs) -> Result<Vec<SourceFile>, CliError> {
    input
        .files
        .iter()
        .map(|path| {
            let display = path.display().to_string();
            let language = input
                .lang
                .or_else(|| Language::from_path(path))
                .ok_or_else(|| CliError::UnknownLanguage(display.clone()))?;
            Ok(SourceFile::new(display, read_file(path)?, language))
        })
        .collect()
}

/// Config file first, then command-line overrides.
fn resolve_options(input: &InputArgs) -> Result<CompileOptions, CliError> {
    let mut options = match &input.config {
        Some(path) => load_config(path)?,
        None if Path::new(CONFIG_FILE_NAME).is_file() => load_config(Path::new(CONFIG_FILE_NAME))?,
        None => CompileOptions::default(),
    };
    if let Some(name) = &input.module_name {
        options.module_name = Some(name.clone());
    }
    if let Some(syntax) = input.entity_syntax {
        options.entity_syntax = Some(syntax);
    }
    Ok(options)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

fn write_output(text: &str, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => std::fs::write(path, format!("{text}\n")).map_err(|source| CliError::Write {
            path: path.display().to_string(),
            source,
        }),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn report(diagnostics: &[Diagnostic], json: bool) -> Result<(), CliError> {
    if json {
        eprintln!("{}", to_json(&diagnostics, true)?);
    } else {
        for diagnostic in diagnostics {
            eprintln!("{diagnostic}");
        }
    }
    Ok(())
}

/// Single-file front-end failure, reported like a compile diagnostic.
fn report_front_end(
    path: &Path,
    source: &str,
    error: CompileError,
    json: bool,
) -> Result<(), CliError> {
    let position = error.position();
    let (line, column) = offset_to_line_col(source, position);
    let diagnostic = Diagnostic {
        kind: error.kind,
        message: error.message,
        file: Some(path.display().to_string()),
        position: Some(position),
        line: Some(line),
        column: Some(column),
    };
    report(std::slice::from_ref(&diagnostic), json)?;
    Err(CliError::Failed(1))
}

// ── Commands ─────────────────────────────────────────────────────

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Compile {
            input,
            output,
            pretty,
            source_map,
        } => {
            let mut options = resolve_options(&input)?;
            options.include_source_map |= source_map;
            let sources = read_sources(&input)?;
            let result = compile(&sources, &options);
            if !result.is_ok() {
                report(&result.errors, cli.json)?;
                return Err(CliError::Failed(result.errors.len()));
            }
            write_output(&to_json(&result.ir, pretty)?, output.as_deref())?;
            if let Some(path) = &output {
                tracing::info!(path = %path.display(), "wrote IR");
            }
            Ok(())
        }
        Commands::Check { input } => {
            let options = resolve_options(&input)?;
            let sources = read_sources(&input)?;
            let result = compile(&sources, &options);
            report(&result.errors, cli.json)?;
            if result.is_ok() {
                tracing::info!(files = sources.len(), "no errors");
                Ok(())
            } else {
                Err(CliError::Failed(result.errors.len()))
            }
        }
        Commands::Tokens { file } => {
            let source = read_file(&file)?;
            let tokens = match tokenize(&source) {
                Ok(tokens) => tokens,
                Err(error) => return report_front_end(&file, &source, error, cli.json),
            };
            if cli.json {
                println!("{}", to_json(&tokens, true)?);
            } else {
                for token in &tokens {
                    let (line, column) = offset_to_line_col(&source, token.span.start);
                    println!(
                        "{line:>4}:{column:<4} {:<16} {:?}",
                        token.kind.describe(),
                        token.text
                    );
                }
            }
            Ok(())
        }
        Commands::Ast {
            file,
            entity_syntax,
        } => {
            let source = read_file(&file)?;
            let syntax = entity_syntax.unwrap_or_else(|| {
                Language::from_path(&file).map_or(EntitySyntax::Strict, Language::default_entity_syntax)
            });
            match parse_source(&source, syntax) {
                Ok(module) => {
                    println!("{}", to_json(&module, true)?);
                    Ok(())
                }
                Err(error) => report_front_end(&file, &source, error, cli.json),
            }
        }
        Commands::Merge {
            files,
            name,
            output,
            pretty,
        } => {
            let fragments = files
                .iter()
                .map(|path| {
                    let text = read_file(path)?;
                    serde_json::from_str::<IRModule>(&text).map_err(|source| CliError::InvalidIr {
                        path: path.display().to_string(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let merged = merge_modules(&fragments, name.as_deref());
            write_output(&to_json(&merged, pretty)?, output.as_deref())
        }
        Commands::Builtins => {
            if cli.json {
                let list: Vec<serde_json::Value> = BUILTINS
                    .iter()
                    .map(|b| {
                        serde_json::json!({
                            "name": b.name,
                            "arity": b.arity.describe(),
                            "category": b.category,
                            "description": b.description,
                        })
                    })
                    .collect();
                println!("{}", to_json(&list, true)?);
            } else {
                for category in builtins::categories() {
                    println!("{category}:");
                    for b in builtins::builtins_in(category) {
                        println!("  {:<16} {:<22} {}", b.name, b.arity.describe(), b.description);
                    }
                }
            }
            Ok(())
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(IRModule);
            println!("{}", to_json(&schema, true)?);
            Ok(())
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => {}
        Err(CliError::Failed(count)) => {
            tracing::debug!(count, "compilation failed");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
