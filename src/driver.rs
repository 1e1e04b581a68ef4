//! Source files in, one IR module out.
//!
//! Lexing and parsing run per file and stop at that file's first error.
//! Analysis sees every file at once. Any error means the caller gets the
//! empty IR skeleton back.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::{CompileOptions, Language};
use crate::dsl::analyzer::{analyze, check_language_subset};
use crate::dsl::ast::Module;
use crate::dsl::error::{offset_to_line_col, CompileError, ErrorKind};
use crate::dsl::lexer::tokenize;
use crate::dsl::parser::{parse_with, EntitySyntax};
use crate::ir::{self, IRModule, IRSourceFile, IRSourceMap};

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    pub language: Language,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language,
        }
    }
}

/// An error as reported to callers: location resolved against its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl Diagnostic {
    fn in_file(error: CompileError, file: &SourceFile) -> Self {
        let position = error.position();
        let (line, column) = offset_to_line_col(&file.content, position);
        Self {
            kind: error.kind,
            message: error.message,
            file: Some(file.path.clone()),
            position: Some(position),
            line: Some(line),
            column: Some(column),
        }
    }
}

impl fmt::Display for Diagnostic {
    /// `path:line:col: [kind] message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}:")?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, "{line}:{column}:")?;
            }
            f.write_str(" ")?;
        }
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct CompileResult {
    pub ir: IRModule,
    pub errors: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn failed(options: &CompileOptions, errors: Vec<Diagnostic>) -> Self {
        Self {
            ir: IRModule::empty(options.module_name()),
            errors,
        }
    }
}

/// Lex and parse one file with the given entity grammar.
pub fn parse_source(source: &str, entity_syntax: EntitySyntax) -> Result<Module, CompileError> {
    let tokens = tokenize(source)?;
    tracing::debug!(tokens = tokens.len(), "tokenized");
    parse_with(tokens, entity_syntax)
}

/// Compile an ordered set of files into one IR module.
pub fn compile(sources: &[SourceFile], options: &CompileOptions) -> CompileResult {
    let mut modules = Vec::with_capacity(sources.len());
    let mut errors = Vec::new();

    for file in sources {
        let syntax = options.entity_syntax_for(file.language);
        match parse_source(&file.content, syntax) {
            Ok(module) => {
                tracing::debug!(
                    path = %file.path,
                    language = %file.language,
                    items = module.items.len(),
                    "parsed"
                );
                modules.push(module);
            }
            Err(error) => {
                tracing::debug!(path = %file.path, error = %error, "front end failed");
                errors.push(Diagnostic::in_file(error, file));
            }
        }
    }
    if !errors.is_empty() {
        return CompileResult::failed(options, errors);
    }

    // Every file parsed, so `modules` and `sources` line up index for index.
    for (module, file) in modules.iter().zip(sources) {
        errors.extend(
            check_language_subset(module, file.language)
                .into_iter()
                .map(|error| Diagnostic::in_file(error, file)),
        );
    }
    for semantic in analyze(&modules) {
        if let Some(file) = sources.get(semantic.module) {
            errors.push(Diagnostic::in_file(semantic.error, file));
        }
    }
    if !errors.is_empty() {
        tracing::debug!(errors = errors.len(), "semantic analysis failed");
        return CompileResult::failed(options, errors);
    }

    let mut ir = ir::generate(&modules, options.module_name());
    if let Some(metadata) = ir.metadata.as_mut() {
        metadata.source_files = sources.iter().map(|file| file.path.clone()).collect();
    }
    if options.include_source_map {
        ir.source_map = Some(IRSourceMap {
            files: sources
                .iter()
                .map(|file| IRSourceFile {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    language: file.language,
                })
                .collect(),
        });
    }

    tracing::info!(
        module = %ir.module,
        files = sources.len(),
        components = ir.components.len(),
        rules = ir.rules.len(),
        functions = ir.functions.len(),
        "compiled"
    );
    CompileResult { ir, errors }
}

/// Compile one in-memory source, reported as `input.<tag>`.
pub fn compile_single(source: &str, language: Language, options: &CompileOptions) -> CompileResult {
    let file = SourceFile::new(format!("input.{}", language.tag()), source, language);
    compile(std::slice::from_ref(&file), options)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::{IRAction, IRExpression, IRValue, ModifyOp};

    const COMBAT: &str = "component Health { current: integer max: integer }\n\
                          rule dmg on Hit(h: id) { h.Health.current -= 10 }\n";

    fn assert_skeleton(result: &CompileResult) {
        assert!(result.ir.components.is_empty());
        assert!(result.ir.rules.is_empty());
        assert!(result.ir.functions.is_empty());
        assert!(result.ir.initial_state.is_none());
        assert!(result.ir.metadata.is_none());
    }

    #[test]
    fn end_to_end_two_files() {
        let sources = [
            SourceFile::new("combat.brl", COMBAT, Language::Brl),
            SourceFile::new(
                "world.bdl",
                "entity { Health { current: 100 max: 100 } }",
                Language::Bdl,
            ),
        ];
        let result = compile(&sources, &CompileOptions::default());
        assert_eq!(result.errors, []);
        assert_eq!(result.ir.module, "main");
        assert_eq!(result.ir.components.len(), 1);
        assert_eq!(result.ir.rules.len(), 1);
        assert_eq!(result.ir.entities().len(), 1);
        assert_eq!(
            result.ir.entities()[0].components["Health"]["current"],
            IRValue::Number(100.0)
        );
        assert_eq!(
            result.ir.rules[0].actions,
            [IRAction::Modify {
                entity: Some(IRExpression::Var { name: "h".into() }),
                component: Some("Health".into()),
                field: Some("current".into()),
                index: None,
                op: ModifyOp::Subtract,
                value: IRExpression::Literal {
                    value: IRValue::Number(10.0)
                },
            }]
        );
        assert_eq!(
            result.ir.metadata.unwrap().source_files,
            ["combat.brl", "world.bdl"]
        );
        assert!(result.ir.source_map.is_none());
    }

    #[test]
    fn one_error_per_broken_file() {
        let sources = [
            SourceFile::new("a.brl", "rule r on E(e: id) { let s = \"open }", Language::Brl),
            SourceFile::new("b.brl", COMBAT, Language::Brl),
            SourceFile::new("c.brl", "component {\n component", Language::Brl),
        ];
        let result = compile(&sources, &CompileOptions::default());
        let summary: Vec<(ErrorKind, Option<&str>)> = result
            .errors
            .iter()
            .map(|d| (d.kind, d.file.as_deref()))
            .collect();
        assert_eq!(
            summary,
            [
                (ErrorKind::Lexer, Some("a.brl")),
                (ErrorKind::Parser, Some("c.brl")),
            ]
        );
        assert_skeleton(&result);
    }

    #[test]
    fn semantic_errors_return_skeleton() {
        let result = compile_single(
            &format!("{COMBAT}rule r on E(e: id) {{ let y = x }}"),
            Language::Brl,
            &CompileOptions::default(),
        );
        assert_eq!(result.errors.len(), 1);
        let diagnostic = &result.errors[0];
        assert_eq!(diagnostic.kind, ErrorKind::Semantic);
        assert_eq!(diagnostic.file.as_deref(), Some("input.brl"));
        assert_eq!(diagnostic.line, Some(3));
        assert!(diagnostic.message.contains("'x'"));
        assert_skeleton(&result);
        assert!(!result.is_ok());
    }

    #[test]
    fn diagnostic_line_and_column() {
        let result = compile_single(
            "component A { x: integer }\n  rule r on E(e: id) { @ }",
            Language::Brl,
            &CompileOptions::default(),
        );
        let diagnostic = &result.errors[0];
        assert_eq!(diagnostic.kind, ErrorKind::Lexer);
        assert_eq!(diagnostic.position, Some(50));
        assert_eq!((diagnostic.line, diagnostic.column), (Some(2), Some(24)));
        assert!(diagnostic
            .to_string()
            .starts_with("input.brl:2:24: [lexer] "));
    }

    #[test]
    fn language_subsets_are_enforced() {
        let result = compile_single(
            "component A { x: integer }\nrule r on E(e: id) { }",
            Language::Bdl,
            &CompileOptions::default(),
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Rules are not allowed in BDL files");
        assert_eq!(result.errors[0].line, Some(2));
    }

    #[test]
    fn source_map_and_module_name() {
        let options = CompileOptions {
            module_name: Some("arena".into()),
            include_source_map: true,
            ..CompileOptions::default()
        };
        let result = compile_single(COMBAT, Language::Brl, &options);
        assert!(result.is_ok());
        assert_eq!(result.ir.module, "arena");
        let files = result.ir.source_map.unwrap().files;
        assert_eq!(
            files,
            [IRSourceFile {
                path: "input.brl".into(),
                content: COMBAT.into(),
                language: Language::Brl,
            }]
        );
    }

    #[test]
    fn entity_syntax_follows_language() {
        let entity = "entity { Health { current: 1 max: 1 } }";
        let sources = |language| {
            [
                SourceFile::new("combat.brl", COMBAT, Language::Brl),
                SourceFile::new("world", entity, language),
            ]
        };

        let strict = compile(&sources(Language::Brl), &CompileOptions::default());
        assert_eq!(strict.errors.len(), 1);
        assert!(strict.errors[0].message.starts_with("Anonymous entity blocks"));

        let permissive = CompileOptions {
            entity_syntax: Some(EntitySyntax::Permissive),
            ..CompileOptions::default()
        };
        assert!(compile(&sources(Language::Brl), &permissive).is_ok());
    }

    #[test]
    fn compile_is_deterministic() {
        let sources = [
            SourceFile::new("combat.brl", COMBAT, Language::Brl),
            SourceFile::new(
                "ai.bcl",
                "choice fn select_target(enemies: list<id>): id { return enemies[0] }\n\
                 choice fn flee(e: Health): boolean { return e.Health.current < 10 }",
                Language::Bcl,
            ),
        ];
        let first = serde_json::to_string(&compile(&sources, &CompileOptions::default())).unwrap();
        let second = serde_json::to_string(&compile(&sources, &CompileOptions::default())).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"choice_points\""));
    }
}
