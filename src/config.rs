use std::fmt;
use std::path::Path;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::dsl::parser::EntitySyntax;

/// Default IR module name when none is configured.
pub const DEFAULT_MODULE_NAME: &str = "main";

/// Name of the optional project config file read by the CLI.
pub const CONFIG_FILE_NAME: &str = "brlc.json";

/// The three surface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Language {
    /// Full rule language.
    Brl,
    /// Read-only choice/strategy subset.
    Bcl,
    /// Data-only subset.
    Bdl,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::Brl => "brl",
            Language::Bcl => "bcl",
            Language::Bdl => "bdl",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Brl => "BRL",
            Language::Bcl => "BCL",
            Language::Bdl => "BDL",
        }
    }

    /// Language implied by a file extension, e.g. `rules/combat.brl`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// Entity grammar used when the options do not pick one.
    pub fn default_entity_syntax(self) -> EntitySyntax {
        match self {
            Language::Brl => EntitySyntax::Strict,
            Language::Bcl | Language::Bdl => EntitySyntax::Permissive,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language '{0}' (expected brl, bcl, or bdl)")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "brl" => Ok(Language::Brl),
            "bcl" => Ok(Language::Bcl),
            "bdl" => Ok(Language::Bdl),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

/// Options accepted by `compile`; also the shape of `brlc.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct CompileOptions {
    /// Name stamped on the IR module. None = [`DEFAULT_MODULE_NAME`].
    #[serde(default)]
    pub module_name: Option<String>,
    /// Embed every source file in the IR's source map.
    #[serde(default)]
    pub include_source_map: bool,
    /// Entity grammar for every file. None = chosen per file from its language.
    #[serde(default)]
    pub entity_syntax: Option<EntitySyntax>,
}

impl CompileOptions {
    pub fn module_name(&self) -> &str {
        self.module_name.as_deref().unwrap_or(DEFAULT_MODULE_NAME)
    }

    pub fn entity_syntax_for(&self, language: Language) -> EntitySyntax {
        self.entity_syntax
            .unwrap_or_else(|| language.default_entity_syntax())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Load compile options from a JSON config file.
pub fn load_config(path: &Path) -> Result<CompileOptions, ConfigError> {
    let display = path.display().to_string();
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let options = serde_json::from_str(&data).map_err(|source| ConfigError::Json {
        path: display,
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded compile options");
    Ok(options)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn language_tags() {
        assert_eq!("brl".parse::<Language>().unwrap(), Language::Brl);
        assert_eq!("BDL".parse::<Language>().unwrap(), Language::Bdl);
        assert_eq!(
            "lua".parse::<Language>().unwrap_err().to_string(),
            "unknown language 'lua' (expected brl, bcl, or bdl)"
        );
        assert_eq!(Language::from_path(Path::new("game/ai.bcl")), Some(Language::Bcl));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn entity_syntax_defaults() {
        let options = CompileOptions::default();
        assert_eq!(options.module_name(), "main");
        assert_eq!(options.entity_syntax_for(Language::Brl), EntitySyntax::Strict);
        assert_eq!(options.entity_syntax_for(Language::Bdl), EntitySyntax::Permissive);

        let forced = CompileOptions {
            entity_syntax: Some(EntitySyntax::Strict),
            ..CompileOptions::default()
        };
        assert_eq!(forced.entity_syntax_for(Language::Bdl), EntitySyntax::Strict);
    }

    #[test]
    fn load_config_reads_options_file() {
        let dir = std::env::temp_dir().join("brlc_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path: PathBuf = dir.join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "module_name": "arena", "include_source_map": true, "entity_syntax": "permissive" }"#,
        )
        .unwrap();

        let options = load_config(&path).unwrap();
        assert_eq!(
            options,
            CompileOptions {
                module_name: Some("arena".into()),
                include_source_map: true,
                entity_syntax: Some(EntitySyntax::Permissive),
            }
        );

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Json { .. })));
        assert!(matches!(
            load_config(&dir.join("missing.json")),
            Err(ConfigError::Io { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
