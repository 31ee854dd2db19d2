//! Language registry for execution routing and harness selection

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;

/// Which execution backend handles a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Embedded in-process interpreter (shared, serialized access)
    Embedded,
    /// Local sandboxed script engine (fresh scope per call)
    Script,
    /// Remote compiler/execution service
    Remote,
}

/// Which harness synthesis strategy applies to a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessKind {
    /// Prologue/epilogue driver that invokes a named function with injected args
    FunctionCall,
    /// Trailing driver block that parses stdin and dispatches to known entry points
    ScriptDriver,
    /// Source is submitted as-is; grading is stdin/stdout only
    PassThrough,
}

/// Resolved configuration for a supported language
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    /// Canonical language id (e.g. "python")
    pub id: String,
    pub display_name: String,
    pub backend: BackendKind,
    pub harness: HarnessKind,
    /// Language id understood by the remote execution service
    pub remote_id: Option<String>,
    /// Toolchain version pinned for the remote execution service
    pub toolchain_version: Option<String>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    display_name: String,
    backend: BackendKind,
    harness: HarnessKind,
    remote_id: Option<String>,
    toolchain_version: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Global language registry
static LANGUAGES: OnceLock<HashMap<String, LanguageSpec>> = OnceLock::new();

/// Initialize the language registry from the bundled TOML file.
/// Repeated initialization keeps the first registry.
pub fn init_languages() -> anyhow::Result<()> {
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    let languages = parse_languages(content)?;
    let _ = LANGUAGES.set(languages);
    Ok(())
}

fn parse_languages(content: &str) -> anyhow::Result<HashMap<String, LanguageSpec>> {
    let raw_configs: HashMap<String, RawLanguageConfig> =
        toml::from_str(content).context("Invalid language registry TOML")?;

    let mut languages = HashMap::new();

    for (name, raw) in raw_configs {
        if raw.backend == BackendKind::Remote && raw.toolchain_version.is_none() {
            anyhow::bail!("Remote language {} requires a toolchain_version", name);
        }

        let spec = LanguageSpec {
            id: name.to_lowercase(),
            display_name: raw.display_name,
            backend: raw.backend,
            harness: raw.harness,
            remote_id: raw.remote_id,
            toolchain_version: raw.toolchain_version,
        };

        // Add main language name
        languages.insert(name.to_lowercase(), spec.clone());

        // Add aliases
        for alias in raw.aliases {
            languages.insert(alias.to_lowercase(), spec.clone());
        }
    }

    Ok(languages)
}

/// Get the language spec by language name or alias
pub fn get_language_spec(language: &str) -> Option<LanguageSpec> {
    LANGUAGES.get()?.get(&language.to_lowercase()).cloned()
}

/// Get all supported language names and aliases
pub fn get_supported_languages() -> Vec<String> {
    LANGUAGES
        .get()
        .map(|langs| langs.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_REGISTRY: &str = r#"
[python]
display_name = "Python 3"
backend = "embedded"
harness = "function_call"
aliases = ["py", "python3"]

[c]
display_name = "C"
backend = "remote"
harness = "pass_through"
remote_id = "c"
toolchain_version = "10.2.0"
"#;

    #[test]
    fn test_parse_registry_with_aliases() {
        let languages = parse_languages(TEST_REGISTRY).unwrap();

        assert!(languages.contains_key("python"));
        assert!(languages.contains_key("py"));
        assert!(languages.contains_key("python3"));
        assert_eq!(languages["py"].id, "python");
        assert_eq!(languages["py"].backend, BackendKind::Embedded);
    }

    #[test]
    fn test_remote_language_carries_toolchain_version() {
        let languages = parse_languages(TEST_REGISTRY).unwrap();

        let c = &languages["c"];
        assert_eq!(c.backend, BackendKind::Remote);
        assert_eq!(c.harness, HarnessKind::PassThrough);
        assert_eq!(c.toolchain_version.as_deref(), Some("10.2.0"));
    }

    #[test]
    fn test_remote_language_requires_version() {
        let invalid = r#"
[go]
display_name = "Go"
backend = "remote"
harness = "pass_through"
"#;
        assert!(parse_languages(invalid).is_err());
    }

    #[test]
    fn test_bundled_registry_resolves() {
        init_languages().unwrap();

        let python = get_language_spec("PYTHON").unwrap();
        assert_eq!(python.backend, BackendKind::Embedded);

        let rhai = get_language_spec("rhai").unwrap();
        assert_eq!(rhai.backend, BackendKind::Script);
        assert_eq!(rhai.harness, HarnessKind::ScriptDriver);

        let java = get_language_spec("java").unwrap();
        assert_eq!(java.toolchain_version.as_deref(), Some("15.0.2"));

        assert!(get_language_spec("cobol").is_none());
    }
}
