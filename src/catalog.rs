//! @ai:module:intent Prompt catalog: test-case ids mapped to generation prompts
//! @ai:module:layer domain
//! @ai:module:public_api TestCase, PromptCatalog
//! @ai:module:stateless true

use crate::error::ConfigurationError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// @ai:intent A single unit of generation work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable join key across every stage
    pub id: String,
    pub prompt: String,
}

/// @ai:intent Ordered set of test cases keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptCatalog {
    entries: BTreeMap<String, String>,
}

/// @ai:intent TOML layout: a `[prompts]` table of id = prompt
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    prompts: CatalogEntries,
}

/// Map entries in document order, duplicates included, so `from_pairs` can reject them
#[derive(Debug, Default)]
struct CatalogEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for CatalogEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = CatalogEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of test case id to prompt text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(CatalogEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl PromptCatalog {
    /// @ai:intent Build a catalog from id/prompt pairs
    /// @ai:pre every id is non-empty after trimming
    /// @ai:effects pure
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = BTreeMap::new();

        for (id, prompt) in pairs {
            let id = id.into();

            if id.trim().is_empty() {
                return Err("test case id must be a non-empty string".to_string());
            }

            if !is_addressable(&id) {
                return Err(format!("test case id '{id}' cannot be used as a file name"));
            }

            if entries.insert(id.clone(), prompt.into()).is_some() {
                return Err(format!("duplicate test case id '{id}'"));
            }
        }

        Ok(Self { entries })
    }

    /// @ai:intent Load a catalog from a flat JSON object or a TOML `[prompts]` table
    /// @ai:effects fs:read
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidCatalog {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;

        let is_toml = path
            .extension()
            .map(|ext| ext == "toml")
            .unwrap_or(false);

        let CatalogEntries(pairs) = if is_toml {
            toml::from_str::<TomlCatalog>(&content)
                .map_err(|e| invalid(e.to_string()))?
                .prompts
        } else {
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?
        };

        let catalog = Self::from_pairs(pairs).map_err(invalid)?;
        tracing::debug!("Loaded {} prompts from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// @ai:intent Iterate test cases in id order
    /// @ai:effects pure
    pub fn iter(&self) -> impl Iterator<Item = TestCase> + '_ {
        self.entries.iter().map(|(id, prompt)| TestCase {
            id: id.clone(),
            prompt: prompt.clone(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// @ai:intent Ids become `<id>.txt` and CSV cells, so path separators, control characters and dot-names are rejected
/// @ai:effects pure
fn is_addressable(id: &str) -> bool {
    !id.contains(['/', '\\']) && !id.chars().any(char::is_control) && id != "." && id != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_json_catalog_in_id_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prompts.json");
        std::fs::write(
            &path,
            r#"{"sql_injection_tests": "Create SQL injection payloads", "cjson_edge_cases": "Generate malformed JSON"}"#,
        )
        .unwrap();

        let catalog = PromptCatalog::load(&path).unwrap();
        let ids: Vec<_> = catalog.ids().collect();
        assert_eq!(ids, vec!["cjson_edge_cases", "sql_injection_tests"]);
        assert_eq!(catalog.get("cjson_edge_cases"), Some("Generate malformed JSON"));
    }

    #[test]
    fn test_load_toml_catalog() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prompts.toml");
        std::fs::write(&path, "[prompts]\nt1 = \"prompt A\"\nt2 = \"prompt B\"\n").unwrap();

        let catalog = PromptCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("t2"));
    }

    #[test]
    fn test_rejects_empty_id() {
        let result = PromptCatalog::from_pairs([("", "prompt")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_path_like_id() {
        assert!(PromptCatalog::from_pairs([("../escape", "prompt")]).is_err());
    }

    #[test]
    fn test_rejects_control_characters_in_id() {
        assert!(PromptCatalog::from_pairs([("t1\nt2", "prompt")]).is_err());
        assert!(PromptCatalog::from_pairs([("tab\there", "prompt")]).is_err());
    }

    #[test]
    fn test_duplicate_json_id_is_invalid_catalog() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prompts.json");
        std::fs::write(&path, r#"{"t1": "first", "t2": "other", "t1": "second"}"#).unwrap();

        match PromptCatalog::load(&path) {
            Err(ConfigurationError::InvalidCatalog { reason, .. }) => {
                assert!(reason.contains("duplicate test case id 't1'"), "{reason}")
            }
            other => panic!("expected invalid catalog, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_json_is_invalid_catalog() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prompts.json");
        std::fs::write(&path, r#"{"t1": {"nested": true}}"#).unwrap();

        assert!(matches!(
            PromptCatalog::load(&path),
            Err(ConfigurationError::InvalidCatalog { .. })
        ));
    }
}
