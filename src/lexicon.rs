//! Keyword tables driving importance scoring and entity/topic extraction.
//!
//! The tables are data, not code: a [`Lexicon`] is loaded once when the
//! store is built and can be swapped (or versioned) without touching the
//! scoring or extraction algorithms. The built-in tables are French, the
//! language the assistant converses in.

use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Versioned set of keyword tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Lexicon {
    /// Identifies the table set, e.g. `"fr-1"`
    pub version: String,
    /// Each distinct term found in a turn adds to its importance
    pub high_importance: Vec<String>,
    /// Substrings marking the user talking about themselves
    pub first_person: Vec<String>,
    /// Substrings marking an explanatory response
    pub definitional: Vec<String>,
    /// Capitalized tokens that are never entities
    pub entity_stoplist: Vec<String>,
    /// Topic tag -> keywords that reveal it
    pub topics: BTreeMap<String, Vec<String>>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        let topics = [
            (
                "programmation",
                &["python", "code", "programmation", "développement", "bug", "fonction"][..],
            ),
            (
                "alimentation",
                &["manger", "nourriture", "cuisine", "restaurant", "recette", "plat"][..],
            ),
            (
                "travail",
                &["travail", "bureau", "collègue", "projet", "réunion", "entreprise"][..],
            ),
            (
                "personnel",
                &["famille", "ami", "maison", "vacances", "loisir", "hobby"][..],
            ),
            (
                "technologie",
                &["ordinateur", "internet", "ia", "intelligence", "artificielle", "tech"][..],
            ),
            (
                "santé",
                &["santé", "médecin", "maladie", "sport", "exercice", "bien-être"][..],
            ),
        ]
        .into_iter()
        .map(|(topic, words)| (topic.to_string(), owned(words)))
        .collect();

        Self {
            version: "fr-1".to_string(),
            high_importance: owned(&[
                "préférence",
                "n'aime pas",
                "déteste",
                "adore",
                "important",
                "nom",
                "âge",
                "travail",
                "famille",
                "objectif",
                "problème",
                "erreur",
                "bug",
                "solution",
                "urgent",
                "critique",
            ]),
            first_person: owned(&["je", "mon", "ma", "mes"]),
            definitional: owned(&["définition", "explication", "signifie"]),
            entity_stoplist: owned(&["Nina", "User", "Je", "Tu", "Il", "Elle"]),
            topics,
        }
    }
}

impl Lexicon {
    /// Parse a lexicon from TOML; absent tables fall back to the built-in ones
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MemoryError::Configuration(format!("Invalid lexicon: {e}")))
    }

    /// Load a lexicon from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Configuration(format!(
                "Failed to read lexicon '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.entity_stoplist.iter().any(|s| s == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let lexicon = Lexicon::default();
        assert_eq!(lexicon.version, "fr-1");
        assert_eq!(lexicon.topics.len(), 6);
        assert!(lexicon.topics["programmation"].contains(&"bug".to_string()));
        assert!(lexicon.is_stopword("Nina"));
        assert!(!lexicon.is_stopword("Paul"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let lexicon = Lexicon::from_toml_str(
            r#"
            version = "en-1"
            first_person = ["i", "my"]

            [topics]
            cooking = ["recipe", "oven"]
            "#,
        )
        .unwrap();

        assert_eq!(lexicon.version, "en-1");
        assert_eq!(lexicon.first_person, vec!["i", "my"]);
        assert_eq!(lexicon.topics.len(), 1);
        assert_eq!(lexicon.entity_stoplist, Lexicon::default().entity_stoplist);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = Lexicon::from_toml_str("first_person = 3").unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }
}
