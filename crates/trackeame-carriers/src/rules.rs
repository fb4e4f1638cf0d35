//! Keyword rule sets that classify carrier wording into a [`Status`].
//!
//! Each carrier ships a versioned TOML document (see `src/rules/`). The
//! documents are compiled in and can be replaced at runtime by dropping a
//! `<slug>.toml` file into a rules directory, so a change in carrier copy does
//! not need a rebuild.
//!
//! Whatever order the rules appear in, they are evaluated by category in
//! [`Status::CLASSIFICATION_ORDER`] and the first category with a hit wins.
//! Rules sharing a category keep their file order.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use trackeame_types::Status;

use crate::error::AdapterError;
use crate::normalize::normalize;

const BUILTIN: &[(&str, &str)] = &[
    ("andreani", include_str!("rules/andreani.toml")),
    ("correo-argentino", include_str!("rules/correo-argentino.toml")),
];

/// Which column of a timeline entry a rule's keywords are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    #[default]
    Description,
    RawStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordRule {
    pub status: Status,
    #[serde(default)]
    pub field: MatchField,
    /// Phrase the description must contain before this rule is considered.
    #[serde(default)]
    pub requires: Option<String>,
    pub keywords: Vec<String>,
}

/// A carrier's complete classification vocabulary.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordRules {
    pub version: u32,
    pub carrier: String,
    /// Page phrases meaning "this code has no tracking data".
    #[serde(default)]
    pub not_found_markers: Vec<String>,
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
}

impl KeywordRules {
    /// Parse a rule document and normalize its keywords.
    pub fn from_toml(carrier: &str, text: &str) -> Result<Self, AdapterError> {
        let mut rules: KeywordRules = toml::from_str(text).map_err(|e| AdapterError::Rules {
            carrier: carrier.to_owned(),
            message: e.to_string(),
        })?;

        if rules.carrier != carrier {
            return Err(AdapterError::Rules {
                carrier: carrier.to_owned(),
                message: format!("document is for carrier {:?}", rules.carrier),
            });
        }

        for rule in &mut rules.rules {
            if rule.keywords.is_empty() {
                return Err(AdapterError::Rules {
                    carrier: carrier.to_owned(),
                    message: format!("a {} rule has no keywords", rule.status),
                });
            }
            rule.keywords = rule.keywords.iter().map(|k| normalize(k)).collect();
            rule.requires = rule.requires.as_deref().map(normalize);
        }
        rules.not_found_markers = rules.not_found_markers.iter().map(|m| normalize(m)).collect();
        // Stable: same-category rules keep their document order.
        rules.rules.sort_by_key(|r| r.status.classification_rank());

        Ok(rules)
    }

    /// The compiled-in document for `carrier`, if there is one.
    pub fn builtin(carrier: &str) -> Option<Result<Self, AdapterError>> {
        BUILTIN
            .iter()
            .find(|(slug, _)| *slug == carrier)
            .map(|(slug, text)| Self::from_toml(slug, text))
    }

    /// Classify one timeline entry. Falls back to [`Status::Pending`].
    pub fn classify(&self, description: &str, raw_status: Option<&str>) -> Status {
        let description = normalize(description);
        let raw_status = raw_status.map(normalize).unwrap_or_default();

        for rule in &self.rules {
            if let Some(required) = &rule.requires {
                if !description.contains(required.as_str()) {
                    continue;
                }
            }
            let haystack = match rule.field {
                MatchField::Description => &description,
                MatchField::RawStatus => &raw_status,
            };
            if rule.keywords.iter().any(|k| haystack.contains(k.as_str())) {
                return rule.status;
            }
        }

        Status::Pending
    }

    /// Whether page text carries one of the carrier's "no data" phrases.
    pub fn signals_not_found(&self, page_text: &str) -> bool {
        let text = normalize(page_text);
        self.not_found_markers.iter().any(|m| text.contains(m.as_str()))
    }
}

/// Rule sets for every carrier with an adapter, keyed by slug.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    by_carrier: HashMap<String, Arc<KeywordRules>>,
}

impl RuleBook {
    /// Compiled-in rules only.
    pub fn builtin() -> Result<Self, AdapterError> {
        Self::load(None)
    }

    /// Compiled-in rules, with `<slug>.toml` files in `dir` taking precedence.
    pub fn load(dir: Option<&Path>) -> Result<Self, AdapterError> {
        let mut by_carrier = HashMap::new();

        for (slug, text) in BUILTIN {
            let override_path = dir.map(|d| d.join(format!("{slug}.toml")));
            let rules = match override_path.filter(|p| p.is_file()) {
                Some(path) => {
                    let text = std::fs::read_to_string(&path).map_err(|e| AdapterError::Rules {
                        carrier: (*slug).to_owned(),
                        message: format!("{}: {e}", path.display()),
                    })?;
                    let rules = KeywordRules::from_toml(slug, &text)?;
                    tracing::info!(
                        carrier = slug,
                        version = rules.version,
                        path = %path.display(),
                        "loaded keyword rules override"
                    );
                    rules
                }
                None => KeywordRules::from_toml(slug, text)?,
            };
            by_carrier.insert((*slug).to_owned(), Arc::new(rules));
        }

        Ok(Self { by_carrier })
    }

    pub fn get(&self, carrier: &str) -> Option<Arc<KeywordRules>> {
        self.by_carrier.get(carrier).cloned()
    }

    /// Rule set for `carrier`, or a [`AdapterError::Rules`] naming it.
    pub fn require(&self, carrier: &str) -> Result<Arc<KeywordRules>, AdapterError> {
        self.get(carrier).ok_or_else(|| AdapterError::Rules {
            carrier: carrier.to_owned(),
            message: "no rule set loaded".to_owned(),
        })
    }
}
