//! Locale pattern table.
//! Each locale carries its sentence templates (in priority order), the grammar
//! fragment substituted for every placeholder, the trailing punctuation class
//! and the conjunctions that join several recipients.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trailing punctuation stripped from English phrases and templates.
/// Brackets are left out so a template ending on a placeholder keeps its `]`.
// @see http://www.unicode.org/cldr/charts/29/summary/en.html#4
const EN_PUNCTUATION: &str = r##"[-‐–—,;:!?.…'‘’"“”()§@*/&#†‡′″]"##;

const FR_PUNCTUATION: &str = r##"[-‐–—,;:!?.…'‘’"“”«»()§@*/&#†‡]"##;

/// One locale's worth of reminder grammar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalePattern {
    pub locale: String,
    /// Templates with `[user]`, `[action]` and `[time]` placeholders.
    /// Earlier templates win when several match the same phrase.
    pub patterns: Vec<String>,
    /// Placeholder name -> pattern fragment holding exactly one capture group.
    pub placeholders: HashMap<String, String>,
    /// Character class for trailing punctuation, e.g. `[.!?]`.
    pub punctuation: String,
    /// Words joining several recipients ("and", "et"). Commas always split.
    #[serde(default)]
    pub conjunctions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LocaleTableError {
    #[error("locale table IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("locale table parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Static set of locale patterns, loaded once at startup.
#[derive(Debug, Clone)]
pub struct LocaleTable {
    locales: Vec<LocalePattern>,
}

impl LocaleTable {
    /// The patterns shipped with the binary (`en`, `fr`).
    pub fn builtin() -> Self {
        Self {
            locales: vec![english(), french()],
        }
    }

    /// Load a table from a JSON array of locale entries.
    pub fn load_from_file(path: &Path) -> Result<Self, LocaleTableError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, LocaleTableError> {
        let locales: Vec<LocalePattern> = serde_json::from_str(content)?;
        Ok(Self { locales })
    }

    /// Look up a locale by tag, case-insensitively. `en-US` falls back to `en`.
    pub fn get(&self, locale: &str) -> Option<&LocalePattern> {
        let wanted = locale.to_lowercase();
        let find = |tag: &str| self.locales.iter().find(|l| l.locale.to_lowercase() == tag);
        find(wanted.as_str()).or_else(|| {
            let primary = wanted.split(['-', '_']).next()?;
            find(primary)
        })
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.locales.iter().map(|l| l.locale.as_str())
    }
}

fn default_placeholders() -> HashMap<String, String> {
    HashMap::from([
        ("user".to_string(), "(.+?)".to_string()),
        ("action".to_string(), "(.+)".to_string()),
        ("time".to_string(), "(.+?)".to_string()),
    ])
}

fn english() -> LocalePattern {
    LocalePattern {
        locale: "en".into(),
        patterns: [
            "Remind [user] to [action] at [time].",
            "Remind [user] to [action] on [time].",
            "Remind [user] to [action] by [time].",
            "Remind [user] at [time] to [action].",
            "Remind [user] on [time] to [action].",
            "Remind [user] that [action] on [time].",
            "Remind [user] that [action] at [time].",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        placeholders: default_placeholders(),
        punctuation: EN_PUNCTUATION.into(),
        conjunctions: vec!["and".into()],
    }
}

fn french() -> LocalePattern {
    LocalePattern {
        locale: "fr".into(),
        // "Rappelle-moi" must be tried before the looser "Rappelle [user]".
        patterns: [
            "Rappelle-[user] de [action] à [time].",
            "Rappelle-[user] à [time] de [action].",
            "Rappelle [user] de [action] à [time].",
            "Rappelle [user] à [time] de [action].",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        placeholders: default_placeholders(),
        punctuation: FR_PUNCTUATION.into(),
        conjunctions: vec!["et".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_locales() {
        let table = LocaleTable::builtin();
        let tags: Vec<&str> = table.locales().collect();
        assert_eq!(tags, vec!["en", "fr"]);
        assert!(table.get("en").is_some());
        assert!(table.get("de").is_none());
    }

    #[test]
    fn test_region_falls_back_to_primary_tag() {
        let table = LocaleTable::builtin();
        assert_eq!(table.get("en-US").map(|l| l.locale.as_str()), Some("en"));
        assert_eq!(table.get("FR_ca").map(|l| l.locale.as_str()), Some("fr"));
    }

    #[test]
    fn test_from_json() {
        let json = r##"[{
            "locale": "en",
            "patterns": ["Remind [user] to [action] at [time]."],
            "placeholders": {"user": "(.+?)", "action": "(.+)", "time": "(.+)"},
            "punctuation": "[.!?]"
        }]"##;
        let table = LocaleTable::from_json(json).unwrap();
        let en = table.get("en").unwrap();
        assert_eq!(en.patterns.len(), 1);
        assert!(en.conjunctions.is_empty());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            LocaleTable::from_json("{not json"),
            Err(LocaleTableError::Parse(_))
        ));
    }
}
