//! Reminder intent parsing.
//! A phrase is normalized with the locale's rules, then matched against the
//! locale's compiled templates in declaration order; the first match wins.

pub mod compiler;
pub mod locale;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use compiler::{CompiledMatcher, Normalizer, PatternCompilationError, PatternCompiler};
use locale::{LocalePattern, LocaleTable};

/// Structured result of a successful parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderIntent {
    /// Never empty; individual names in spoken order.
    pub recipients: Vec<String>,
    pub action: String,
    /// Raw temporal expression, e.g. "5pm today".
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty phrase")]
    Empty,
    #[error("unsupported intent format: {phrase:?}")]
    Unsupported { phrase: String },
}

/// Parser bound to a single locale.
#[derive(Debug, Clone)]
pub struct IntentParser {
    locale: String,
    normalizer: Normalizer,
    matchers: Vec<CompiledMatcher>,
    recipient_split: Regex,
}

impl IntentParser {
    /// Compile every template of `locale` from `table`.
    pub fn new(table: &LocaleTable, locale: &str) -> Result<Self, PatternCompilationError> {
        let pattern = table
            .get(locale)
            .ok_or_else(|| PatternCompilationError::UnknownLocale(locale.to_string()))?;
        Self::from_locale(pattern)
    }

    pub fn from_locale(pattern: &LocalePattern) -> Result<Self, PatternCompilationError> {
        let compiler = PatternCompiler::new(pattern)?;
        let matchers = pattern
            .patterns
            .iter()
            .map(|template| compiler.compile(template))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            locale = %pattern.locale,
            templates = matchers.len(),
            "intent_parser_compiled"
        );

        Ok(Self {
            locale: pattern.locale.clone(),
            normalizer: compiler.normalizer().clone(),
            matchers,
            recipient_split: recipient_splitter(&pattern.conjunctions)?,
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn matchers(&self) -> &[CompiledMatcher] {
        &self.matchers
    }

    pub fn normalize(&self, phrase: &str) -> String {
        self.normalizer.normalize(phrase)
    }

    pub fn parse(&self, phrase: &str) -> Result<ReminderIntent, ParseError> {
        let normalized = self.normalize(phrase);
        if normalized.is_empty() {
            return Err(ParseError::Empty);
        }

        for matcher in &self.matchers {
            let Some(captured) = matcher.captures(&normalized) else {
                continue;
            };
            let recipients = self.extract_recipients(captured.user);
            let action = captured.action.trim();
            // A blank field means the template only matched structurally.
            if recipients.is_empty() || action.is_empty() {
                continue;
            }
            debug!(locale = %self.locale, template = matcher.template(), "intent_matched");
            return Ok(ReminderIntent {
                recipients,
                action: action.to_string(),
                time: captured.time.trim().to_string(),
            });
        }

        Err(ParseError::Unsupported {
            phrase: phrase.to_string(),
        })
    }

    fn extract_recipients(&self, text: &str) -> Vec<String> {
        self.recipient_split
            .split(text.trim())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Splits "Alice, Bob and Carol" (or "Alice, Bob, and Carol") into names.
fn recipient_splitter(conjunctions: &[String]) -> Result<Regex, regex::Error> {
    let pattern = if conjunctions.is_empty() {
        r"\s*,\s*".to_string()
    } else {
        let words = conjunctions
            .iter()
            .map(|c| regex::escape(c))
            .collect::<Vec<_>>()
            .join("|");
        format!(r"\s*,\s*(?:(?:{words})\s+)?|\s+(?:{words})\s+")
    };
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}
