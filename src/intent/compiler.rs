//! Template compilation.
//! A template such as `Remind [user] to [action] at [time].` becomes an anchored,
//! case-insensitive regex plus the capture position of every placeholder, since
//! templates order their placeholders differently.

use std::collections::HashMap;
use std::fmt;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use super::locale::LocalePattern;

/// Semantic slot of a reminder template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    User,
    Action,
    Time,
}

impl Placeholder {
    pub const ALL: [Placeholder; 3] = [Placeholder::User, Placeholder::Action, Placeholder::Time];

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::User => "user",
            Placeholder::Action => "action",
            Placeholder::Time => "time",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.name())
    }
}

#[derive(Debug, Error)]
pub enum PatternCompilationError {
    #[error("unmatched bracket in template {template:?}")]
    UnmatchedBracket { template: String },
    #[error("unknown placeholder [{name}] in template {template:?}")]
    UnknownPlaceholder { template: String, name: String },
    #[error("placeholder {placeholder} used twice in template {template:?}")]
    DuplicatePlaceholder {
        template: String,
        placeholder: Placeholder,
    },
    #[error("template {template:?} lacks the {placeholder} placeholder")]
    MissingPlaceholder {
        template: String,
        placeholder: Placeholder,
    },
    #[error("locale has no grammar fragment for {0}")]
    MissingFragment(Placeholder),
    #[error("template {template:?} compiles to {found} capture groups, expected {expected}")]
    CaptureCount {
        template: String,
        found: usize,
        expected: usize,
    },
    #[error("invalid punctuation rule {rule:?}: {error}")]
    InvalidPunctuation { rule: String, error: regex::Error },
    #[error("unknown locale: {0}")]
    UnknownLocale(String),
    #[error("template pattern failed to compile: {0}")]
    Regex(#[from] regex::Error),
}

/// Whitespace collapsing and trailing punctuation stripping, shared by
/// templates and spoken phrases so both sides see the same text.
#[derive(Debug, Clone)]
pub struct Normalizer {
    whitespace: Regex,
    punctuation: Regex,
}

impl Normalizer {
    /// `rule` is a character class such as `[.!?]`.
    pub fn new(rule: &str) -> Result<Self, PatternCompilationError> {
        let punctuation = Regex::new(&format!(r"(?:{rule}|\s)+$")).map_err(|error| {
            PatternCompilationError::InvalidPunctuation {
                rule: rule.to_string(),
                error,
            }
        })?;
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            punctuation,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let collapsed = self.whitespace.replace_all(text, " ");
        let stripped = self.punctuation.replace(collapsed.trim(), "");
        stripped.trim().to_string()
    }
}

/// Field text captured by one matcher, borrowed from the normalized phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Captured<'t> {
    pub user: &'t str,
    pub action: &'t str,
    pub time: &'t str,
}

/// One compiled template.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    template: String,
    matcher: Regex,
    placeholder_order: HashMap<Placeholder, usize>,
}

impl CompiledMatcher {
    /// The normalized template text this matcher was built from.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    /// Placeholder -> ordinal position among the template's captures.
    pub fn placeholder_order(&self) -> &HashMap<Placeholder, usize> {
        &self.placeholder_order
    }

    /// Match an already normalized phrase and sort the captures into fields.
    pub fn captures<'t>(&self, phrase: &'t str) -> Option<Captured<'t>> {
        let caps = self.matcher.captures(phrase)?;
        let field = |p: Placeholder| -> Option<&'t str> {
            let ordinal = *self.placeholder_order.get(&p)?;
            caps.get(ordinal + 1).map(|m| m.as_str())
        };
        Some(Captured {
            user: field(Placeholder::User)?,
            action: field(Placeholder::Action)?,
            time: field(Placeholder::Time)?,
        })
    }
}

enum Token<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Compiles every template of one locale.
pub struct PatternCompiler {
    normalizer: Normalizer,
    grammar: HashMap<Placeholder, String>,
    placeholder_token: Regex,
}

impl PatternCompiler {
    pub fn new(locale: &LocalePattern) -> Result<Self, PatternCompilationError> {
        let mut grammar = HashMap::new();
        for (name, fragment) in &locale.placeholders {
            // Fragments for names no template can reference are harmless.
            if let Some(p) = Placeholder::from_name(name) {
                grammar.insert(p, fragment.clone());
            }
        }
        Ok(Self {
            normalizer: Normalizer::new(&locale.punctuation)?,
            grammar,
            placeholder_token: Regex::new(r"\[[^\]]*\]")?,
        })
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn compile(&self, raw_template: &str) -> Result<CompiledMatcher, PatternCompilationError> {
        let template = self.normalizer.normalize(raw_template);
        let tokens = self.tokenize(&template)?;

        let mut pattern = String::from("^");
        let mut placeholder_order = HashMap::new();
        for token in tokens {
            match token {
                Token::Placeholder(name) => {
                    let placeholder = Placeholder::from_name(name).ok_or_else(|| {
                        PatternCompilationError::UnknownPlaceholder {
                            template: template.clone(),
                            name: name.to_string(),
                        }
                    })?;
                    let ordinal = placeholder_order.len();
                    if placeholder_order.insert(placeholder, ordinal).is_some() {
                        return Err(PatternCompilationError::DuplicatePlaceholder {
                            template: template.clone(),
                            placeholder,
                        });
                    }
                    let fragment = self
                        .grammar
                        .get(&placeholder)
                        .ok_or(PatternCompilationError::MissingFragment(placeholder))?;
                    pattern.push_str(fragment);
                }
                Token::Literal(text) => pattern.push_str(&literal_fragment(text)),
            }
        }
        pattern.push('$');

        if let Some(missing) = Placeholder::ALL
            .into_iter()
            .find(|p| !placeholder_order.contains_key(p))
        {
            return Err(PatternCompilationError::MissingPlaceholder {
                template,
                placeholder: missing,
            });
        }

        let matcher = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .unicode(true)
            .build()?;

        let expected = placeholder_order.len() + 1;
        if matcher.captures_len() != expected {
            return Err(PatternCompilationError::CaptureCount {
                template,
                found: matcher.captures_len() - 1,
                expected: expected - 1,
            });
        }

        Ok(CompiledMatcher {
            template,
            matcher,
            placeholder_order,
        })
    }

    /// Split at every `[...]`; any bracket left in literal text is unmatched.
    fn tokenize<'a>(&self, template: &'a str) -> Result<Vec<Token<'a>>, PatternCompilationError> {
        let mut tokens = Vec::new();
        let push_literal = |tokens: &mut Vec<Token<'a>>, text: &'a str| {
            if text.contains(['[', ']']) {
                return Err(PatternCompilationError::UnmatchedBracket {
                    template: template.to_string(),
                });
            }
            if !text.is_empty() {
                tokens.push(Token::Literal(text));
            }
            Ok(())
        };

        let mut last = 0;
        for m in self.placeholder_token.find_iter(template) {
            push_literal(&mut tokens, &template[last..m.start()])?;
            tokens.push(Token::Placeholder(&template[m.start() + 1..m.end() - 1]));
            last = m.end();
        }
        push_literal(&mut tokens, &template[last..])?;
        Ok(tokens)
    }
}

/// Escape literal template text. Edge spaces become word boundaries so the
/// neighbouring placeholder captures absorb free text around them.
fn literal_fragment(text: &str) -> String {
    if text == " " {
        return r"\b \b".to_string();
    }
    let mut escaped = regex::escape(text);
    if escaped.ends_with(' ') {
        escaped.pop();
        escaped.push_str(r"\b");
    }
    if escaped.starts_with(' ') {
        escaped.replace_range(..1, r"\b");
    }
    escaped
}

/// Compile a single template against a locale's grammar.
pub fn compile(
    locale: &LocalePattern,
    template: &str,
) -> Result<CompiledMatcher, PatternCompilationError> {
    PatternCompiler::new(locale)?.compile(template)
}
