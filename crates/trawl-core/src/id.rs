use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Path segment that precedes every task identifier in a detail URL.
pub const TASK_PATH: &str = "/codex/tasks/";

/// Prefix carried by every task identifier.
pub const ID_PREFIX: &str = "task_e_";

fn id_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?:^|/codex/tasks/)(task_e_[A-Za-z0-9]+)(?:$|[/?#])")
            .expect("identifier pattern is valid")
    })
}

/// Opaque token naming one task, e.g. `task_e_682bcb3a96a8`.
///
/// Only constructed through [`Identifier::parse`], so every value carries
/// the `task_e_` prefix and a non-empty alphanumeric hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Accepts a bare identifier, a site-relative path or an absolute detail URL.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        id_regex()
            .captures(trimmed)
            .map(|caps| Identifier(caps[1].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical detail URL on `base_url` (scheme + host, no trailing slash).
    pub fn detail_url(&self, base_url: &str) -> String {
        format!("{}{}{}", base_url.trim_end_matches('/'), TASK_PATH, self.0)
    }

    /// Whether `url` points at this identifier's detail page.
    pub fn matches_url(&self, url: &str) -> bool {
        Identifier::parse(url).is_some_and(|other| other == *self)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match Identifier::parse(&value) {
            Some(id) if id.0 == value => Ok(id),
            _ => Err(format!("not a task identifier: \"{value}\"")),
        }
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}
