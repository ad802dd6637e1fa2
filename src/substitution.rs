use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Literal text replacement applied to request XML before it is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub find: String,
    pub replace: String,
}

impl Substitution {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }
}

/// Applies `substitutions` one after another, in the given order. Text
/// produced by one substitution is matched by the following ones, but every
/// substitution runs exactly once. Substitutions with an empty `find` are
/// skipped.
pub fn apply_substitutions<'a>(source: &'a str, substitutions: &[Substitution]) -> Cow<'a, str> {
    let mut result = Cow::Borrowed(source);
    for Substitution { find, replace } in substitutions {
        if find.is_empty() {
            warn!(replace, "Skipping substitution with empty search text");
            continue;
        }
        if result.contains(find.as_str()) {
            debug!(find, replace, "Applying substitution");
            result = Cow::Owned(result.replace(find.as_str(), replace));
        }
    }
    result
}
