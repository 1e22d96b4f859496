//! Path syntax: splitting flat source keys into field tokens.
//!
//! Two grammars are supported:
//!
//! - **Plain**: the key is split on a single separator (default `.`), so
//!   `imgs.0.caption` yields `["imgs", "0", "caption"]`.
//! - **Bracketed**: tokens are wrapped in a bracket pair, optionally joined by
//!   a separator, so `imgs[0][caption]` (or `imgs[0].[caption]` with a `.`
//!   separator) yields the same tokens. This is the shape HTML form libraries
//!   serialize nested objects into.
//!
//! ```rust
//! use reqbind_core::PathSyntax;
//!
//! let syntax = PathSyntax::bracketed('[', ']', None);
//! assert_eq!(
//!     syntax.tokenize("imgs[0][caption]").unwrap(),
//!     vec!["imgs", "0", "caption"]
//! );
//! assert!(syntax.tokenize("imgs[0] [caption]").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A key could not be split under the configured grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path {key:?}")]
pub struct InvalidPath {
    key: String,
}

impl InvalidPath {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Returns the offending key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Grammar used to split source keys into path tokens.
///
/// Brackets are only active when both `left` and `right` are set; otherwise
/// keys are split on `separator` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSyntax {
    /// Opening bracket.
    pub left: Option<char>,
    /// Closing bracket.
    pub right: Option<char>,
    /// Separator between tokens (plain) or between bracket groups (bracketed).
    pub separator: Option<char>,
}

impl Default for PathSyntax {
    fn default() -> Self {
        Self::dotted()
    }
}

impl PathSyntax {
    /// Plain grammar splitting on `.`.
    #[must_use]
    pub const fn dotted() -> Self {
        Self::plain('.')
    }

    /// Plain grammar splitting on `separator`.
    #[must_use]
    pub const fn plain(separator: char) -> Self {
        Self {
            left: None,
            right: None,
            separator: Some(separator),
        }
    }

    /// Bracketed grammar, e.g. `('[', ']', None)` for `a[b][0][c]` or
    /// `('[', ']', Some('.'))` for `a[b].[0].[c]`.
    #[must_use]
    pub const fn bracketed(left: char, right: char, separator: Option<char>) -> Self {
        Self {
            left: Some(left),
            right: Some(right),
            separator,
        }
    }

    /// Returns the bracket pair if the bracketed grammar is active.
    #[must_use]
    pub fn brackets(&self) -> Option<(char, char)> {
        self.left.zip(self.right)
    }

    /// Splits `key` into path tokens.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`] when the key violates the bracketed grammar.
    /// The plain grammar never fails.
    pub fn tokenize<'k>(&self, key: &'k str) -> Result<Vec<&'k str>, InvalidPath> {
        match (self.brackets(), self.separator) {
            (Some((left, right)), _) => self.tokenize_bracketed(key, left, right),
            (None, Some(separator)) => Ok(key.split(separator).collect()),
            (None, None) => Ok(vec![key]),
        }
    }

    fn tokenize_bracketed<'k>(
        &self,
        key: &'k str,
        left: char,
        right: char,
    ) -> Result<Vec<&'k str>, InvalidPath> {
        let invalid = || InvalidPath::new(key);
        let chars: Vec<(usize, char)> = key.char_indices().collect();
        let mut tokens = Vec::new();
        let mut first_level = true;
        let mut open: Option<usize> = None;

        for (pos, &(offset, c)) in chars.iter().enumerate() {
            if c.is_whitespace() {
                return Err(invalid());
            }

            let is_separator = self.separator == Some(c);
            if c != left && c != right && !is_separator {
                // Text between groups, e.g. `a[b]c`.
                if !first_level && open.is_none() {
                    return Err(invalid());
                }
                continue;
            }

            let prev = pos.checked_sub(1).map(|p| chars[p].1);
            let next = chars.get(pos + 1).map(|&(_, n)| n);
            if prev.is_none() || prev == Some(c) {
                return Err(invalid());
            }
            if next.is_none() && c != right {
                return Err(invalid());
            }

            if c == left {
                if open.is_some() {
                    return Err(invalid());
                }
                if first_level {
                    let end = if prev.is_some() && prev == self.separator {
                        chars[pos - 1].0
                    } else {
                        offset
                    };
                    tokens.push(&key[..end]);
                    first_level = false;
                } else if self.separator.is_some() && prev != self.separator {
                    return Err(invalid());
                }
                open = Some(offset + c.len_utf8());
            } else if c == right {
                let start = open.take().ok_or_else(invalid)?;
                let content = &key[start..offset];
                if !content.is_empty() {
                    tokens.push(content);
                } else if next.is_some() {
                    // `[]` is only allowed as the final group.
                    return Err(invalid());
                }
            } else if open.is_none() {
                // A separator outside brackets must sit between `]` and `[`,
                // or between the leading name and the first `[`.
                if !first_level && prev != Some(right) {
                    return Err(invalid());
                }
                if next != Some(left) {
                    return Err(invalid());
                }
            }
        }

        if open.is_some() {
            return Err(invalid());
        }
        if first_level {
            tokens.push(key);
        }
        Ok(tokens)
    }

    /// Joins tokens back into a key under this grammar.
    ///
    /// Tokenizing the result yields the same tokens for any non-empty,
    /// whitespace-free tokens that contain no grammar characters.
    #[must_use]
    pub fn join<S: AsRef<str>>(&self, tokens: &[S]) -> String {
        let mut key = String::new();
        match self.brackets() {
            Some((left, right)) => {
                for (i, token) in tokens.iter().enumerate() {
                    if i == 0 {
                        key.push_str(token.as_ref());
                        continue;
                    }
                    if i > 1 {
                        if let Some(separator) = self.separator {
                            key.push(separator);
                        }
                    }
                    key.push(left);
                    key.push_str(token.as_ref());
                    key.push(right);
                }
            }
            None => {
                for (i, token) in tokens.iter().enumerate() {
                    if i > 0 {
                        if let Some(separator) = self.separator {
                            key.push(separator);
                        }
                    }
                    key.push_str(token.as_ref());
                }
            }
        }
        key
    }

    /// Strips a trailing empty bracket pair (`files[]` becomes `files`).
    ///
    /// Plain syntaxes strip a literal `[]`. The stripped form is the canonical
    /// key under which values from several sources are merged.
    #[must_use]
    pub fn canonical<'k>(&self, key: &'k str) -> &'k str {
        let (left, right) = self.brackets().unwrap_or(('[', ']'));
        let stripped = key
            .strip_suffix(right)
            .and_then(|rest| rest.strip_suffix(left));
        match stripped {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => key,
        }
    }
}
