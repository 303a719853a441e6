//! Identity signature: the normalized `title|location|dates` key used to decide
//! whether two listings describe the same conference.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lower-case, turn every character outside `[a-z0-9]` and whitespace into a
/// separator, and collapse separator runs to a single space.
///
/// Punctuation acts as a word break rather than being deleted, so `10-12 Jan`
/// and `10 12 jan` normalize to the same text.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Approximate conference identity. Insensitive to case, punctuation and
/// whitespace; sensitive to paraphrased dates or locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(title: &str, location: &str, dates: &str) -> Self {
        Self(format!(
            "{}|{}|{}",
            normalize(title),
            normalize(location),
            normalize(dates)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
