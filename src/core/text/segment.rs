//! Linguistic segmentation used by the splitter.
//!
//! Boundaries come from the `unicode-segmentation` crate, which implements the
//! default (untailored) rules of Unicode Standard Annex #29:
//!
//! - sentence boundaries (UAX #29 section 5),
//! - word boundaries (UAX #29 section 4),
//! - extended grapheme clusters (UAX #29 section 3).
//!
//! Locale tailoring is not applied. The locale list is carried through the API so
//! callers can record their intent, but the boundaries for a given text are the
//! same for every locale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_segmentation::UnicodeSegmentation;

/// Boundary fineness, ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Sentence,
    Word,
    Grapheme,
}

impl Granularity {
    /// All granularities, coarsest first.
    pub const ALL: [Granularity; 3] = [Self::Sentence, Self::Word, Self::Grapheme];

    /// Granularities from `Sentence` down to and including `self`.
    pub fn ladder(self) -> Vec<Granularity> {
        Self::ALL.into_iter().filter(|g| *g <= self).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Word => "word",
            Self::Grapheme => "grapheme",
        }
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::Grapheme
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sentence" => Ok(Self::Sentence),
            "word" => Ok(Self::Word),
            "grapheme" => Ok(Self::Grapheme),
            other => Err(format!(
                "Unknown granularity: {other}. Expected one of: sentence, word, grapheme"
            )),
        }
    }
}

/// Segments `text` at `granularity` boundaries.
///
/// Yields `(start_offset, segment)` pairs in order. Offsets are byte offsets into
/// `text` and the segments concatenate back to `text` exactly.
pub fn segment<'a>(
    text: &'a str,
    granularity: Granularity,
    _locales: &[String],
) -> Box<dyn Iterator<Item = (usize, &'a str)> + 'a> {
    match granularity {
        Granularity::Sentence => Box::new(text.split_sentence_bound_indices()),
        Granularity::Word => Box::new(text.split_word_bound_indices()),
        Granularity::Grapheme => Box::new(text.grapheme_indices(true)),
    }
}
