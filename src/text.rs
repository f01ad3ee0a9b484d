//! Line breaking and word segmentation.

use std::ops::Range;

use swash::text::cluster::Boundary;

pub mod layout;

/// Line break opportunity after a character.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BreakClass {
    /// A line must break after the character (e.g. `'\n'`).
    Mandatory,
    /// A line may break after the character.
    Allow,
    NoBreak,
}

/// Finds line break opportunities.
pub trait LineBreaker {
    /// Returns one class per character of `text`. The class of the last
    /// character is always [`BreakClass::Mandatory`].
    fn classify(&self, text: &str, language: &str) -> Vec<BreakClass>;
}

/// A [`LineBreaker`] using the UAX #14 rules of `swash`'s text analysis.
///
/// The rules are language independent, so `language` is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SwashLineBreaker;

impl LineBreaker for SwashLineBreaker {
    fn classify(&self, text: &str, _language: &str) -> Vec<BreakClass> {
        let mut classes = vec![BreakClass::NoBreak; text.chars().count()];
        // A boundary is reported before the character it belongs to.
        for (i, (_, boundary)) in swash::text::analyze(text.chars()).enumerate().skip(1) {
            classes[i - 1] = match boundary {
                Boundary::Mandatory => BreakClass::Mandatory,
                Boundary::Line => BreakClass::Allow,
                _ => BreakClass::NoBreak,
            };
        }
        if let Some(last) = classes.last_mut() {
            *last = BreakClass::Mandatory;
        }
        classes
    }
}

/// A run of text ending at a break opportunity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Word {
    /// Byte range, including trailing whitespace.
    pub range: Range<usize>,
    /// Whether the word ends with a forced line break before the end of the text.
    pub mandatory: bool,
}

/// Splits `text` into words using the classes from a [`LineBreaker`].
pub(crate) fn split_words(text: &str, classes: &[BreakClass]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut start = 0;
    for ((i, c), &class) in text.char_indices().zip(classes) {
        let end = i + c.len_utf8();
        if class == BreakClass::NoBreak {
            continue;
        }
        words.push(Word {
            range: start..end,
            mandatory: class == BreakClass::Mandatory && end < text.len(),
        });
        start = end;
    }
    if start < text.len() {
        words.push(Word {
            range: start..text.len(),
            mandatory: false,
        });
    }
    words
}
