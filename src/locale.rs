//! Locale, script and direction settings.

use std::fmt;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{SmartString, DEFAULT_LANGUAGE};

/// Layout direction of text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ltr,
    Rtl,
    /// Top to bottom. Recognized so it can be rejected; not supported for layout.
    Ttb,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Ltr
    }
}

/// A four-letter ISO 15924 script code, e.g. `Latn`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScriptTag([u8; 4]);

impl ScriptTag {
    pub const LATIN: ScriptTag = ScriptTag(*b"Latn");

    /// Parses a script code. The code must be four ASCII letters;
    /// it is normalized to title case.
    pub fn new(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return None;
        }
        let mut tag = [0; 4];
        for (i, b) in bytes.iter().enumerate() {
            tag[i] = if i == 0 {
                b.to_ascii_uppercase()
            } else {
                b.to_ascii_lowercase()
            };
        }
        Some(ScriptTag(tag))
    }

    pub fn as_str(&self) -> &str {
        // Only ever built from ASCII letters.
        std::str::from_utf8(&self.0).unwrap_or("Latn")
    }
}

impl Default for ScriptTag {
    fn default() -> Self {
        ScriptTag::LATIN
    }
}

impl fmt::Display for ScriptTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script and direction used by a locale.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocaleEntry {
    pub locale: &'static str,
    pub script: ScriptTag,
    pub direction: Direction,
}

const fn entry(locale: &'static str, script: &[u8; 4], direction: Direction) -> LocaleEntry {
    LocaleEntry {
        locale,
        script: ScriptTag(*script),
        direction,
    }
}

use Direction::{Ltr, Rtl};

static LOCALES: &[LocaleEntry] = &[
    entry("af", b"Latn", Ltr),
    entry("ar", b"Arab", Rtl),
    entry("bg", b"Cyrl", Ltr),
    entry("ca", b"Latn", Ltr),
    entry("cs", b"Latn", Ltr),
    entry("da", b"Latn", Ltr),
    entry("de", b"Latn", Ltr),
    entry("el", b"Grek", Ltr),
    entry("en", b"Latn", Ltr),
    entry("es", b"Latn", Ltr),
    entry("et", b"Latn", Ltr),
    entry("fa", b"Arab", Rtl),
    entry("fi", b"Latn", Ltr),
    entry("fil", b"Latn", Ltr),
    entry("fr", b"Latn", Ltr),
    entry("he", b"Hebr", Rtl),
    entry("hi", b"Deva", Ltr),
    entry("hr", b"Latn", Ltr),
    entry("hu", b"Latn", Ltr),
    entry("id", b"Latn", Ltr),
    entry("it", b"Latn", Ltr),
    entry("iw", b"Hebr", Rtl),
    entry("ja", b"Jpan", Ltr),
    entry("ko", b"Kore", Ltr),
    entry("lt", b"Latn", Ltr),
    entry("lv", b"Latn", Ltr),
    entry("ms", b"Latn", Ltr),
    entry("nl", b"Latn", Ltr),
    entry("no", b"Latn", Ltr),
    entry("pl", b"Latn", Ltr),
    entry("pt", b"Latn", Ltr),
    entry("ro", b"Latn", Ltr),
    entry("ru", b"Cyrl", Ltr),
    entry("sk", b"Latn", Ltr),
    entry("sl", b"Latn", Ltr),
    entry("sr", b"Cyrl", Ltr),
    entry("sv", b"Latn", Ltr),
    entry("th", b"Thai", Ltr),
    entry("tr", b"Latn", Ltr),
    entry("uk", b"Cyrl", Ltr),
    entry("ur", b"Arab", Rtl),
    entry("vi", b"Latn", Ltr),
    entry("zh", b"Hans", Ltr),
    entry("zh-CN", b"Hans", Ltr),
    entry("zh-TW", b"Hant", Ltr),
];

static LOCALE_INDEX: Lazy<AHashMap<&'static str, &'static LocaleEntry>> =
    Lazy::new(|| LOCALES.iter().map(|e| (e.locale, e)).collect());

/// Languages the line breaker has rules for.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "de", "es", "fr", "ru", "zh", "ja", "ko"];

/// Normalizes `en_us` / `EN-us` to `en-US`.
fn normalize(locale: &str) -> SmartString {
    let mut parts = locale.split(|c| c == '-' || c == '_');
    let mut out = SmartString::new();
    if let Some(language) = parts.next() {
        out.push_str(&language.to_ascii_lowercase());
    }
    for part in parts {
        out.push('-');
        out.push_str(&part.to_ascii_uppercase());
    }
    out
}

/// Looks up a locale, first by the full `lang-COUNTRY` string,
/// then by the language alone.
pub fn find_locale(locale: &str) -> Option<&'static LocaleEntry> {
    let normalized = normalize(locale);
    if let Some(entry) = LOCALE_INDEX.get(normalized.as_str()).copied() {
        return Some(entry);
    }
    let language = normalized.split('-').next()?;
    LOCALE_INDEX.get(language).copied()
}

/// The language, script and direction text is laid out with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSettings {
    locale: SmartString,
    language: SmartString,
    script: ScriptTag,
    direction: Direction,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LANGUAGE.into(),
            language: DEFAULT_LANGUAGE.into(),
            script: ScriptTag::LATIN,
            direction: Direction::Ltr,
        }
    }
}

impl LanguageSettings {
    /// Resolves settings for a locale such as `ar` or `zh-TW`.
    /// Returns `None` if the locale is unknown.
    pub fn from_locale(locale: &str) -> Option<Self> {
        let entry = find_locale(locale)?;
        let normalized = normalize(locale);
        let language = normalized.split('-').next().unwrap_or(DEFAULT_LANGUAGE);
        let language = if SUPPORTED_LANGUAGES.contains(&language) {
            language
        } else {
            DEFAULT_LANGUAGE
        };
        Some(Self {
            locale: normalized.clone(),
            language: language.into(),
            script: entry.script,
            direction: entry.direction,
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Language used for line breaking.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn script(&self) -> ScriptTag {
        self.script
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn set_script(&mut self, script: ScriptTag) {
        self.script = script;
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }
}
