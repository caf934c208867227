//! Target languages and the localized output columns they produce.

use std::fmt;
use std::str::FromStr;

use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

/// Output languages supported by the catalog generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Language {
    Deutsch,
    English,
    Polski,
    Lithuanian,
}

/// Static per-language settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    /// Name written into the prompt, e.g. "Deutsch".
    pub name: &'static str,
    /// Suffix for the output columns, e.g. "DE".
    pub code: &'static str,
    /// Localized stand-in for a missing metadata value.
    pub not_specified: &'static str,
}

const DEUTSCH: LanguageProfile = LanguageProfile {
    name: "Deutsch",
    code: "DE",
    not_specified: "nicht angegeben",
};

const ENGLISH: LanguageProfile = LanguageProfile {
    name: "English",
    code: "EN",
    not_specified: "not specified",
};

const POLSKI: LanguageProfile = LanguageProfile {
    name: "Polski",
    code: "PL",
    not_specified: "nie podano",
};

const LIETUVIU: LanguageProfile = LanguageProfile {
    name: "Lietuvių",
    code: "LT",
    not_specified: "nenurodyta",
};

impl Language {
    pub fn profile(self) -> &'static LanguageProfile {
        match self {
            Language::Deutsch => &DEUTSCH,
            Language::English => &ENGLISH,
            Language::Polski => &POLSKI,
            Language::Lithuanian => &LIETUVIU,
        }
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    pub fn code(self) -> &'static str {
        self.profile().code
    }

    pub fn not_specified(self) -> &'static str {
        self.profile().not_specified
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown language '{0}' (expected one of Deutsch, English, Polski, Lietuvių or their codes)")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Accepts the language name or its column code, ignoring case.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim().to_lowercase();
        Language::iter()
            .find(|lang| lang.name().to_lowercase() == needle || lang.code().to_lowercase() == needle)
            .ok_or_else(|| UnknownLanguage(raw.trim().to_string()))
    }
}

/// The seven per-language columns of an output row, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum OutputField {
    Title,
    Manufacturer,
    Date,
    Dimensions,
    Weight,
    Location,
    Description,
}

pub const OUTPUT_FIELD_COUNT: usize = 7;

impl OutputField {
    pub fn column_stem(self) -> &'static str {
        match self {
            OutputField::Title => "Title",
            OutputField::Manufacturer => "Manufacturer",
            OutputField::Date => "Date",
            OutputField::Dimensions => "Dimensions",
            OutputField::Weight => "Weight",
            OutputField::Location => "Location",
            OutputField::Description => "Description",
        }
    }

    pub fn column_name(self, language: Language) -> String {
        format!("{}_{}", self.column_stem(), language.code())
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Drops repeated languages, keeping the first occurrence.
pub fn dedup_languages(languages: impl IntoIterator<Item = Language>) -> Vec<Language> {
    let mut out: Vec<Language> = Vec::new();
    for language in languages {
        if !out.contains(&language) {
            out.push(language);
        }
    }
    out
}
