//! Enumerated policy knobs: log output format and envelope field naming.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a policy enum from text.
pub type PolicyParseError = strum::ParseError;

/// Naming convention applied to response envelope field names.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FieldNaming {
    /// `requestTime`
    #[default]
    CamelCase,
    /// `RequestTime`
    PascalCase,
    /// `request_time`
    SnakeCase,
}

impl FieldNaming {
    /// Renders a field given as lowercase words in this convention.
    #[must_use]
    pub fn apply(self, words: &[&str]) -> String {
        match self {
            Self::SnakeCase => words.join("_"),
            Self::CamelCase => words
                .iter()
                .enumerate()
                .map(|(index, word)| {
                    if index == 0 {
                        (*word).to_owned()
                    } else {
                        capitalise(word)
                    }
                })
                .collect(),
            Self::PascalCase => words.iter().map(|word| capitalise(word)).collect(),
        }
    }
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FieldNaming::CamelCase, "requestTime")]
    #[case(FieldNaming::PascalCase, "RequestTime")]
    #[case(FieldNaming::SnakeCase, "request_time")]
    fn renders_compound_fields(#[case] naming: FieldNaming, #[case] expected: &str) {
        assert_eq!(naming.apply(&["request", "time"]), expected);
    }

    #[rstest]
    #[case(FieldNaming::CamelCase, "id")]
    #[case(FieldNaming::PascalCase, "Id")]
    #[case(FieldNaming::SnakeCase, "id")]
    fn renders_single_word_fields(#[case] naming: FieldNaming, #[case] expected: &str) {
        assert_eq!(naming.apply(&["id"]), expected);
    }

    #[test]
    fn parses_naming_case_insensitively() {
        let naming: FieldNaming = "PASCAL_CASE".parse().expect("parse naming");
        assert_eq!(naming, FieldNaming::PascalCase);
    }

    #[test]
    fn parses_log_format() {
        let format: LogFormat = "compact".parse().expect("parse format");
        assert_eq!(format, LogFormat::Compact);
    }
}
