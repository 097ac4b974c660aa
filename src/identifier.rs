//! Allow-list validation for table and column names.
//!
//! Generated SQL in this crate interpolates table and column names, so every
//! name must pass [`check_name`] first. The only way to obtain an
//! [`Identifier`] is through that check, and the store builds statements from
//! `Identifier`s alone. User data never reaches SQL text; it is always bound.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::error::{StoreError, StoreResult};

const NAME_CHARS: &str = "A-Za-z0-9_áéíóúüñÁÉÍÓÚÜÑ";

static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^[{NAME_CHARS}]+$")).expect("valid name pattern"));

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("[^{NAME_CHARS}]")).expect("invalid char pattern"));

/// Returns `true` when `name` is non-empty and made only of ASCII letters,
/// ASCII digits, `_`, or the accented vowels and `ñ` (either case).
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

pub fn check_name(name: &str) -> StoreResult<Identifier> {
    if is_valid_name(name) {
        Ok(Identifier(name.to_string()))
    } else {
        Err(StoreError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Turns an arbitrary header into something [`is_valid_name`] accepts, or an
/// empty string when nothing usable remains.
pub fn sanitize_name(raw: &str) -> String {
    let underscored = raw.trim().replace(' ', "_");
    INVALID_CHARS.replace_all(&underscored, "").into_owned()
}

/// A table or column name that passed [`check_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted SQL form. The grammar excludes `"`, so no escaping is needed.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Name of the shadow table used while swapping in a new schema.
    pub fn shadow(&self) -> Identifier {
        Identifier(format!("_new_{}", self.0))
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        check_name(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        check_name(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_letters_digits_underscore_and_accents() {
        assert!(is_valid_name("personas"));
        assert!(is_valid_name("edad_2024"));
        assert!(is_valid_name("año"));
        assert!(is_valid_name("CAMIÓN"));
        assert!(is_valid_name("pingüino"));
        assert!(is_valid_name("_"));
    }

    #[test]
    fn rejects_empty_and_structural_characters() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("bad;name"));
        assert!(!is_valid_name("two words"));
        assert!(!is_valid_name("quote\"d"));
        assert!(!is_valid_name("x'--"));
        assert!(!is_valid_name("tab\tname"));
        assert!(!is_valid_name("çedilla"));
    }

    #[test]
    fn check_name_reports_offending_name() {
        match check_name("drop table;") {
            Err(StoreError::InvalidIdentifier { name }) => assert_eq!(name, "drop table;"),
            other => panic!("expected InvalidIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn quoted_and_shadow_forms() {
        let ident = check_name("ventas").unwrap();
        assert_eq!(ident.quoted(), "\"ventas\"");
        assert_eq!(ident.shadow().as_str(), "_new_ventas");
        assert!(is_valid_name(ident.shadow().as_str()));
    }

    #[test]
    fn sanitize_replaces_spaces_and_strips_symbols() {
        assert_eq!(sanitize_name("Fecha de alta"), "Fecha_de_alta");
        assert_eq!(sanitize_name("Precio ($)"), "Precio_");
        assert_eq!(sanitize_name("  año  "), "año");
        assert_eq!(sanitize_name("%%%"), "");
    }

    proptest! {
        #[test]
        fn grammar_strings_are_valid(name in "[A-Za-z0-9_áéíóúüñÁÉÍÓÚÜÑ]{1,40}") {
            prop_assert!(is_valid_name(&name));
        }

        #[test]
        fn any_foreign_character_invalidates(
            prefix in "[A-Za-z0-9_]{0,10}",
            bad in prop::sample::select(vec![';', ' ', '\'', '"', '-', '(', ')', '*', '.', ',', '\n']),
            suffix in "[A-Za-z0-9_]{0,10}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(!is_valid_name(&name));
        }

        #[test]
        fn sanitized_names_are_valid_or_empty(raw in "\\PC{0,30}") {
            let sanitized = sanitize_name(&raw);
            prop_assert!(sanitized.is_empty() || is_valid_name(&sanitized));
        }
    }
}
