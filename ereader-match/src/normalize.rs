//! String normalization for fuzzy title and author matching
//!
//! Lowercases, then strips every non-word character and underscore. Distinct
//! editions that share a title normalize to the same key, so matches below
//! the uuid tier can be false positives.

use std::sync::LazyLock;

use regex::Regex;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\W_]").unwrap());

/// Replaceable normalization rule
pub type Normalizer = fn(&str) -> String;

/// Lowercase and strip non-word characters and underscores (Unicode aware)
pub fn clean_string(s: &str) -> String {
    NON_WORD.replace_all(&s.to_lowercase(), "").into_owned()
}

/// Join authors for display and matching, `"A & B"`
///
/// Empty names are skipped and a literal `&` inside a name is doubled so the
/// separator stays unambiguous.
pub fn authors_to_string(authors: &[String]) -> String {
    authors
        .iter()
        .filter(|a| !a.is_empty())
        .map(|a| a.replace('&', "&&"))
        .collect::<Vec<_>>()
        .join(" & ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("The Left Hand of Darkness", "thelefthandofdarkness")]
    #[case("Snake_Case: A Memoir!", "snakecaseamemoir")]
    #[case("  Ünïcödé Títle ", "ünïcödétítle")]
    #[case("Война и мир", "войнаимир")]
    #[case("1984", "1984")]
    #[case("", "")]
    fn test_clean_string(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean_string(input), expected);
    }

    #[test]
    fn test_authors_to_string() {
        let authors = vec!["Ursula K. Le Guin".to_string(), String::new(), "Tom & Jerry".to_string()];
        assert_eq!(authors_to_string(&authors), "Ursula K. Le Guin & Tom && Jerry");
        assert_eq!(authors_to_string(&[]), "");
    }

    #[test]
    fn test_author_order_matters() {
        let a = clean_string(&authors_to_string(&["A".into(), "B".into()]));
        let b = clean_string(&authors_to_string(&["B".into(), "A".into()]));
        assert_ne!(a, b);
    }
}
