use std::collections::HashSet;
use std::fmt;

/// A normalized recipient identifier: lowercase, trimmed, no leading `@`, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipientHandle(String);

impl RecipientHandle {
    /// Normalize a single raw token. Returns `None` when nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let handle = raw
            .trim()
            .trim_start_matches(|c: char| c == '@' || c.is_whitespace())
            .to_lowercase();

        if handle.is_empty() {
            None
        } else {
            Some(Self(handle))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Parse free text into recipient handles.
///
/// Tokens are separated by newlines and commas. Duplicates are dropped and
/// first-seen order is kept. Never fails: unusable input yields an empty list.
pub fn parse(text: &str) -> Vec<RecipientHandle> {
    let mut seen = HashSet::new();
    text.split('\n')
        .flat_map(|line| line.split(','))
        .filter_map(RecipientHandle::normalize)
        .filter(|handle| seen.insert(handle.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(handles: &[RecipientHandle]) -> Vec<&str> {
        handles.iter().map(RecipientHandle::as_str).collect()
    }

    #[test]
    fn test_dedup_and_case_fold() {
        let parsed = parse("@Alice, bob\nBOB");
        assert_eq!(names(&parsed), vec!["alice", "bob"]);
    }

    #[test]
    fn test_mixed_separators_and_blank_tokens() {
        let parsed = parse(" @one ,,\n\n two\r\n,@three,\n@");
        assert_eq!(names(&parsed), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse(" , \n @ ,@@").is_empty());
    }

    #[test]
    fn test_first_occurrence_order_is_kept() {
        let parsed = parse("c, a, b, A, c");
        assert_eq!(names(&parsed), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_repeated_at_signs_are_stripped() {
        let parsed = parse("@@bob, @ carol");
        assert_eq!(names(&parsed), vec!["bob", "carol"]);
    }

    #[test]
    fn test_display_prefixes_at() {
        let handle = RecipientHandle::normalize("  @Dave ").unwrap();
        assert_eq!(handle.to_string(), "@dave");
    }

    proptest! {
        #[test]
        fn property_parse_output_is_normalized(input in "[@a-zA-Z0-9_ ,\\n\\t]{0,200}") {
            let parsed = parse(&input);
            let mut seen = HashSet::new();
            for handle in &parsed {
                let h = handle.as_str();
                prop_assert!(!h.is_empty());
                prop_assert!(!h.starts_with('@'));
                prop_assert_eq!(h.to_lowercase(), h);
                prop_assert_eq!(h.trim(), h);
                prop_assert!(seen.insert(h.to_string()));
            }
        }

        #[test]
        fn property_parse_is_idempotent_over_rejoin(input in "[@a-zA-Z0-9_ ,\\n\\t]{0,200}") {
            let parsed = parse(&input);
            let rejoined = parsed
                .iter()
                .map(RecipientHandle::as_str)
                .collect::<Vec<_>>()
                .join(",");
            prop_assert_eq!(parse(&rejoined), parsed);
        }
    }
}
