//! Property-based tests for mapped text
//!
//! A mapped string built from pieces of a source must read as the concatenation of those
//! pieces, every byte taken from the source must map back to an equal byte, inserted
//! literals must map to nothing, and closest mapping must always succeed.

use cellsense_parser::mapped_text::{MappedString, Piece};
use proptest::prelude::*;

/// A source text plus a decomposition of it into ranges, each optionally preceded by a
/// literal
fn decomposition_strategy() -> impl Strategy<Value = (String, Vec<usize>, Vec<String>)> {
    "[a-z :\\n]{1,40}".prop_flat_map(|source| {
        let len = source.len();
        (
            Just(source),
            prop::collection::vec(0..=len, 0..5),
            prop::collection::vec("[#|-]{0,3}", 6),
        )
    })
}

/// Build the pieces and remember which value offsets came from the source
fn build(source: &str, cuts: &[usize], literals: &[String]) -> (Vec<Piece>, String, Vec<bool>) {
    let mut bounds = cuts.to_vec();
    bounds.push(0);
    bounds.push(source.len());
    bounds.sort_unstable();
    bounds.dedup();

    let mut pieces = Vec::new();
    let mut expected = String::new();
    let mut from_source = Vec::new();
    for (i, window) in bounds.windows(2).enumerate() {
        let literal = &literals[i % literals.len()];
        if !literal.is_empty() {
            pieces.push(Piece::from(literal.as_str()));
            expected.push_str(literal);
            from_source.extend(std::iter::repeat(false).take(literal.len()));
        }
        pieces.push(Piece::Range(window[0]..window[1]));
        expected.push_str(&source[window[0]..window[1]]);
        from_source.extend(std::iter::repeat(true).take(window[1] - window[0]));
    }
    (pieces, expected, from_source)
}

#[cfg(test)]
mod proptest_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn value_is_concatenation_of_pieces((source, cuts, literals) in decomposition_strategy()) {
            let original = MappedString::new(source.clone());
            let (pieces, expected, _) = build(&source, &cuts, &literals);
            let mapped = original.mapped(pieces).unwrap();
            prop_assert_eq!(mapped.value(), expected.as_str());
        }

        #[test]
        fn map_is_exact_on_source_bytes((source, cuts, literals) in decomposition_strategy()) {
            let original = MappedString::new(source.clone());
            let (pieces, _, from_source) = build(&source, &cuts, &literals);
            let mapped = original.mapped(pieces).unwrap();
            for (offset, is_source) in from_source.iter().enumerate() {
                match mapped.map(offset) {
                    Some(back) => {
                        prop_assert!(*is_source, "literal byte {} mapped to {}", offset, back);
                        prop_assert_eq!(source.as_bytes()[back], mapped.value().as_bytes()[offset]);
                    }
                    None => prop_assert!(!*is_source, "source byte {} did not map", offset),
                }
            }
        }

        #[test]
        fn map_closest_is_total((source, cuts, literals) in decomposition_strategy()) {
            let original = MappedString::new(source.clone());
            let (pieces, _, _) = build(&source, &cuts, &literals);
            let mapped = original.mapped(pieces).unwrap();
            for offset in 0..mapped.len() {
                let closest = mapped.map_closest(offset);
                prop_assert!(closest.is_some(), "no closest offset for {}", offset);
                prop_assert!(closest.unwrap_or(usize::MAX) < source.len());
            }
        }

        #[test]
        fn composition_chains_through_ancestors(
            (source, cuts, literals) in decomposition_strategy(),
            start in 0usize..20,
            width in 0usize..20,
        ) {
            let original = MappedString::new(source.clone());
            let (pieces, _, _) = build(&source, &cuts, &literals);
            let mapped = original.mapped(pieces).unwrap();
            let start = start.min(mapped.len());
            let end = (start + width).min(mapped.len());
            let inner = mapped.slice(start..end).unwrap();
            for offset in 0..inner.len() {
                prop_assert_eq!(inner.map(offset), mapped.map(start + offset));
            }
        }

        #[test]
        fn concat_of_lines_maps_like_the_whole(source in "[a-z :\\n]{1,40}") {
            let original = MappedString::new(source.clone());
            let parts = original.lines();
            let joined = MappedString::concat(&parts).unwrap();
            let expected: String = source.split('\n').collect();
            prop_assert_eq!(joined.value(), expected.as_str());
            for offset in 0..joined.len() {
                let back = joined.map(offset).unwrap();
                prop_assert_eq!(source.as_bytes()[back], joined.value().as_bytes()[offset]);
            }
        }
    }
}
