use smallvec::SmallVec;

use super::catalog::Catalog;

/// Catalog indices for a view. The built-in catalog fits inline.
pub type Matches = SmallVec<[usize; 16]>;

/// Indices of the entries whose label starts with `query`, ignoring case, in
/// catalog order.
pub fn filter(catalog: &Catalog, query: &str) -> Matches {
    let needle = query.to_lowercase();
    catalog
        .list()
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.label.to_lowercase().starts_with(&needle))
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(catalog: &Catalog, query: &str) -> Vec<&'static str> {
        filter(catalog, query)
            .iter()
            .filter_map(|&idx| catalog.get(idx))
            .map(|e| e.label)
            .collect()
    }

    #[test]
    fn empty_query_returns_everything() {
        let catalog = Catalog::builtin();
        assert_eq!(filter(&catalog, "").len(), catalog.list().len());
    }

    #[test]
    fn head_narrows_to_headings() {
        let catalog = Catalog::builtin();
        assert_eq!(
            labels(&catalog, "head"),
            ["Heading 1", "Heading 2", "Heading 3"]
        );
        assert_eq!(labels(&catalog, "HEADING 2"), ["Heading 2"]);
    }

    #[test]
    fn matches_label_prefix_only() {
        let catalog = Catalog::builtin();
        // "list" appears inside labels and descriptions but never as a prefix
        assert!(filter(&catalog, "list").is_empty());
        assert!(filter(&catalog, "snippet").is_empty());
        assert_eq!(labels(&catalog, "b"), ["Bullet List", "Blockquote"]);
    }

    proptest! {
        #[test]
        fn result_is_ordered_subsequence(query in "[a-zA-Z0-9 ]{0,6}") {
            let catalog = Catalog::builtin();
            let hits = filter(&catalog, &query);
            prop_assert!(hits.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(hits.iter().all(|&idx| idx < catalog.list().len()));
            let needle = query.to_lowercase();
            for (idx, entry) in catalog.list().iter().enumerate() {
                let expected = entry.label.to_lowercase().starts_with(&needle);
                prop_assert_eq!(hits.contains(&idx), expected);
            }
        }
    }
}
