use std::collections::BTreeMap;

use crate::sync::edit_buffer::MergedDocument;

/// Group label for documents without a usable key.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Groups `items` by the label `key` returns. Groups are sorted by label and keep the
/// input order inside each group; items without a label land in [`UNCATEGORIZED`].
pub fn group_by<T, F>(items: &[T], key: F) -> BTreeMap<String, Vec<T>>
where
    T: Clone,
    F: Fn(&T) -> Option<&str>,
{
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let label = key(item).unwrap_or(UNCATEGORIZED);
        groups.entry(label.to_string()).or_default().push(item.clone());
    }
    groups
}

/// Groups merged documents by a string field.
pub fn group_by_field(
    documents: &[MergedDocument],
    key_field: &str,
) -> BTreeMap<String, Vec<MergedDocument>> {
    group_by(documents, |doc| doc.get_str(key_field))
}
