use crate::models::Item;

/// Appends a freshly fetched page to the items already shown.
///
/// Order is page-arrival order. Ids repeated across pages are kept as-is;
/// the remote source decides whether pages overlap.
pub fn accumulate(mut existing: Vec<Item>, incoming: Vec<Item>) -> Vec<Item> {
    existing.extend(incoming);
    existing
}
