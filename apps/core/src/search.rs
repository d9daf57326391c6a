use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{normalize_query, ShortcutItem};

pub const RESULT_CAP: usize = 50;

/// Catalog of launchable shortcuts. `load` swaps the whole catalog at once;
/// a filter keeps the snapshot it started with.
pub struct SearchIndex {
    catalog: RwLock<Arc<[ShortcutItem]>>,
    cap: usize,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::with_cap(RESULT_CAP)
    }
}

impl SearchIndex {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            catalog: RwLock::new(Arc::from(Vec::new())),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn load(&self, items: Vec<ShortcutItem>) {
        let next: Arc<[ShortcutItem]> = Arc::from(items);
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn snapshot(&self) -> Arc<[ShortcutItem]> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn filter(&self, query: &str) -> Vec<ShortcutItem> {
        let catalog = self.snapshot();
        filter(&catalog, query, self.cap)
    }
}

/// First `limit` items, in catalog order, whose name contains the normalized
/// query case-insensitively. A blank query matches everything.
pub fn filter(items: &[ShortcutItem], query: &str, limit: usize) -> Vec<ShortcutItem> {
    let normalized = normalize_query(query);
    items
        .iter()
        .filter(|item| normalized.is_empty() || item.normalized_name().contains(&normalized))
        .take(limit)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[ShortcutItem]) -> Vec<&str> {
        items.iter().map(|item| item.name()).collect()
    }

    #[test]
    fn blank_query_returns_catalog_prefix() {
        let items: Vec<ShortcutItem> = (0..80)
            .map(|i| ShortcutItem::new(&format!("App {i:02}"), &format!("C:\\{i}.lnk")))
            .collect();

        let results = filter(&items, "   ", RESULT_CAP);
        assert_eq!(results.len(), 50);
        assert_eq!(results.first().map(|i| i.name()), Some("App 00"));
        assert_eq!(results.last().map(|i| i.name()), Some("App 49"));
    }

    #[test]
    fn multi_token_query_matches_as_single_substring() {
        let items = vec![
            ShortcutItem::new("Visual Studio Code", "a"),
            ShortcutItem::new("Studio Visual", "b"),
        ];
        let results = filter(&items, "  visual   STUDIO ", 10);
        assert_eq!(names(&results), vec!["Visual Studio Code"]);
    }

    #[test]
    fn zero_limit_returns_nothing() {
        let items = vec![ShortcutItem::new("Notepad", "n")];
        assert!(filter(&items, "", 0).is_empty());
    }
}
