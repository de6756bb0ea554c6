//! # Cached List
//!
//! The client-held, newest-first list behind a view. Pages append to the
//! tail, push events prepend, replace in place, or remove. Ids are unique
//! and the length never exceeds the cap; overflow drops from the tail and
//! rewinds the cursor so dropped rows come back with the next page.

use std::fmt;
use std::sync::Arc;

use super::event::{Op, RealtimeEvent};
use crate::cursor::Cursor;
use crate::pagination::Page;
use crate::record::Record;

/// Client-side row predicate, e.g. scoping a list to one job
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Default cap on cached rows
pub const DEFAULT_CACHE_CAP: usize = 200;

/// What applying one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Removed,
    Ignored,
}

/// Point-in-time copy of a cached list
#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot {
    pub items: Vec<Record>,
    pub next_cursor: Option<Cursor>,
    /// Realtime events applied so far
    pub received: u64,
}

impl ListSnapshot {
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|r| r.id.as_str()).collect()
    }
}

pub struct CachedList {
    items: Vec<Record>,
    next_cursor: Option<Cursor>,
    cap: usize,
    filter: Option<RecordFilter>,
    received: u64,
}

impl fmt::Debug for CachedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedList")
            .field("len", &self.items.len())
            .field("next_cursor", &self.next_cursor)
            .field("cap", &self.cap)
            .field("filtered", &self.filter.is_some())
            .field("received", &self.received)
            .finish()
    }
}

impl Default for CachedList {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAP, None)
    }
}

impl CachedList {
    pub fn new(cap: usize, filter: Option<RecordFilter>) -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            cap: cap.max(1),
            filter,
            received: 0,
        }
    }

    pub fn items(&self) -> &[Record] {
        &self.items
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            items: self.items.clone(),
            next_cursor: self.next_cursor.clone(),
            received: self.received,
        }
    }

    fn matches(&self, record: &Record) -> bool {
        self.filter.as_ref().map_or(true, |f| f(record))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|r| r.id == id)
    }

    /// Apply one push event. The stored cursor only changes when an
    /// insert pushes the list over its cap.
    pub fn apply(&mut self, event: &RealtimeEvent) -> MergeOutcome {
        self.received += 1;
        match event.op {
            Op::Insert => self.insert(&event.record),
            Op::Update => self.update(&event.record),
            Op::Delete => self.remove(&event.record.id),
        }
    }

    /// Prepend a new row; a known id is treated as an update
    fn insert(&mut self, record: &Record) -> MergeOutcome {
        if self.position(&record.id).is_some() {
            return self.update(record);
        }
        if !self.matches(record) {
            return MergeOutcome::Ignored;
        }
        self.items.insert(0, record.clone());
        self.trim();
        MergeOutcome::Inserted
    }

    /// Merge into the cached row in place. Unknown ids are ignored; a row
    /// that stops matching the filter is removed.
    fn update(&mut self, record: &Record) -> MergeOutcome {
        let Some(pos) = self.position(&record.id) else {
            return MergeOutcome::Ignored;
        };

        let mut merged = self.items[pos].clone();
        merged.merge_from(record);
        if !self.matches(&merged) {
            self.items.remove(pos);
            return MergeOutcome::Removed;
        }
        self.items[pos] = merged;
        MergeOutcome::Updated
    }

    fn remove(&mut self, id: &str) -> MergeOutcome {
        match self.position(id) {
            Some(pos) => {
                self.items.remove(pos);
                MergeOutcome::Removed
            }
            None => MergeOutcome::Ignored,
        }
    }

    /// Replace the whole list with a first page
    pub fn replace_page(&mut self, page: Page) {
        self.items.clear();
        self.next_cursor = None;
        self.append_page(page);
    }

    /// Append a following page. Rows already cached are replaced in place.
    pub fn append_page(&mut self, page: Page) {
        for record in page.items {
            if !self.matches(&record) {
                continue;
            }
            match self.position(&record.id) {
                Some(pos) => self.items[pos] = record,
                None => self.items.push(record),
            }
        }
        self.next_cursor = page.next_cursor;
        self.trim();
    }

    /// Drop tail rows over the cap. The cursor moves back to the new last
    /// row so the next page starts with the first evicted one.
    fn trim(&mut self) {
        if self.items.len() <= self.cap {
            return;
        }
        self.items.truncate(self.cap);
        self.next_cursor = self.items.last().map(|tail| Cursor::from_key(&tail.sort_key()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::encode;
    use serde_json::json;

    fn rec(id: &str, ts: &str) -> Record {
        Record::new(id, ts, "acme")
    }

    fn page(ids: &[(&str, &str)], cursor: Option<Cursor>) -> Page {
        Page {
            items: ids.iter().map(|(id, ts)| rec(id, ts)).collect(),
            next_cursor: cursor,
        }
    }

    fn ids(list: &CachedList) -> Vec<&str> {
        list.items().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_insert_prepends_without_touching_cursor() {
        let cursor = encode("t4", "4");
        let mut list = CachedList::default();
        list.replace_page(page(&[("5", "t5"), ("4", "t4")], Some(cursor.clone())));

        let outcome = list.apply(&RealtimeEvent::insert("pos", rec("9", "t9")));

        assert_eq!(outcome, MergeOutcome::Inserted);
        assert_eq!(ids(&list), vec!["9", "5", "4"]);
        assert_eq!(list.next_cursor(), Some(&cursor));
    }

    #[test]
    fn test_duplicate_insert_becomes_update() {
        let mut list = CachedList::default();
        let event = RealtimeEvent::insert("pos", rec("1", "t1").with_field("n", json!(1)));
        assert_eq!(list.apply(&event), MergeOutcome::Inserted);
        assert_eq!(list.apply(&event), MergeOutcome::Updated);
        assert_eq!(list.len(), 1);
        assert_eq!(list.received(), 2);
    }

    #[test]
    fn test_update_preserves_position() {
        let mut list = CachedList::default();
        list.replace_page(page(&[("3", "t3"), ("2", "t2"), ("1", "t1")], None));

        let patch = Record::new("2", "", "").with_field("status", json!("delivered"));
        assert_eq!(
            list.apply(&RealtimeEvent::update("pos", patch)),
            MergeOutcome::Updated
        );

        assert_eq!(ids(&list), vec!["3", "2", "1"]);
        assert_eq!(list.items()[1].fields["status"], json!("delivered"));
        assert_eq!(list.items()[1].created_at, "t2");
    }

    #[test]
    fn test_update_unknown_id_ignored() {
        let mut list = CachedList::default();
        let outcome = list.apply(&RealtimeEvent::update("pos", rec("x", "t1")));
        assert_eq!(outcome, MergeOutcome::Ignored);
        assert!(list.is_empty());
    }

    #[test]
    fn test_delete_present_and_absent() {
        let mut list = CachedList::default();
        list.replace_page(page(&[("2", "t2"), ("1", "t1")], None));
        assert_eq!(
            list.apply(&RealtimeEvent::delete("pos", Record::new("1", "", ""))),
            MergeOutcome::Removed
        );
        assert_eq!(
            list.apply(&RealtimeEvent::delete("pos", Record::new("1", "", ""))),
            MergeOutcome::Ignored
        );
        assert_eq!(ids(&list), vec!["2"]);
    }

    #[test]
    fn test_cap_drops_tail_not_head() {
        let mut list = CachedList::new(3, None);
        list.replace_page(page(&[("3", "t3"), ("2", "t2"), ("1", "t1")], None));
        list.apply(&RealtimeEvent::insert("pos", rec("4", "t4")));
        list.apply(&RealtimeEvent::insert("pos", rec("5", "t5")));
        assert_eq!(ids(&list), vec!["5", "4", "3"]);
    }

    #[test]
    fn test_cap_rewinds_cursor_to_new_tail() {
        let mut list = CachedList::new(3, None);
        list.replace_page(page(&[("6", "t6"), ("5", "t5"), ("4", "t4")], Some(encode("t4", "4"))));

        list.apply(&RealtimeEvent::insert("pos", rec("9", "t9")));

        assert_eq!(ids(&list), vec!["9", "6", "5"]);
        assert_eq!(list.next_cursor(), Some(&encode("t5", "5")));
    }

    #[test]
    fn test_cap_on_last_page_restores_cursor() {
        let mut list = CachedList::new(2, None);
        list.replace_page(page(&[("2", "t2"), ("1", "t1")], None));

        list.apply(&RealtimeEvent::insert("pos", rec("3", "t3")));

        assert_eq!(list.next_cursor(), Some(&encode("t2", "2")));
    }

    #[test]
    fn test_append_over_cap_rewinds_cursor() {
        let mut list = CachedList::new(3, None);
        list.replace_page(page(&[("5", "t5"), ("4", "t4")], Some(encode("t4", "4"))));
        list.append_page(page(&[("3", "t3"), ("2", "t2")], Some(encode("t2", "2"))));

        assert_eq!(ids(&list), vec!["5", "4", "3"]);
        assert_eq!(list.next_cursor(), Some(&encode("t3", "3")));
    }

    #[test]
    fn test_append_dedups() {
        let mut list = CachedList::default();
        list.replace_page(page(&[("3", "t3"), ("2", "t2")], Some(encode("t2", "2"))));
        list.append_page(page(&[("2", "t2"), ("1", "t1")], None));
        assert_eq!(ids(&list), vec!["3", "2", "1"]);
        assert!(list.next_cursor().is_none());
    }

    #[test]
    fn test_filter_scopes_inserts_and_updates() {
        let filter: RecordFilter = Arc::new(|r: &Record| r.fields.get("job_id") == Some(&json!("j1")));
        let mut list = CachedList::new(10, Some(filter));

        let other_job = rec("a", "t1").with_field("job_id", json!("j2"));
        assert_eq!(
            list.apply(&RealtimeEvent::insert("expenses", other_job)),
            MergeOutcome::Ignored
        );

        let mine = rec("b", "t2").with_field("job_id", json!("j1"));
        assert_eq!(
            list.apply(&RealtimeEvent::insert("expenses", mine)),
            MergeOutcome::Inserted
        );

        let moved = Record::new("b", "", "").with_field("job_id", json!("j2"));
        assert_eq!(
            list.apply(&RealtimeEvent::update("expenses", moved)),
            MergeOutcome::Removed
        );
        assert!(list.is_empty());
    }
}
