//! Selectors and their expansion into key sequences.
//!
//! A range selector resolves to a half-open interval of encoded keys which the
//! store lists page by page. Each page resumes strictly after the last key
//! returned, so the listing stays correct while the caller deletes the keys it
//! has already seen.

use std::ops::Bound;

use crate::error::KVError;
use crate::key::Key;
use crate::traits::{Consistency, Entry, KVStore};

/// Every encoded part starts with a tag in `0x01..=0x27`, so these two suffixes
/// bracket all strict extensions of a prefix.
const PREFIX_LOW: u8 = 0x00;
const PREFIX_HIGH: u8 = 0xFF;

/// Which keys an operation applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// An explicit list of keys, used as-is.
    Keys(Vec<Key>),

    /// A contiguous key range. `prefix` matches strict extensions of the prefix
    /// (not the prefix key itself), `start` is inclusive, `end` is exclusive.
    Range {
        prefix: Option<Key>,
        start: Option<Key>,
        end: Option<Key>,
    },
}

impl Selector {
    /// Selector matching every key.
    pub fn all() -> Self {
        Self::prefix(Key::default())
    }

    pub fn prefix(prefix: Key) -> Self {
        Selector::Range {
            prefix: Some(prefix),
            start: None,
            end: None,
        }
    }

    pub fn range(start: Key, end: Key) -> Self {
        Selector::Range {
            prefix: None,
            start: Some(start),
            end: Some(end),
        }
    }

    /// Narrow a range selector to begin at `start` (inclusive).
    pub fn with_start(mut self, key: Key) -> Self {
        if let Selector::Range { start, .. } = &mut self {
            *start = Some(key);
        }
        self
    }

    /// Narrow a range selector to stop before `end` (exclusive).
    pub fn with_end(mut self, key: Key) -> Self {
        if let Selector::Range { end, .. } = &mut self {
            *end = Some(key);
        }
        self
    }

    /// Validate a range selector and convert it to encoded bounds.
    /// Returns None for an explicit key list.
    pub fn key_range(&self) -> Result<Option<KeyRange>, KVError> {
        match self {
            Selector::Keys(_) => Ok(None),
            Selector::Range { prefix, start, end } => {
                range_bounds(prefix.as_ref(), start.as_ref(), end.as_ref()).map(Some)
            }
        }
    }
}

fn range_bounds(
    prefix: Option<&Key>,
    start: Option<&Key>,
    end: Option<&Key>,
) -> Result<KeyRange, KVError> {
    let (low, high) = match (prefix, start, end) {
        (Some(p), _, _) => {
            for (name, bound) in [("start", start), ("end", end)] {
                if let Some(k) = bound {
                    if !k.starts_with(p) || k.len() == p.len() {
                        return Err(KVError::InvalidSelector(format!(
                            "{} key {} is outside prefix {}",
                            name, k, p
                        )));
                    }
                }
            }

            let encoded = p.encode();
            let low = match start {
                Some(s) => s.encode(),
                None => [encoded.as_slice(), &[PREFIX_LOW][..]].concat(),
            };
            let high = match end {
                Some(e) => e.encode(),
                None => [encoded.as_slice(), &[PREFIX_HIGH][..]].concat(),
            };
            (low, high)
        }
        (None, Some(s), Some(e)) => (s.encode(), e.encode()),
        (None, _, _) => {
            return Err(KVError::InvalidSelector(
                "a range needs a prefix, or both start and end".to_string(),
            ));
        }
    };

    if low > high {
        return Err(KVError::InvalidSelector(
            "start key is after end key".to_string(),
        ));
    }

    Ok(KeyRange {
        start: low,
        end: high,
    })
}

impl From<Vec<Key>> for Selector {
    fn from(keys: Vec<Key>) -> Self {
        Selector::Keys(keys)
    }
}

/// Half-open interval `[start, end)` over encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn contains(&self, encoded: &[u8]) -> bool {
        encoded >= self.start.as_slice() && encoded < self.end.as_slice()
    }

    /// Bounds of the part of the range that lies strictly after `after`.
    /// Returns None when nothing is left, so callers never build an inverted
    /// range.
    pub fn resume_bounds<'a>(
        &'a self,
        after: Option<&'a [u8]>,
    ) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
        let low = match after {
            Some(cursor) if cursor >= self.start.as_slice() => {
                if cursor >= self.end.as_slice() {
                    return None;
                }
                Bound::Excluded(cursor)
            }
            _ => {
                if self.start >= self.end {
                    return None;
                }
                Bound::Included(self.start.as_slice())
            }
        };
        Some((low, Bound::Excluded(self.end.as_slice())))
    }
}

/// Lazy iterator over the entries of a range, fetched one page per store
/// round trip.
pub struct List<'a> {
    store: &'a dyn KVStore,
    range: KeyRange,
    consistency: Consistency,
    page_size: usize,
    page: std::vec::IntoIter<Entry>,
    cursor: Option<Vec<u8>>,
    exhausted: bool,
}

impl<'a> List<'a> {
    pub fn new(
        store: &'a dyn KVStore,
        range: KeyRange,
        page_size: usize,
        consistency: Consistency,
    ) -> Self {
        Self {
            store,
            range,
            consistency,
            page_size: page_size.max(1),
            page: Vec::new().into_iter(),
            cursor: None,
            exhausted: false,
        }
    }
}

impl Iterator for List<'_> {
    type Item = Result<Entry, KVError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.page.next() {
            return Some(Ok(entry));
        }
        if self.exhausted {
            return None;
        }

        let page = match self.store.list_page(
            &self.range,
            self.cursor.as_deref(),
            self.page_size,
            self.consistency,
        ) {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Some(Err(e));
            }
        };

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        let (last, _) = page.last()?;
        self.cursor = Some(last.encode());
        self.page = page.into_iter();
        self.page.next().map(Ok)
    }
}

/// Lazily resolved keys of a selector.
pub type KeyStream<'a> = Box<dyn Iterator<Item = Result<Key, KVError>> + 'a>;

/// Expand a selector into its keys. Explicit key lists pass through unchanged;
/// ranges are listed from the store. Invalid selectors fail before any store
/// access.
pub fn resolve_keys<'a>(
    store: &'a dyn KVStore,
    selector: &'a Selector,
    page_size: usize,
) -> Result<KeyStream<'a>, KVError> {
    match selector {
        Selector::Keys(keys) => Ok(Box::new(keys.iter().cloned().map(Ok))),
        Selector::Range { prefix, start, end } => {
            let range = range_bounds(prefix.as_ref(), start.as_ref(), end.as_ref())?;
            let list = List::new(store, range, page_size, Consistency::Strong);
            Ok(Box::new(list.map(|entry| entry.map(|(key, _)| key))))
        }
    }
}
