//! Round-robin pools for credentials and endpoints.
//!
//! A [`Rotator`] owns a fixed, non-empty list and a single cursor behind a
//! mutex. `next()` returns the element under the cursor and advances it;
//! `current()` only peeks. The starting cursor is random per pool, so
//! separate processes spread their load over different keys and endpoints
//! while one process still walks the list in a fixed cyclic order.

use crate::config::DEFAULT_BASE_URL;
use crate::error::OcrError;
use rand::Rng;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// A fixed pool handed out in round-robin order.
pub struct Rotator<T> {
    items: Vec<T>,
    cursor: Mutex<usize>,
}

// Pool contents are credentials; only the shape is printed.
impl<T> fmt::Debug for Rotator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotator")
            .field("len", &self.items.len())
            .field("cursor", &*self.lock())
            .finish()
    }
}

impl<T> Rotator<T> {
    /// The cursor is a plain index, so a poisoned lock still holds a valid value.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> Rotator<T> {
    /// Build a pool starting at a random offset.
    pub fn new(items: Vec<T>) -> Result<Self, OcrError> {
        if items.is_empty() {
            return Err(OcrError::InvalidConfig("rotation pool is empty".into()));
        }
        let offset = rand::thread_rng().gen_range(0..items.len());
        Ok(Self::with_offset(items, offset))
    }

    /// Build a pool with a fixed starting offset (taken modulo the length).
    ///
    /// # Panics
    /// Panics if `items` is empty.
    pub fn with_offset(items: Vec<T>, offset: usize) -> Self {
        assert!(!items.is_empty(), "Rotator requires at least one item");
        let cursor = offset % items.len();
        Self {
            items,
            cursor: Mutex::new(cursor),
        }
    }

    /// Return the element under the cursor and advance.
    pub fn next(&self) -> T {
        let mut cursor = self.lock();
        let item = self.items[*cursor].clone();
        *cursor = (*cursor + 1) % self.items.len();
        item
    }

    /// Return the element under the cursor without advancing.
    pub fn current(&self) -> T {
        let cursor = self.lock();
        self.items[*cursor].clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Credentials for the `Authorization: Bearer` header.
pub type CredentialPool = Rotator<String>;

/// Service base URLs, each ending in `/`.
pub type EndpointPool = Rotator<String>;

/// Build the credential pool; an empty list is a configuration error.
pub fn credential_pool(keys: &[String]) -> Result<CredentialPool, OcrError> {
    if keys.is_empty() {
        return Err(OcrError::InvalidConfig(
            "at least one API key is required".into(),
        ));
    }
    Rotator::new(keys.to_vec())
}

/// Build the endpoint pool, falling back to the public endpoint when empty.
pub fn endpoint_pool(urls: &[String]) -> EndpointPool {
    let urls: Vec<String> = if urls.is_empty() {
        vec![DEFAULT_BASE_URL.to_string()]
    } else {
        urls.iter()
            .map(|u| crate::config::normalize_base_url(u))
            .collect()
    };
    let offset = rand::thread_rng().gen_range(0..urls.len());
    Rotator::with_offset(urls, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn full_cycle_visits_each_item_once() {
        for n in 1..=7usize {
            let items: Vec<usize> = (0..n).collect();
            let pool = Rotator::new(items).unwrap();
            let mut seen: Vec<usize> = (0..n).map(|_| pool.next()).collect();
            let first_cycle = seen.clone();
            seen.sort_unstable();
            assert_eq!(seen, (0..n).collect::<Vec<_>>(), "n = {n}");

            // The second cycle repeats the first in the same order.
            let second: Vec<usize> = (0..n).map(|_| pool.next()).collect();
            assert_eq!(first_cycle, second);
        }
    }

    #[test]
    fn cyclic_order_from_offset() {
        let pool = Rotator::with_offset(vec!["a", "b", "c"], 1);
        assert_eq!(pool.current(), "b");
        assert_eq!(pool.next(), "b");
        assert_eq!(pool.next(), "c");
        assert_eq!(pool.next(), "a");
        assert_eq!(pool.current(), "b");
    }

    #[test]
    fn current_does_not_advance() {
        let pool = Rotator::with_offset(vec![1, 2], 0);
        assert_eq!(pool.current(), 1);
        assert_eq!(pool.current(), 1);
        assert_eq!(pool.next(), 1);
        assert_eq!(pool.current(), 2);
    }

    #[test]
    fn offset_wraps() {
        let pool = Rotator::with_offset(vec!['x', 'y'], 5);
        assert_eq!(pool.current(), 'y');
    }

    #[test]
    fn empty_pool_is_config_error() {
        assert!(matches!(
            Rotator::<String>::new(Vec::new()),
            Err(OcrError::InvalidConfig(_))
        ));
        assert!(credential_pool(&[]).is_err());
    }

    #[test]
    fn endpoint_pool_defaults_and_normalises() {
        let pool = endpoint_pool(&[]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.current(), DEFAULT_BASE_URL);

        let pool = endpoint_pool(&["https://a.example/v1".to_string()]);
        assert_eq!(pool.next(), "https://a.example/v1/");
    }

    #[test]
    fn debug_hides_items() {
        let pool = Rotator::with_offset(vec!["secret-key".to_string()], 0);
        let dbg = format!("{pool:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("len: 1"));
    }

    #[test]
    fn concurrent_next_is_linearizable() {
        let n = 4;
        let per_thread = 250;
        let threads = 8;
        let pool = Arc::new(Rotator::new((0..n).collect::<Vec<usize>>()).unwrap());

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || (0..per_thread).map(|_| pool.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for h in handles {
            for item in h.join().unwrap() {
                *counts.entry(item).or_default() += 1;
            }
        }
        // 2000 calls over 4 items: every item handed out exactly 500 times.
        assert_eq!(counts.len(), n);
        for (_, c) in counts {
            assert_eq!(c, threads * per_thread / n);
        }
    }
}
