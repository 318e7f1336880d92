//! Page windows and page assembly

use crate::error::{IndexError, Result};
use crate::models::Page;

/// Validated offset/limit of a paged read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

impl PageWindow {
    /// A negative limit is rejected, a limit above `max_limit` is clamped
    /// and a negative offset reads from the start.
    pub fn new(offset: i64, limit: i64, max_limit: usize) -> Result<Self> {
        if limit < 0 {
            return Err(IndexError::InvalidLimit(limit));
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX).min(max_limit);
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        Ok(Self { offset, limit })
    }

    /// Hits to collect so the window can be cut out; never zero, so the
    /// total is still computed for an empty page
    pub fn fetch(&self) -> usize {
        self.offset.saturating_add(self.limit).max(1)
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.limit)
    }

    /// Offset of the following page, present iff matches remain past this one
    pub fn next_offset(&self, total: u64) -> Option<usize> {
        (total > self.end() as u64).then(|| self.end())
    }

    /// Cut this window out of the top `fetch()` hits
    pub fn assemble<T>(&self, total: u64, hits: Vec<T>) -> Page<T> {
        let events = hits
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();
        Page {
            total,
            limit: self.limit,
            next_offset: self.next_offset(total),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_limit_rejected() {
        assert!(matches!(
            PageWindow::new(0, -1, 100),
            Err(IndexError::InvalidLimit(-1))
        ));
    }

    #[test]
    fn test_limit_clamped_and_offset_floored() {
        let window = PageWindow::new(-5, 5000, 1000).unwrap();
        assert_eq!(window, PageWindow { offset: 0, limit: 1000 });
    }

    #[test]
    fn test_zero_limit_still_counts() {
        let window = PageWindow::new(0, 0, 1000).unwrap();
        assert_eq!(window.fetch(), 1);

        let page = window.assemble(1, vec!["a"]);
        assert_eq!(page.total, 1);
        assert!(page.events.is_empty());
        assert_eq!(page.next_offset, Some(0));
    }

    #[test]
    fn test_pages_walk_to_the_end() {
        let hits: Vec<u32> = (0..10).collect();
        let mut offset = 0i64;
        let mut seen = Vec::new();
        loop {
            let window = PageWindow::new(offset, 4, 1000).unwrap();
            let page = window.assemble(10, hits[..window.fetch().min(10)].to_vec());
            seen.extend(page.events);
            match page.next_offset {
                Some(next) => offset = next as i64,
                None => break,
            }
        }
        assert_eq!(seen, hits);
    }

    #[test]
    fn test_offset_past_end() {
        let window = PageWindow::new(20, 5, 1000).unwrap();
        let page = window.assemble(10, (0..10).collect::<Vec<u32>>());
        assert!(page.events.is_empty());
        assert_eq!(page.next_offset, None);
    }
}
