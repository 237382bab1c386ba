//! Drops deleted keys from a merged stream.

use crate::entry::Entry;
use crate::error::Result;

/// Passes live entries and errors; swallows tombstones
pub struct TombstoneFilter<I> {
    inner: I,
}

impl<I> TombstoneFilter<I>
where
    I: Iterator<Item = Result<Entry>>,
{
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> Iterator for TombstoneFilter<I>
where
    I: Iterator<Item = Result<Entry>>,
{
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) if entry.is_tombstone() => continue,
                other => return Some(other),
            }
        }
    }
}
