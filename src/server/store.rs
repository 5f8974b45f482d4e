use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use hashbrown::HashSet;
use parking_lot::Mutex;

use super::{recorder::Recorder, wire::MAX_NUMBER, Number};

/// A set of numbers that answers "is this the first time?" exactly once per
/// number.
///
/// `is_unique` marks the number as seen and reports whether this call was the
/// one that did so. The check and the mark are a single step: however many
/// callers race on the same number, exactly one of them gets `true`.
pub trait Store: Send + Sync {
    fn is_unique(&self, number: Number) -> bool;
}

/// Which [`Store`] implementation to build. They only differ in memory use and
/// contention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    /// [`MapStore`]
    Map,
    /// [`BitmapStore`]
    Dense,
    /// [`AtomicBitmapStore`]
    #[default]
    Atomic,
}

impl StoreKind {
    /// Builds the store, counting every answer into `recorder`.
    pub fn build(self, recorder: Arc<Recorder>) -> Arc<dyn Store> {
        match self {
            Self::Map => Arc::new(Recorded::new(MapStore::new(), recorder)),
            Self::Dense => Arc::new(Recorded::new(BitmapStore::new(), recorder)),
            Self::Atomic => Arc::new(Recorded::new(AtomicBitmapStore::new(), recorder)),
        }
    }
}

/// Hash set behind a single lock. Memory grows with the number of distinct
/// values seen, but every call serializes on the lock.
#[derive(Debug, Default)]
pub struct MapStore {
    seen: Mutex<HashSet<u32>>,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

impl Store for MapStore {
    fn is_unique(&self, number: Number) -> bool {
        self.seen.lock().insert(number.get())
    }
}

// one bit per number across the whole domain
const WORDS: usize = (MAX_NUMBER as usize + 1 + 63) / 64;

fn locate(number: Number) -> (usize, u64) {
    let index = number.index();
    (index / 64, 1 << (index % 64))
}

/// One flag per possible number behind a single lock.
///
/// Reserves the full domain up front (about 120 MiB) no matter how many
/// numbers are actually seen.
pub struct BitmapStore {
    bits: Mutex<Vec<u64>>,
}

impl BitmapStore {
    pub fn new() -> Self {
        Self {
            bits: Mutex::new(vec![0; WORDS]),
        }
    }
}

impl Default for BitmapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for BitmapStore {
    fn is_unique(&self, number: Number) -> bool {
        let (word, mask) = locate(number);
        let mut bits = self.bits.lock();
        let unseen = bits[word] & mask == 0;
        bits[word] |= mask;
        unseen
    }
}

/// One flag per possible number, each word updated with its own atomic
/// read-modify-write.
///
/// Same fixed memory cost as [`BitmapStore`], but there is no shared lock:
/// callers only ever touch the 64-bit word holding their number, and even
/// then never block each other.
pub struct AtomicBitmapStore {
    bits: Box<[AtomicU64]>,
}

impl AtomicBitmapStore {
    pub fn new() -> Self {
        Self {
            bits: (0..WORDS).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl Default for AtomicBitmapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for AtomicBitmapStore {
    fn is_unique(&self, number: Number) -> bool {
        let (word, mask) = locate(number);
        self.bits[word].fetch_or(mask, Ordering::AcqRel) & mask == 0
    }
}

/// Wraps a store and tallies each answer in a [`Recorder`].
pub struct Recorded<S> {
    inner: S,
    recorder: Arc<Recorder>,
}

impl<S> Recorded<S> {
    pub fn new(inner: S, recorder: Arc<Recorder>) -> Self {
        Self { inner, recorder }
    }
}

impl<S: Store> Store for Recorded<S> {
    fn is_unique(&self, number: Number) -> bool {
        let unique = self.inner.is_unique(number);
        if unique {
            self.recorder.mark_unique();
        } else {
            self.recorder.mark_duplicate();
        }
        unique
    }
}
