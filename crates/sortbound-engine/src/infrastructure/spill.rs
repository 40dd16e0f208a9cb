//! Append-only vector with an in-RAM window and a scratch-file tail.
//!
//! The vector holds indices `0..size_total`. The window
//! `[size_offline, size_total)` is resident in a fixed ring buffer;
//! everything below `size_offline` has been paged out to the scratch
//! region. Appends are lock-free through an atomic tail counter; paging
//! happens only through `&mut self`, which the searches call exclusively
//! between their parallel phases.
//!
//! # Safety model
//!
//! Concurrent `insert` calls write disjoint ring slots (the atomic
//! fetch-add hands out unique indices) and `get` only reads indices below
//! the published total, so shared access is race-free as long as the
//! window invariant holds. The invariant is asserted, not silently
//! repaired: overrunning the online capacity is a sizing bug.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::scratch::ScratchRegion;

/// Fixed-size serialization for items that can live in the scratch tail.
pub trait SpillItem: Send + Sync {
    /// Encoded size in bytes.
    const BYTES: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl SpillItem for std::sync::atomic::AtomicU64 {
    const BYTES: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.load(Ordering::Relaxed).to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self::new(u64::from_le_bytes(buf[..8].try_into().unwrap()))
    }
}

pub struct SpillVector<T: SpillItem> {
    online: Box<[UnsafeCell<MaybeUninit<T>>]>,
    online_cap: usize,
    size_total: AtomicUsize,
    size_offline: AtomicUsize,
    /// Low-water mark set by `ensure_online_from`: paging out past this
    /// point would evict data the current step still addresses.
    required_online: usize,
    tail: ScratchRegion,
}

// The manual Sync is what the safety model above justifies: all shared
// mutation goes through atomics or disjoint ring slots.
unsafe impl<T: SpillItem> Sync for SpillVector<T> {}

impl<T: SpillItem> SpillVector<T> {
    /// `online_cap` resident slots backed by a tail region of
    /// `offline_cap` encoded items.
    pub fn new(online_cap: usize, offline_cap: usize, tail: ScratchRegion) -> Self {
        assert!(tail.len() >= (offline_cap as u64) * T::BYTES as u64);
        let mut online = Vec::with_capacity(online_cap);
        for _ in 0..online_cap {
            online.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            online: online.into_boxed_slice(),
            online_cap,
            size_total: AtomicUsize::new(0),
            size_offline: AtomicUsize::new(0),
            required_online: 0,
            tail,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size_total.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn offline_len(&self) -> usize {
        self.size_offline.load(Ordering::Acquire)
    }

    /// Appends one item; returns its index.
    pub fn insert(&self, item: T) -> usize {
        let pos = self.size_total.fetch_add(1, Ordering::AcqRel);
        let offline = self.size_offline.load(Ordering::Acquire);
        assert!(
            pos - offline < self.online_cap,
            "spill vector online window exhausted (pos {pos}, offline {offline})"
        );
        let slot = pos % self.online_cap;
        // Safety: `pos` is unique to this call, so no other thread touches
        // this slot; readers only access indices < the total we advanced.
        unsafe {
            (*self.online[slot].get()).write(item);
        }
        pos
    }

    /// Appends a batch contiguously; returns the index of the first item.
    pub fn insert_all<I>(&self, items: I, count: usize) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let pos = self.size_total.fetch_add(count, Ordering::AcqRel);
        let offline = self.size_offline.load(Ordering::Acquire);
        assert!(pos + count - offline <= self.online_cap, "spill vector online window exhausted");
        let mut written = 0;
        for (i, item) in items.into_iter().enumerate() {
            let slot = (pos + i) % self.online_cap;
            unsafe {
                (*self.online[slot].get()).write(item);
            }
            written += 1;
        }
        debug_assert_eq!(written, count);
        pos
    }

    /// Shared access to a resident item.
    #[inline]
    pub fn get(&self, pos: usize) -> &T {
        debug_assert!(pos >= self.offline_len(), "index {pos} paged out");
        debug_assert!(pos < self.len(), "index {pos} beyond total");
        let slot = pos % self.online_cap;
        // Safety: the window invariant guarantees the slot is initialized
        // and not concurrently re-targeted (paging requires &mut self).
        unsafe { (*self.online[slot].get()).assume_init_ref() }
    }

    /// Pages items out of the ring head until at least
    /// `required_available` slots are free.
    pub fn ensure_online_available(&mut self, required_available: usize) {
        let total = self.len();
        let offline = self.offline_len();
        let free = self.online_cap - (total - offline);
        if free >= required_available {
            return;
        }
        let count = required_available - free;
        let end = offline + count;
        assert!(end <= total, "cannot free {required_available} slots: vector too small");
        assert!(end <= self.required_online, "paging out data still addressed by the caller");
        assert!((end as u64) * T::BYTES as u64 <= self.tail.len(), "spill tail exhausted");

        let mut buf = vec![0u8; T::BYTES];
        for i in offline..end {
            let slot = i % self.online_cap;
            let item = unsafe { (*self.online[slot].get()).assume_init_ref() };
            item.encode(&mut buf);
            self.tail.write_at((i as u64) * T::BYTES as u64, &buf);
        }
        self.size_offline.store(end, Ordering::Release);
    }

    /// Pages `[begin, size_offline)` back into the ring and records
    /// `begin` as the new low-water mark.
    pub fn ensure_online_from(&mut self, begin: usize) {
        let offline = self.offline_len();
        if begin < offline {
            assert!(self.online_cap >= self.len() - begin, "window too small to page back in");
            self.size_offline.store(begin, Ordering::Release);
            let mut buf = vec![0u8; T::BYTES];
            for i in begin..offline {
                self.tail.read_at((i as u64) * T::BYTES as u64, &mut buf);
                let item = T::decode(&buf);
                let slot = i % self.online_cap;
                unsafe {
                    (*self.online[slot].get()).write(item);
                }
            }
        }
        self.required_online = begin;
    }

    /// Truncates (or, rarely, extends the logical size). Shrinking below
    /// the offline boundary drops the paged-out tail as well.
    pub fn resize(&mut self, new_size: usize) {
        let offline = self.offline_len();
        if new_size < offline {
            self.size_offline.store(new_size, Ordering::Release);
        } else if new_size > offline + self.online_cap {
            let total = self.len();
            self.ensure_online_available(new_size - total);
        }
        self.size_total.store(new_size, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::scratch::{ScratchAllocator, ScratchFile};
    use std::sync::atomic::AtomicU64;

    fn make_vector(online: usize, offline: usize) -> (SpillVector<AtomicU64>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spill.bin");
        let len = (offline * 8) as u64;
        let file = ScratchFile::create(&path, len).unwrap();
        let mut alloc = ScratchAllocator::new(file, len);
        (SpillVector::new(online, offline, alloc.alloc(len)), dir)
    }

    fn read(v: &SpillVector<AtomicU64>, i: usize) -> u64 {
        v.get(i).load(Ordering::Relaxed)
    }

    #[test]
    fn insert_and_read_back() {
        let (v, _dir) = make_vector(8, 64);
        for i in 0..8u64 {
            assert_eq!(v.insert(AtomicU64::new(i * 10)), i as usize);
        }
        for i in 0..8 {
            assert_eq!(read(&v, i), i as u64 * 10);
        }
    }

    #[test]
    fn window_survives_page_out_and_back() {
        let (mut v, _dir) = make_vector(4, 64);
        for i in 0..4u64 {
            v.insert(AtomicU64::new(i));
        }
        // nothing below 4 is needed online for now
        v.ensure_online_from(4);
        v.ensure_online_available(3);
        assert_eq!(v.offline_len(), 3);
        for i in 4..7u64 {
            v.insert(AtomicU64::new(i));
        }
        assert_eq!(read(&v, 3), 3);
        assert_eq!(read(&v, 6), 6);

        // page the head back in; everything must be readable again
        v.resize(4);
        v.ensure_online_from(0);
        assert_eq!(v.offline_len(), 0);
        for i in 0..4u64 {
            assert_eq!(read(&v, i as usize), i);
        }
    }

    #[test]
    fn resize_below_offline_drops_tail() {
        let (mut v, _dir) = make_vector(4, 64);
        for i in 0..4u64 {
            v.insert(AtomicU64::new(i));
        }
        v.ensure_online_from(4);
        v.ensure_online_available(4);
        assert_eq!(v.offline_len(), 4);
        v.resize(2);
        assert_eq!(v.len(), 2);
        assert_eq!(v.offline_len(), 2);
        v.ensure_online_from(0);
        assert_eq!(read(&v, 0), 0);
        assert_eq!(read(&v, 1), 1);
    }

    #[test]
    fn batch_insert_is_contiguous() {
        let (v, _dir) = make_vector(16, 64);
        v.insert(AtomicU64::new(99));
        let base = v.insert_all((0..5u64).map(AtomicU64::new), 5);
        assert_eq!(base, 1);
        for i in 0..5 {
            assert_eq!(read(&v, base + i), i as u64);
        }
    }
}
