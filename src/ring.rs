//! Single-producer/single-consumer byte ring buffer shared between the engine
//! callback and the consumer thread.
//!
//! Reads and writes are all-or-nothing: a request that does not fit leaves the
//! content and both cursors untouched and reports zero bytes moved. Callers on
//! the real-time side pre-check [`RingConsumer::read_space`] /
//! [`RingProducer::write_space`] and treat a miss as an underrun or overrun.
use std::cell::UnsafeCell;
use std::mem::{size_of, size_of_val};
use std::ptr;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size in bytes of one audio sample as stored in a ring.
pub const SAMPLE_BYTES: usize = size_of::<f32>();

/// Cursor block. Both indices only ever grow; their difference is the number
/// of readable bytes and never exceeds `capacity`.
#[repr(C, align(64))]
struct RingHeader {
    capacity: u64,
    write_index: AtomicU64,
    read_index: AtomicU64,
}

struct RingStorage {
    header: RingHeader,
    data: Box<[UnsafeCell<u8>]>,
}

// The producer only touches bytes in [write_index, read_index + capacity) and
// the consumer only bytes in [read_index, write_index); cursor publication is
// release/acquire so the regions never overlap.
unsafe impl Send for RingStorage {}
unsafe impl Sync for RingStorage {}

impl RingStorage {
    fn new(capacity: usize) -> Self {
        let data = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            header: RingHeader {
                capacity: capacity as u64,
                write_index: AtomicU64::new(0),
                read_index: AtomicU64::new(0),
            },
            data,
        }
    }

    fn capacity(&self) -> usize {
        self.header.capacity as usize
    }

    fn read_space(&self) -> usize {
        let write_index = self.header.write_index.load(Ordering::Acquire);
        let read_index = self.header.read_index.load(Ordering::Acquire);
        write_index.saturating_sub(read_index).min(self.header.capacity) as usize
    }

    fn write_space(&self) -> usize {
        self.capacity() - self.read_space()
    }

    fn byte_ptr(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset < self.data.len());
        // Derived from the whole slice so the pointer may cover `offset..len`.
        unsafe { UnsafeCell::raw_get(self.data.as_ptr()).add(offset) }
    }

    /// # Safety
    /// At most one thread may act as producer at any time.
    unsafe fn write(&self, src: &[u8]) -> usize {
        let len = src.len();
        if len == 0 {
            return 0;
        }
        let capacity = self.header.capacity;
        let write_index = self.header.write_index.load(Ordering::Relaxed);
        let read_index = self.header.read_index.load(Ordering::Acquire);
        let free = capacity - (write_index - read_index).min(capacity);
        if free < len as u64 {
            return 0;
        }

        let start = (write_index % capacity) as usize;
        let first_chunk = (self.capacity() - start).min(len);
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.byte_ptr(start), first_chunk);
            if len > first_chunk {
                ptr::copy_nonoverlapping(
                    src.as_ptr().add(first_chunk),
                    self.byte_ptr(0),
                    len - first_chunk,
                );
            }
        }

        self.header
            .write_index
            .store(write_index + len as u64, Ordering::Release);
        len
    }

    /// # Safety
    /// At most one thread may act as consumer at any time.
    unsafe fn read(&self, dst: &mut [u8]) -> usize {
        let len = dst.len();
        if len == 0 {
            return 0;
        }
        let capacity = self.header.capacity;
        let read_index = self.header.read_index.load(Ordering::Relaxed);
        let write_index = self.header.write_index.load(Ordering::Acquire);
        let available = (write_index - read_index).min(capacity);
        if available < len as u64 {
            return 0;
        }

        let start = (read_index % capacity) as usize;
        let first_chunk = (self.capacity() - start).min(len);
        unsafe {
            ptr::copy_nonoverlapping(self.byte_ptr(start), dst.as_mut_ptr(), first_chunk);
            if len > first_chunk {
                ptr::copy_nonoverlapping(
                    self.byte_ptr(0),
                    dst.as_mut_ptr().add(first_chunk),
                    len - first_chunk,
                );
            }
        }

        self.header
            .read_index
            .store(read_index + len as u64, Ordering::Release);
        len
    }
}

fn sample_bytes(samples: &[f32]) -> &[u8] {
    // f32 has no padding and u8 has alignment 1.
    unsafe { slice::from_raw_parts(samples.as_ptr().cast::<u8>(), size_of_val(samples)) }
}

fn sample_bytes_mut(samples: &mut [f32]) -> &mut [u8] {
    // Every bit pattern is a valid f32.
    unsafe { slice::from_raw_parts_mut(samples.as_mut_ptr().cast::<u8>(), size_of_val(samples)) }
}

/// Fixed-capacity byte ring buffer owned by a single thread.
///
/// Use [`RingBuffer::split`] to hand the two ends to different threads.
pub struct RingBuffer {
    storage: Arc<RingStorage>,
}

impl RingBuffer {
    /// Allocate a ring of `capacity` bytes. The capacity never changes.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            storage: Arc::new(RingStorage::new(capacity)),
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Bytes ready for reading.
    pub fn read_space(&self) -> usize {
        self.storage.read_space()
    }

    /// Bytes that can be written without overwriting unread data.
    pub fn write_space(&self) -> usize {
        self.storage.write_space()
    }

    /// Copy all of `src` in, or nothing. Returns bytes written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        unsafe { self.storage.write(src) }
    }

    /// Fill all of `dst`, or nothing. Returns bytes read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        unsafe { self.storage.read(dst) }
    }

    /// Write `samples` as native-endian `f32`, all or nothing. Returns samples written.
    pub fn write_samples(&mut self, samples: &[f32]) -> usize {
        self.write(sample_bytes(samples)) / SAMPLE_BYTES
    }

    /// Fill `out` with samples, all or nothing. Returns samples read.
    pub fn read_samples(&mut self, out: &mut [f32]) -> usize {
        self.read(sample_bytes_mut(out)) / SAMPLE_BYTES
    }

    /// Split into a write-only and a read-only end.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let producer = RingProducer {
            storage: Arc::clone(&self.storage),
        };
        let consumer = RingConsumer {
            storage: self.storage,
        };
        (producer, consumer)
    }
}

/// Write end of a split [`RingBuffer`].
pub struct RingProducer {
    storage: Arc<RingStorage>,
}

impl RingProducer {
    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Bytes currently readable by the consumer.
    pub fn read_space(&self) -> usize {
        self.storage.read_space()
    }

    /// Bytes that can be written right now.
    pub fn write_space(&self) -> usize {
        self.storage.write_space()
    }

    /// Copy all of `src` in, or nothing. Returns bytes written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        unsafe { self.storage.write(src) }
    }

    /// Write `samples`, all or nothing. Returns samples written.
    pub fn write_samples(&mut self, samples: &[f32]) -> usize {
        self.write(sample_bytes(samples)) / SAMPLE_BYTES
    }
}

/// Read end of a split [`RingBuffer`].
pub struct RingConsumer {
    storage: Arc<RingStorage>,
}

impl RingConsumer {
    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Bytes ready for reading.
    pub fn read_space(&self) -> usize {
        self.storage.read_space()
    }

    /// Bytes the producer may still write.
    pub fn write_space(&self) -> usize {
        self.storage.write_space()
    }

    /// Fill all of `dst`, or nothing. Returns bytes read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        unsafe { self.storage.read(dst) }
    }

    /// Fill `out` with samples, all or nothing. Returns samples read.
    pub fn read_samples(&mut self, out: &mut [f32]) -> usize {
        self.read(sample_bytes_mut(out)) / SAMPLE_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_spaces(ring: &RingBuffer) {
        assert_eq!(ring.read_space() + ring.write_space(), ring.capacity());
    }

    #[test]
    fn bytes_come_back_in_order() {
        let mut ring = RingBuffer::new(16);
        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_spaces(&ring);
        assert_eq!(ring.write(&[4, 5, 6, 7, 8]), 5);
        assert_spaces(&ring);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_spaces(&ring);
        assert_eq!(ring.read_space(), 0);
    }

    #[test]
    fn wraparound_preserves_order() {
        let mut ring = RingBuffer::new(8);
        let mut scratch = [0u8; 5];
        assert_eq!(ring.write(&[0, 1, 2, 3, 4]), 5);
        assert_eq!(ring.read(&mut scratch), 5);

        // Cursor now sits at 5; this write wraps past the end.
        assert_eq!(ring.write(&[10, 11, 12, 13, 14, 15, 16]), 7);
        assert_spaces(&ring);
        let mut out = [0u8; 7];
        assert_eq!(ring.read(&mut out), 7);
        assert_eq!(out, [10, 11, 12, 13, 14, 15, 16]);
        assert_spaces(&ring);
    }

    #[test]
    fn fills_to_exact_capacity() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.write(&[9; 4]), 4);
        assert_eq!(ring.write_space(), 0);
        assert_eq!(ring.read_space(), 4);
        assert_eq!(ring.write(&[1]), 0);
    }

    #[test]
    fn rejected_write_leaves_buffer_untouched() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6]), 6);
        let before = (ring.read_space(), ring.write_space());

        assert_eq!(ring.write(&[7, 8, 9]), 0);
        assert_eq!((ring.read_space(), ring.write_space()), before);

        let mut out = [0u8; 6];
        assert_eq!(ring.read(&mut out), 6);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn rejected_read_leaves_buffer_untouched() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.write(&[1, 2]), 2);

        let mut out = [0xAAu8; 3];
        assert_eq!(ring.read(&mut out), 0);
        assert_eq!(out, [0xAA; 3]);
        assert_eq!(ring.read_space(), 2);
        assert_spaces(&ring);

        let mut out = [0u8; 2];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn samples_round_through_bytes() {
        let mut ring = RingBuffer::new(4 * SAMPLE_BYTES);
        assert_eq!(ring.write_samples(&[0.25, -0.5, 1.0]), 3);
        assert_eq!(ring.read_space(), 3 * SAMPLE_BYTES);
        assert_eq!(ring.write_samples(&[0.1, 0.2]), 0);

        let mut out = [0.0f32; 3];
        assert_eq!(ring.read_samples(&mut out), 3);
        assert_eq!(out, [0.25, -0.5, 1.0]);
    }

    #[test]
    fn split_halves_stream_across_threads() {
        let (mut producer, mut consumer) = RingBuffer::new(64).split();
        let total = 10_000usize;

        let writer = std::thread::spawn(move || {
            let mut next = 0usize;
            while next < total {
                let byte = [(next % 251) as u8];
                if producer.write(&byte) == 1 {
                    next += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut expected = 0usize;
        let mut byte = [0u8; 1];
        while expected < total {
            if consumer.read(&mut byte) == 1 {
                assert_eq!(byte[0], (expected % 251) as u8);
                expected += 1;
            } else {
                std::thread::yield_now();
            }
        }
        writer.join().unwrap();
        assert_eq!(consumer.read_space(), 0);
    }
}
