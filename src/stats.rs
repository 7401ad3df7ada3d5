//! Drop, underrun and signal counters.
//!
//! The process step only ever does relaxed increments here; snapshots are taken
//! from the consumer side for status reporting.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

static CLOCK_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic timestamp in nanoseconds since the first call in this process.
pub fn monotonic_timestamp_ns() -> u64 {
    let elapsed = CLOCK_ORIGIN.elapsed();
    elapsed.as_secs() * 1_000_000_000 + elapsed.subsec_nanos() as u64
}

/// Live counters for one group.
#[derive(Debug, Default)]
pub struct GroupStats {
    blocks: AtomicU64,
    need_data_signals: AtomicU64,
    coalesced_signals: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    dropped_writes: AtomicU64,
    silent_reads: AtomicU64,
    last_need_data_ns: AtomicU64,
}

impl GroupStats {
    pub(crate) fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_need_data(&self, delivered: bool) {
        if delivered {
            self.need_data_signals.fetch_add(1, Ordering::Relaxed);
        } else {
            self.coalesced_signals.fetch_add(1, Ordering::Relaxed);
        }
        self.last_need_data_ns
            .store(monotonic_timestamp_ns(), Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_write(&self) {
        self.dropped_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_silent_read(&self) {
        self.silent_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> GroupCounters {
        GroupCounters {
            blocks: self.blocks.load(Ordering::Relaxed),
            need_data_signals: self.need_data_signals.load(Ordering::Relaxed),
            coalesced_signals: self.coalesced_signals.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
            silent_reads: self.silent_reads.load(Ordering::Relaxed),
            last_need_data_ns: self.last_need_data_ns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GroupStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupCounters {
    /// Process steps that visited the group.
    pub blocks: u64,
    /// Wake-up bytes delivered to the consumer.
    pub need_data_signals: u64,
    /// Wake-ups abandoned because the pipe was full.
    pub coalesced_signals: u64,
    /// Output-port blocks skipped for lack of ring data.
    pub underruns: u64,
    /// Input-port blocks dropped for lack of ring space.
    pub overruns: u64,
    /// Consumer samples dropped because an output ring was full.
    pub dropped_writes: u64,
    /// Consumer reads answered with silence.
    pub silent_reads: u64,
    /// [`monotonic_timestamp_ns`] of the last need-data condition, `0` if never.
    pub last_need_data_ns: u64,
}

/// Live counters for one MIDI channel.
#[derive(Debug, Default)]
pub struct MidiStats {
    events: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

impl MidiStats {
    pub(crate) fn record_forwarded(&self, bytes: usize) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MidiCounters {
        MidiCounters {
            events: self.events.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`MidiStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MidiCounters {
    /// Events written to the pipe.
    pub events: u64,
    /// Payload bytes written to the pipe.
    pub bytes: u64,
    /// Events lost to a full pipe or too long for one atomic write.
    pub dropped: u64,
}
