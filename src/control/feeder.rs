use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use dasp_signal::Signal;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::BridgeError;
use crate::backend::Backend;
use crate::control::api::SharedSession;
use crate::group::GroupId;
use crate::notify::NotifyReceiver;
use crate::port::PortDirection;
use crate::session::Session;

/// Longest a feeder thread sleeps between refills. Input-only groups never ask
/// for data, so their capture rings are drained on this interval.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Keeps groups supplied with a sine tone from consumer-side threads.
///
/// Each attached group gets a thread that sleeps on the group's need-data
/// receiver, or at most [`DRAIN_INTERVAL`]. On every wake-up it drains the input
/// rings and tops up the output rings, with the tone when enabled and silence
/// otherwise. The thread ends when the session goes away.
pub struct ToneFeeder {
    frequency_hz: f64,
    amplitude: f32,
    enabled: HashMap<GroupId, Arc<AtomicBool>>,
}

impl ToneFeeder {
    /// Feeder producing a `frequency_hz` sine scaled by `amplitude`.
    pub fn new(frequency_hz: f64, amplitude: f32) -> Self {
        Self {
            frequency_hz,
            amplitude,
            enabled: HashMap::new(),
        }
    }

    /// Tone frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Start feeding `group`, consuming its need-data receiver.
    pub fn attach<B>(
        &mut self,
        session: &SharedSession<B>,
        group: GroupId,
        receiver: NotifyReceiver,
        enabled: bool,
    ) -> io::Result<()>
    where
        B: Backend + Send + 'static,
    {
        let sample_rate = session.lock().sample_rate().max(1) as f64;
        let tone = dasp_signal::rate(sample_rate)
            .const_hz(self.frequency_hz)
            .sine();
        let flag = Arc::new(AtomicBool::new(enabled));
        let weak = Arc::downgrade(session);
        let amplitude = self.amplitude;
        let worker_flag = Arc::clone(&flag);
        thread::Builder::new()
            .name(format!("jackmux-feed-{group}"))
            .spawn(move || feed_loop(weak, group, receiver, worker_flag, tone, amplitude))?;
        info!(group = %group, frequency_hz = self.frequency_hz, enabled, "feeder attached");
        self.enabled.insert(group, flag);
        Ok(())
    }

    /// Whether `group` currently gets the tone; `None` if it is not attached.
    pub fn is_enabled(&self, group: GroupId) -> Option<bool> {
        self.enabled
            .get(&group)
            .map(|flag| flag.load(Ordering::Relaxed))
    }

    /// Switch the tone on or off for `group`. Returns `false` if not attached.
    pub fn set_enabled(&self, group: GroupId, enabled: bool) -> bool {
        match self.enabled.get(&group) {
            Some(flag) => {
                flag.store(enabled, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Flip the tone for `group` and return the new state.
    pub fn toggle(&self, group: GroupId) -> Option<bool> {
        self.enabled
            .get(&group)
            .map(|flag| !flag.fetch_xor(true, Ordering::Relaxed))
    }
}

fn feed_loop<B, S>(
    session: Weak<Mutex<Session<B>>>,
    group: GroupId,
    mut receiver: NotifyReceiver,
    enabled: Arc<AtomicBool>,
    mut tone: S,
    amplitude: f32,
) where
    B: Backend,
    S: Signal<Frame = f64>,
{
    loop {
        match receiver.wait_timeout(DRAIN_INTERVAL) {
            Ok(Some(0)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(group = %group, "feeder wait failed: {err}");
                break;
            }
        }
        let Some(shared) = session.upgrade() else {
            break;
        };
        let mut guard = shared.lock();
        let on = enabled.load(Ordering::Relaxed);
        let result = refill(&mut guard, group, || {
            if on {
                tone.next() as f32 * amplitude
            } else {
                0.0
            }
        });
        if let Err(err) = result {
            warn!(group = %group, "feeder stopped: {err}");
            break;
        }
    }
    debug!(group = %group, "feeder exited");
}

/// Drain every pending input frame of `group`, then fill its output rings,
/// taking one value from `next_sample` per output frame.
///
/// Returns the number of output frames written.
pub fn refill<B: Backend>(
    session: &mut Session<B>,
    group: GroupId,
    mut next_sample: impl FnMut() -> f32,
) -> Result<usize, BridgeError> {
    let (inputs, outputs) = session
        .group(group)
        .map(|g| {
            (
                g.port_count(PortDirection::Input),
                g.port_count(PortDirection::Output),
            )
        })
        .ok_or(BridgeError::UnknownGroup(group))?;

    let mut frame = vec![0.0f32; inputs.max(outputs)];
    for _ in 0..session.pending_input(group)? {
        session.read_into(group, &mut frame)?;
    }

    let room = session.output_room(group)?;
    for _ in 0..room {
        frame[..outputs].fill(next_sample());
        session.write(group, &frame[..outputs])?;
    }
    Ok(room)
}
