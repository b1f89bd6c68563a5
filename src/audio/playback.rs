//! Gapless playback scheduling and audio output.
//!
//! Fragments arrive as discrete network messages at irregular intervals but
//! must play back-to-back. [`PlaybackQueue`] tracks a cumulative start-time
//! cursor and the set of in-flight buffers; it is pure state so the timing
//! invariant is testable without audio hardware. [`AudioPlayer`] renders
//! samples through rodio on a dedicated thread (the rodio output stream is
//! not `Send`).

use std::collections::HashSet;
use std::sync::mpsc as std_mpsc;
use std::time::Instant;

use anyhow::anyhow;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tracing::debug;

/// Monotonic clock used as the output timebase, in seconds.
pub trait OutputClock: Send {
    fn now(&self) -> f64;
}

/// Real clock anchored at session creation.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// A buffer that has been assigned a start time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: u64,
    pub start: f64,
    pub duration: f64,
}

/// Scheduling cursor plus the set of currently playing buffers.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    next_start: f64,
    active: HashSet<u64>,
    next_id: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a start time to a new fragment: no earlier than the end of the
    /// previous one, no earlier than now. Advances the cursor by `duration`.
    pub fn schedule(&mut self, duration: f64, now: f64) -> ScheduledBuffer {
        let start = self.next_start.max(now);
        self.next_start = start + duration;
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id);
        ScheduledBuffer {
            id,
            start,
            duration,
        }
    }

    /// Remove a finished buffer. Returns `true` when the active set just
    /// became empty (all scheduled output has played out).
    pub fn finish(&mut self, id: u64) -> bool {
        self.active.remove(&id) && self.active.is_empty()
    }

    /// Barge-in: drop every in-flight buffer and reset the cursor to the
    /// current clock. Returns how many buffers were stopped.
    pub fn interrupt(&mut self, now: f64) -> usize {
        let stopped = self.active.len();
        self.active.clear();
        self.next_start = now;
        stopped
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }
}

enum PlayerCmd {
    Append(Vec<f32>, u32),
    Stop,
    Shutdown,
}

/// Audio output through the default device. Appends are non-blocking; the
/// sink plays queued fragments back-to-back.
pub struct AudioPlayer {
    tx: std_mpsc::Sender<PlayerCmd>,
}

impl AudioPlayer {
    /// Open the default output device at the given volume.
    pub fn open(volume: f32) -> anyhow::Result<Self> {
        let (tx, rx) = std_mpsc::channel::<PlayerCmd>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();

        std::thread::spawn(move || {
            let opened = OutputStream::try_default()
                .map_err(|e| anyhow!("failed to open audio output: {e}"))
                .and_then(|(stream, handle)| {
                    Sink::try_new(&handle)
                        .map(|sink| (stream, sink))
                        .map_err(|e| anyhow!("failed to create audio sink: {e}"))
                });

            let (_stream, sink) = match opened {
                Ok(pair) => {
                    let _ = ready_tx.send(Ok(()));
                    pair
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            sink.set_volume(volume.clamp(0.0, 1.0));
            while let Ok(cmd) = rx.recv() {
                match cmd {
                    PlayerCmd::Append(samples, sample_rate) => {
                        sink.append(SamplesBuffer::new(1, sample_rate, samples));
                    }
                    PlayerCmd::Stop => sink.stop(),
                    PlayerCmd::Shutdown => break,
                }
            }
            debug!("Audio output released");
        });

        ready_rx
            .recv()
            .map_err(|_| anyhow!("playback thread exited before reporting readiness"))??;
        Ok(Self { tx })
    }

    /// Queue mono f32 samples for playback. Non-blocking.
    pub fn append(&self, samples: Vec<f32>, sample_rate: u32) {
        let _ = self.tx.send(PlayerCmd::Append(samples, sample_rate));
    }

    /// Stop everything currently queued or playing.
    pub fn stop(&self) {
        let _ = self.tx.send(PlayerCmd::Stop);
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        let _ = self.tx.send(PlayerCmd::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_schedule_back_to_back() {
        let mut q = PlaybackQueue::new();
        let a = q.schedule(0.5, 1.0);
        let b = q.schedule(0.25, 1.0);
        let c = q.schedule(0.1, 1.0);
        assert_eq!(a.start, 1.0);
        assert_eq!(b.start, 1.5);
        assert_eq!(c.start, 1.75);
        // No overlap, no gap: start(i+1) == start(i) + d(i).
        assert!(b.start >= a.start + a.duration);
        assert!(c.start >= b.start + b.duration);
    }

    #[test]
    fn test_late_fragment_starts_at_clock() {
        let mut q = PlaybackQueue::new();
        let a = q.schedule(0.2, 1.0);
        assert_eq!(a.start, 1.0);
        // Playback drained and the clock moved past the cursor; the next
        // fragment starts immediately, not at the stale cursor.
        let b = q.schedule(0.2, 5.0);
        assert_eq!(b.start, 5.0);
    }

    #[test]
    fn test_finish_reports_drained_set() {
        let mut q = PlaybackQueue::new();
        let a = q.schedule(0.1, 0.0);
        let b = q.schedule(0.1, 0.0);
        assert!(!q.finish(a.id));
        assert!(q.finish(b.id));
        assert!(q.is_idle());
        // Finishing an unknown id never reports a drain.
        assert!(!q.finish(99));
    }

    #[test]
    fn test_interrupt_clears_and_resets_cursor() {
        let mut q = PlaybackQueue::new();
        q.schedule(1.0, 0.0);
        q.schedule(1.0, 0.0);
        assert_eq!(q.interrupt(0.3), 2);
        assert!(q.is_idle());
        // Cursor is back at the clock, so the next fragment starts now.
        let next = q.schedule(0.5, 0.3);
        assert_eq!(next.start, 0.3);
    }
}
