//! Lock-free SPSC ring buffer between the capture callback and the session.
//!
//! The cpal input callback runs on a dedicated audio thread and must never
//! block; it pushes f32 samples into the producer half and the frame pump
//! drains the consumer half from the async side.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~10 seconds of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 160_000;

/// Producer half, owned by the capture callback.
pub struct FrameProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, owned by the frame pump task.
pub struct FrameConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn frame_ring_buffer(capacity: Option<usize>) -> (FrameProducer, FrameConsumer) {
    let rb = HeapRb::<f32>::new(capacity.unwrap_or(DEFAULT_CAPACITY));
    let (prod, cons) = rb.split();
    (FrameProducer { inner: prod }, FrameConsumer { inner: cons })
}

impl FrameProducer {
    /// Push samples, returning how many were actually written. A full
    /// buffer silently drops the excess; the pump will catch up.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl FrameConsumer {
    /// Pop up to `buf.len()` samples, returning how many were read.
    pub fn pop_slice(&mut self, buf: &mut [f32]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Samples currently buffered.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_preserves_order() {
        let (mut prod, mut cons) = frame_ring_buffer(Some(8));
        assert_eq!(prod.push_slice(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(cons.available(), 3);

        let mut buf = [0.0f32; 2];
        assert_eq!(cons.pop_slice(&mut buf), 2);
        assert_eq!(buf, [1.0, 2.0]);
        assert_eq!(cons.available(), 1);
    }

    #[test]
    fn test_full_buffer_drops_excess() {
        let (mut prod, mut cons) = frame_ring_buffer(Some(4));
        let written = prod.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(written, 4);

        let mut buf = [0.0f32; 6];
        assert_eq!(cons.pop_slice(&mut buf), 4);
        assert_eq!(&buf[..4], &[1.0, 2.0, 3.0, 4.0]);
    }
}
