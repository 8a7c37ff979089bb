//! The single-producer/single-consumer float FIFO between the device
//! callback and the graph's input bus.
//!
//! Built on `ringbuf`'s heap-allocated SPSC ring, the same crate the
//! render-thread message channel elsewhere in this workspace is built on.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

/// Splits into a [`RingBufferProducer`]/[`RingBufferConsumer`] pair sized
/// for `capacity` `f32` samples.
pub fn ring_buffer(capacity: usize) -> (RingBufferProducer, RingBufferConsumer) {
    let (prod, cons) = HeapRb::<f32>::new(capacity).split();
    (RingBufferProducer(prod), RingBufferConsumer(cons))
}

pub struct RingBufferProducer(HeapProd<f32>);

impl RingBufferProducer {
    #[inline]
    pub fn available_for_writing(&self) -> usize {
        self.0.vacant_len()
    }

    /// Push as many samples as fit, discarding the tail of `samples` that
    /// does not fit (an overrun). Returns the number of samples actually
    /// pushed; the caller is expected to log a warning when this is less
    /// than `samples.len()`.
    pub fn push_slice_lossy(&mut self, samples: &[f32]) -> usize {
        self.0.push_slice(samples)
    }
}

pub struct RingBufferConsumer(HeapCons<f32>);

impl RingBufferConsumer {
    #[inline]
    pub fn available_for_reading(&self) -> usize {
        self.0.occupied_len()
    }

    /// Pop up to `out.len()` samples into `out`. Returns the number of
    /// samples actually popped; on underrun the caller is expected to pad
    /// the remainder with zeros.
    pub fn pop_slice(&mut self, out: &mut [f32]) -> usize {
        self.0.pop_slice(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraparound_yields_last_capacity_samples_in_order() {
        let capacity = 8;
        let (mut prod, mut cons) = ring_buffer(capacity);

        let pushed: Vec<f32> = (0..capacity as i32 + 3).map(|i| i as f32).collect();
        let _ = prod.push_slice_lossy(&pushed);

        let mut out = vec![0.0; capacity];
        let popped = cons.pop_slice(&mut out);
        assert_eq!(popped, capacity);
        let expected: Vec<f32> = (3..capacity as i32 + 3).map(|i| i as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn underrun_reports_fewer_samples_popped() {
        let (mut prod, mut cons) = ring_buffer(8);
        let _ = prod.push_slice_lossy(&[1.0, 2.0, 3.0]);

        let mut out = [0.0f32; 8];
        let popped = cons.pop_slice(&mut out);
        assert_eq!(popped, 3);
    }
}
