//! Lock-free sample transport
//!
//! Bridges a real-time capture callback and the processing loop. The
//! capture side must never block, so samples cross threads through a
//! fixed-capacity SPSC ring buffer; overruns are reported back to the
//! caller instead of waited out.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use crate::domain::Sample;

/// Producer half, owned by the capture thread
pub struct SampleWriter {
    producer: HeapProd<Sample>,
}

/// Consumer half, owned by the processing thread
pub struct SampleReader {
    consumer: HeapCons<Sample>,
}

/// Create a bridge with room for `capacity` samples in flight
pub fn sample_feed(capacity: usize) -> (SampleWriter, SampleReader) {
    let rb = HeapRb::<Sample>::new(capacity);
    let (producer, consumer) = rb.split();
    (SampleWriter { producer }, SampleReader { consumer })
}

impl SampleWriter {
    /// Push captured samples, returning how many were accepted.
    ///
    /// A full buffer drops the tail of the slice; the capture side decides
    /// whether to log or count the overrun.
    pub fn push(&mut self, samples: &[Sample]) -> usize {
        self.producer.push_slice(samples)
    }
}

impl SampleReader {
    /// Pop a single sample, if one is in flight
    pub fn pop(&mut self) -> Option<Sample> {
        self.consumer.try_pop()
    }

    /// Drain everything currently in flight
    pub fn drain(&mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Some(sample) = self.consumer.try_pop() {
            samples.push(sample);
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp_s: f64) -> Sample {
        Sample {
            timestamp_s,
            voltage: [1.0, 2.0, 3.0],
            current: [0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn samples_cross_the_feed_in_order() {
        let (mut writer, mut reader) = sample_feed(16);

        let batch: Vec<Sample> = (0..10).map(|i| sample(i as f64)).collect();
        assert_eq!(writer.push(&batch), 10);

        let drained = reader.drain();
        assert_eq!(drained.len(), 10);
        for (i, s) in drained.iter().enumerate() {
            assert_eq!(s.timestamp_s, i as f64);
        }
    }

    #[test]
    fn overrun_drops_the_tail() {
        let (mut writer, mut reader) = sample_feed(4);

        let batch: Vec<Sample> = (0..10).map(|i| sample(i as f64)).collect();
        assert_eq!(writer.push(&batch), 4);
        assert_eq!(reader.drain().len(), 4);

        // Space freed by the drain is usable again
        assert_eq!(writer.push(&batch[4..]), 4);
    }

    #[test]
    fn feed_works_across_threads() {
        let (mut writer, mut reader) = sample_feed(1024);

        let producer = std::thread::spawn(move || {
            for i in 0..512 {
                while writer.push(&[sample(i as f64)]) == 0 {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = 0;
        while received < 512 {
            if reader.pop().is_some() {
                received += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert_eq!(received, 512);
    }
}
