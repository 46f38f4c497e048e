use std::f64::consts::PI;
use std::time::Duration;

use futures::Stream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::{Sample, SAMPLE_MASK};

#[derive(Debug, Clone, PartialEq)]
pub struct MockPpg {
    /// Rate the waveform is generated for, in Hz.
    pub fs: f64,
    pub heart_rate_bpm: f64,
    /// Ratio of ratios the red channel is shaped to produce.
    pub ratio: f64,
    pub ir_dc: f64,
    pub ir_amplitude: f64,
    pub red_dc: f64,
    /// Peak uniform noise added to both channels, in raw counts.
    pub noise: f64,
    pub seed: u64,
}

impl Default for MockPpg {
    fn default() -> Self {
        Self {
            fs: 50.0,
            heart_rate_bpm: 72.0,
            ratio: 0.6,
            ir_dc: 50_000.0,
            ir_amplitude: 1_000.0,
            red_dc: 30_000.0,
            noise: 10.0,
            seed: 7,
        }
    }
}

impl MockPpg {
    /// Red amplitude giving `(AC_red / DC_red) / (AC_ir / DC_ir) == ratio`.
    pub fn red_amplitude(&self) -> f64 {
        self.ratio * self.ir_amplitude * self.red_dc / self.ir_dc
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fs)
    }

    fn sample_at(&self, index: u64, rng: &mut StdRng) -> Sample {
        let t = index as f64 / self.fs;
        let phase = (2.0 * PI * self.heart_rate_bpm / 60.0 * t).sin();

        let mut jitter = || {
            if self.noise > 0.0 {
                rng.gen_range(-self.noise..=self.noise)
            } else {
                0.0
            }
        };
        let infrared = self.ir_dc + self.ir_amplitude * phase + jitter();
        let red = self.red_dc + self.red_amplitude() * phase + jitter();

        Sample::new(to_raw(red), to_raw(infrared))
    }

    /// First `count` samples of the waveform.
    pub fn samples(&self, count: usize) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..count as u64).map(|i| self.sample_at(i, &mut rng)).collect()
    }

    /// Delivers `count` samples, one per sampling period. Must be called
    /// inside a tokio runtime.
    pub fn stream(self, count: usize) -> impl Stream<Item = Sample> + Send + Unpin + 'static {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut index = 0u64;
        let ticks = IntervalStream::new(tokio::time::interval(self.period()));

        ticks.take(count).map(move |_| {
            let sample = self.sample_at(index, &mut rng);
            index += 1;
            sample
        })
    }
}

fn to_raw(value: f64) -> u32 {
    value.round().clamp(0.0, SAMPLE_MASK as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_reproducible() {
        let mock = MockPpg::default();
        assert_eq!(mock.samples(100), mock.samples(100));
    }

    #[test]
    fn samples_stay_in_18_bit_range() {
        let mock = MockPpg {
            ir_dc: 261_000.0,
            ir_amplitude: 5_000.0,
            red_dc: 2_000.0,
            ratio: 5.0,
            ..MockPpg::default()
        };
        for sample in mock.samples(500) {
            assert!(sample.infrared <= SAMPLE_MASK);
            assert!(sample.red <= SAMPLE_MASK);
        }
    }

    #[test]
    fn red_amplitude_matches_ratio() {
        let mock = MockPpg::default();
        // 0.6 * 1000 * 30000 / 50000
        assert!((mock.red_amplitude() - 360.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_yields_requested_count() {
        let samples: Vec<Sample> = MockPpg::default().stream(30).collect().await;
        assert_eq!(samples, MockPpg::default().samples(30));
    }
}
