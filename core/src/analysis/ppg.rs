use ndarray::{Array1, ArrayView1};
use ndarray_stats::interpolate::Higher;
use ndarray_stats::Quantile1dExt;
use noisy_float::types::{n64, N64};
use slog::{debug, Logger};

use crate::analysis::calibration::SamplingRate;
use crate::analysis::filter::Filter;
use crate::analysis::peaks::detect_peaks;
use crate::error::{Result, VitalsError};
use crate::storage::WindowSnapshot;
use crate::VitalEstimate;

/// Below this RMS the infrared channel carries no usable pulse.
const MIN_AC: f64 = 1e-9;

#[derive(Debug, PartialEq, Clone)]
pub struct Parameters {
    pub filter_cutoff_low: f64,
    pub filter_cutoff_high: f64,
    pub filter_order: usize,
    /// Refractory distance between accepted beats, in seconds.
    pub min_peak_distance: f64,
    /// History required before anything is estimated, in seconds.
    pub min_window_seconds: f64,
    /// SpO2 calibration line: `spo2 = spo2_intercept - spo2_slope * R`.
    pub spo2_intercept: f64,
    pub spo2_slope: f64,
    /// Computed SpO2 is clamped into this range.
    pub spo2_range: (f64, f64),
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            filter_cutoff_low: 0.7,
            filter_cutoff_high: 4.0,
            filter_order: 3,
            min_peak_distance: 0.35,
            min_window_seconds: 3.0,
            spo2_intercept: 110.0,
            spo2_slope: 25.0,
            spo2_range: (50.0, 100.0),
        }
    }
}

/// Intermediate values of one estimation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseAnalysis {
    pub peaks: Vec<usize>,
    pub ac_infrared: f64,
    pub dc_infrared: f64,
    pub ac_red: f64,
    pub dc_red: f64,
    /// Ratio of ratios, `None` when a denominator vanished.
    pub ratio: Option<f64>,
    pub estimate: VitalEstimate,
}

/// Stateless apart from its configuration: the same windows always give the
/// same estimate.
pub struct VitalEstimator {
    params: Parameters,
    fs: SamplingRate,
    filter: Box<dyn Filter>,
    logger: Logger,
}

impl VitalEstimator {
    pub fn new(params: Parameters, fs: SamplingRate, filter: Box<dyn Filter>, logger: Logger) -> Self {
        Self {
            params,
            fs,
            filter,
            logger,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn sampling_rate(&self) -> SamplingRate {
        self.fs
    }

    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    /// Samples each channel needs before `estimate` produces numbers.
    pub fn min_samples(&self) -> usize {
        self.fs.samples_at_least(self.params.min_window_seconds).max(1)
    }

    /// Heart rate and SpO2 from the raw channel windows.
    ///
    /// Windows of different length are cut to their common most-recent part;
    /// use [`Self::estimate_checked`] to reject them instead.
    pub fn estimate(&self, infrared: &[u32], red: &[u32]) -> VitalEstimate {
        match self.analyze(infrared, red) {
            Some(analysis) => analysis.estimate,
            None => VitalEstimate::insufficient(),
        }
    }

    pub fn estimate_checked(&self, infrared: &[u32], red: &[u32]) -> Result<VitalEstimate> {
        if infrared.len() != red.len() {
            return Err(VitalsError::WindowMismatch {
                red: red.len(),
                infrared: infrared.len(),
            });
        }
        Ok(self.estimate(infrared, red))
    }

    pub fn estimate_snapshot(&self, snapshot: &WindowSnapshot) -> VitalEstimate {
        self.estimate(&snapshot.infrared, &snapshot.red)
    }

    /// Full breakdown of an estimation pass, `None` on insufficient history.
    pub fn analyze(&self, infrared: &[u32], red: &[u32]) -> Option<PulseAnalysis> {
        let n = infrared.len().min(red.len());
        if n < self.min_samples() {
            debug!(self.logger, "insufficient history"; "samples" => n, "required" => self.min_samples());
            return None;
        }

        let ir_raw = to_signal(&infrared[infrared.len() - n..]);
        let red_raw = to_signal(&red[red.len() - n..]);

        let ir_filtered = self.filter.apply(ir_raw.view());
        let red_filtered = self.filter.apply(red_raw.view());

        let peaks = detect_peaks(ir_filtered.view(), self.fs, self.params.min_peak_distance);
        let bpm = self.heart_rate(&peaks);

        let ac_infrared = rms(ir_filtered.view());
        let ac_red = rms(red_filtered.view());
        let dc_infrared = ir_raw.mean().unwrap_or(0.0);
        let dc_red = red_raw.mean().unwrap_or(0.0);

        let ratio = ratio_of_ratios(ac_red, dc_red, ac_infrared, dc_infrared);
        let spo2 = match ratio {
            Some(r) => self.spo2_from_ratio(r),
            None => {
                debug!(self.logger, "AC/DC ratio unavailable";
                    "ac_infrared" => ac_infrared, "dc_infrared" => dc_infrared, "dc_red" => dc_red);
                0.0
            }
        };

        Some(PulseAnalysis {
            peaks,
            ac_infrared,
            dc_infrared,
            ac_red,
            dc_red,
            ratio,
            estimate: VitalEstimate {
                bpm,
                spo2,
                quality: 1.0,
            },
        })
    }

    /// `60 / median beat interval`, or 0 with fewer than two peaks.
    ///
    /// Peaks land on whole samples, so the median interval is off by up to one
    /// sample and the rate by up to `60 * fs / (period - 1)`. At 50 Hz a
    /// 140 BPM pulse reads 136.4 and a 100 BPM pulse over 3 s reads 96.8.
    fn heart_rate(&self, peaks: &[usize]) -> f64 {
        let intervals: Vec<f64> = peaks
            .windows(2)
            .map(|w| self.fs.seconds_for(w[1] - w[0]))
            .collect();

        match median(intervals) {
            Some(interval) if interval > 0.0 => 60.0 / interval,
            _ => 0.0,
        }
    }

    pub fn spo2_from_ratio(&self, ratio: f64) -> f64 {
        let (low, high) = self.params.spo2_range;
        (self.params.spo2_intercept - self.params.spo2_slope * ratio).clamp(low, high)
    }
}

/// `(AC_red / DC_red) / (AC_ir / DC_ir)`.
pub fn ratio_of_ratios(ac_red: f64, dc_red: f64, ac_infrared: f64, dc_infrared: f64) -> Option<f64> {
    if ac_infrared <= MIN_AC || dc_infrared <= 0.0 || dc_red <= 0.0 {
        return None;
    }
    let ratio = (ac_red / dc_red) / (ac_infrared / dc_infrared);
    ratio.is_finite().then_some(ratio)
}

/// Median, taking the upper middle element for even lengths.
pub fn median(values: Vec<f64>) -> Option<f64> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mut data: Array1<N64> = values.into_iter().map(n64).collect();
    data.quantile_mut(n64(0.5), &Higher).ok().map(|m| m.raw())
}

/// Root mean square around the signal's own mean.
pub fn rms(signal: ArrayView1<f64>) -> f64 {
    match signal.mean() {
        Some(mean) => signal.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.0).sqrt(),
        None => 0.0,
    }
}

fn to_signal(raw: &[u32]) -> Array1<f64> {
    raw.iter().map(|&v| f64::from(v)).collect()
}
