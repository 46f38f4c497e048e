use ndarray::{Array1, ArrayView1};
use slog::{info, warn, Logger};

#[cfg(feature = "butterworth")]
use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type};
#[cfg(feature = "butterworth")]
use ndarray::s;
#[cfg(feature = "butterworth")]
use std::f64::consts::PI;

use crate::analysis::calibration::SamplingRate;
use crate::error::{Result, VitalsError};

/// Windows shorter than this pass through unfiltered.
pub const MIN_FILTER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBackend {
    Butterworth,
    DcRemoval,
}

pub trait Filter: Send + Sync {
    /// Returns the AC component of `signal`, same length as the input.
    fn apply(&self, signal: ArrayView1<f64>) -> Array1<f64>;

    fn backend(&self) -> FilterBackend;
}

/// Backend chosen for a session, plus why it differs from the request if it does.
pub struct SelectedFilter {
    pub filter: Box<dyn Filter>,
    pub degraded_reason: Option<String>,
}

pub fn validate_passband(low_hz: f64, high_hz: f64, fs: SamplingRate) -> Result<()> {
    let nyquist = fs.hz() / 2.0;
    if low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist {
        Ok(())
    } else {
        Err(VitalsError::InvalidPassband { low_hz, high_hz, fs: fs.hz() })
    }
}

pub fn select_filter(
    requested: FilterBackend,
    low_hz: f64,
    high_hz: f64,
    order: usize,
    fs: SamplingRate,
    logger: &Logger,
) -> SelectedFilter {
    match requested {
        FilterBackend::DcRemoval => {
            info!(logger, "using DC removal filter"; "fs" => fs.hz());
            SelectedFilter {
                filter: Box::new(DcRemoval),
                degraded_reason: None,
            }
        }
        FilterBackend::Butterworth => match butterworth(low_hz, high_hz, order, fs) {
            Ok(filter) => {
                info!(logger, "using Butterworth band-pass";
                    "low_hz" => low_hz, "high_hz" => high_hz, "order" => order, "fs" => fs.hz());
                SelectedFilter {
                    filter,
                    degraded_reason: None,
                }
            }
            Err(reason) => {
                warn!(logger, "band-pass unavailable, falling back to DC removal";
                    "reason" => &reason);
                SelectedFilter {
                    filter: Box::new(DcRemoval),
                    degraded_reason: Some(reason),
                }
            }
        },
    }
}

#[cfg(feature = "butterworth")]
fn butterworth(
    low_hz: f64,
    high_hz: f64,
    order: usize,
    fs: SamplingRate,
) -> std::result::Result<Box<dyn Filter>, String> {
    ButterworthBandpass::new(low_hz, high_hz, order, fs)
        .map(|f| Box::new(f) as Box<dyn Filter>)
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "butterworth"))]
fn butterworth(
    _low_hz: f64,
    _high_hz: f64,
    _order: usize,
    _fs: SamplingRate,
) -> std::result::Result<Box<dyn Filter>, String> {
    Err("built without the butterworth feature".to_string())
}

/// Mean subtraction only. Noise above the pass band is left in place, so peak
/// timing and AC amplitude are less accurate than with the band-pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcRemoval;

impl Filter for DcRemoval {
    fn apply(&self, signal: ArrayView1<f64>) -> Array1<f64> {
        if signal.len() < MIN_FILTER_LEN {
            return signal.to_owned();
        }
        remove_mean(signal)
    }

    fn backend(&self) -> FilterBackend {
        FilterBackend::DcRemoval
    }
}

pub fn remove_mean(signal: ArrayView1<f64>) -> Array1<f64> {
    let mean = signal.mean().unwrap_or(0.0);
    signal.mapv(|a| a - mean)
}

/// Butterworth band-pass applied forward and backward, so the overall response
/// has zero phase and peaks stay where they were.
///
/// Each half (high-pass at the low cutoff, low-pass at the high cutoff) is an
/// order-N Butterworth built from second-order sections, plus one first-order
/// section when N is odd.
#[cfg(feature = "butterworth")]
#[derive(Clone)]
pub struct ButterworthBandpass {
    sections: Vec<Coefficients<f64>>,
    pad_len: usize,
}

#[cfg(feature = "butterworth")]
#[derive(Debug, Clone, Copy)]
enum Edge {
    HighPass,
    LowPass,
}

#[cfg(feature = "butterworth")]
impl ButterworthBandpass {
    pub fn new(low_hz: f64, high_hz: f64, order: usize, fs: SamplingRate) -> Result<Self> {
        validate_passband(low_hz, high_hz, fs)?;
        let order = order.max(1);

        let mut sections = butterworth_sections(Edge::HighPass, low_hz, order, fs)?;
        sections.extend(butterworth_sections(Edge::LowPass, high_hz, order, fs)?);

        // Long enough to cover one period of the lowest passed frequency.
        let pad_len = (3 * (2 * order + 1)).max((fs.hz() / low_hz).round() as usize);

        Ok(Self { sections, pad_len })
    }

    pub fn sections(&self) -> usize {
        self.sections.len()
    }
}

#[cfg(feature = "butterworth")]
impl Filter for ButterworthBandpass {
    fn apply(&self, signal: ArrayView1<f64>) -> Array1<f64> {
        let n = signal.len();
        if n < MIN_FILTER_LEN {
            return signal.to_owned();
        }

        let centered = remove_mean(signal);
        let pad = self.pad_len.min(n - 1);
        let padded = odd_extension(centered.view(), pad);
        let filtered = forward_backward_filter(padded.view(), &self.sections);

        filtered.slice(s![pad..pad + n]).to_owned()
    }

    fn backend(&self) -> FilterBackend {
        FilterBackend::Butterworth
    }
}

/// One-shot band-pass of `data`; designs the filter on every call.
#[cfg(feature = "butterworth")]
pub fn bandpass_filter(
    data: ArrayView1<f64>,
    lowcut: f64,
    highcut: f64,
    order: usize,
    fs: SamplingRate,
) -> Result<Array1<f64>> {
    Ok(ButterworthBandpass::new(lowcut, highcut, order, fs)?.apply(data))
}

#[cfg(feature = "butterworth")]
fn butterworth_sections(
    edge: Edge,
    cutoff: f64,
    order: usize,
    fs: SamplingRate,
) -> Result<Vec<Coefficients<f64>>> {
    let sample_rate = fs.hz();
    let mut sections = Vec::with_capacity(order / 2 + 1);

    for k in 0..order / 2 {
        // Angle of the k-th conjugate pole pair from the negative real axis.
        let angle = PI * (2 * k + 1 + order % 2) as f64 / (2 * order) as f64;
        let q = 1.0 / (2.0 * angle.cos());
        let filter_type = match edge {
            Edge::HighPass => Type::HighPass,
            Edge::LowPass => Type::LowPass,
        };
        let coeff = Coefficients::<f64>::from_params(filter_type, sample_rate.hz(), cutoff.hz(), q)
            .map_err(|e| VitalsError::FilterDesign(format!("{e:?}")))?;
        sections.push(coeff);
    }

    if order % 2 == 1 {
        sections.push(first_order_section(edge, cutoff, sample_rate));
    }

    Ok(sections)
}

// Bilinear transform with the cutoff prewarped, matching the biquad designer.
#[cfg(feature = "butterworth")]
fn first_order_section(edge: Edge, cutoff: f64, sample_rate: f64) -> Coefficients<f64> {
    let k = (PI * cutoff / sample_rate).tan();
    let norm = 1.0 / (1.0 + k);
    let a1 = (k - 1.0) * norm;

    match edge {
        Edge::LowPass => Coefficients {
            a1,
            a2: 0.0,
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
        },
        Edge::HighPass => Coefficients {
            a1,
            a2: 0.0,
            b0: norm,
            b1: -norm,
            b2: 0.0,
        },
    }
}

/// Reflects `pad` samples about each end point so the filter starts on a
/// continuation of the signal instead of a step.
#[cfg(feature = "butterworth")]
fn odd_extension(data: ArrayView1<f64>, pad: usize) -> Array1<f64> {
    let n = data.len();
    if n == 0 || pad == 0 {
        return data.to_owned();
    }
    let pad = pad.min(n - 1);
    let first = data[0];
    let last = data[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    extended.extend(data.iter().copied());
    extended.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));

    Array1::from(extended)
}

#[cfg(feature = "butterworth")]
fn forward_filter(data: ArrayView1<f64>, sections: &[Coefficients<f64>]) -> Array1<f64> {
    let mut filters: Vec<DirectForm1<f64>> =
        sections.iter().map(|c| DirectForm1::<f64>::new(*c)).collect();

    data.iter()
        .map(|&sample| {
            filters
                .iter_mut()
                .fold(sample, |acc, filter| filter.run(acc))
        })
        .collect()
}

#[cfg(feature = "butterworth")]
fn backward_filter(data: ArrayView1<f64>, sections: &[Coefficients<f64>]) -> Array1<f64> {
    let reversed: Array1<f64> = data.iter().rev().copied().collect();
    let processed = forward_filter(reversed.view(), sections);

    // Re-reverse the data to restore original order
    processed.iter().rev().copied().collect()
}

#[cfg(feature = "butterworth")]
fn forward_backward_filter(data: ArrayView1<f64>, sections: &[Coefficients<f64>]) -> Array1<f64> {
    let forward = forward_filter(data, sections);
    backward_filter(forward.view(), sections)
}
