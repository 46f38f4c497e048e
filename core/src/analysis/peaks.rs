use ndarray::ArrayView1;

use crate::analysis::calibration::SamplingRate;

/// Local maxima of `signal`, at least `min_distance_sec` apart.
pub fn detect_peaks(signal: ArrayView1<f64>, fs: SamplingRate, min_distance_sec: f64) -> Vec<usize> {
    find_peaks(signal, fs.samples_for(min_distance_sec))
}

/// Greedy left-to-right peak picking.
///
/// Index `i` is a candidate when `signal[i] > signal[i - 1]` and
/// `signal[i] >= signal[i + 1]`, so a flat top counts once, at its first
/// sample. A candidate closer than `min_distance` to the previously accepted
/// peak is dropped for good, even if it is taller; the result is not the
/// globally best set of peaks.
pub fn find_peaks(signal: ArrayView1<f64>, min_distance: usize) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::new();
    if signal.len() < 3 {
        return peaks;
    }

    for i in 1..signal.len() - 1 {
        let rising = signal[i] > signal[i - 1];
        let falling_or_flat = signal[i] >= signal[i + 1];
        if !(rising && falling_or_flat) {
            continue;
        }

        match peaks.last() {
            Some(&previous) if i - previous < min_distance => {}
            _ => peaks.push(i),
        }
    }

    peaks
}
