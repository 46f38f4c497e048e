use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulsecore::log::silent_logger;
use pulsecore::mock::MockPpg;
use pulsecore::monitor::{
    run_monitor, run_split_monitor, Phase, Reading, ReportPolicy, Session, SessionConfig,
    VitalsDelegate,
};
use pulsecore::status::{Assessment, HealthStatus};
use pulsecore::{FilterBackend, SamplingRate};
use tokio::sync::RwLock;

#[derive(Default)]
struct Recorder {
    readings: Mutex<Vec<Reading>>,
    statuses: Mutex<Vec<Assessment>>,
    degraded: Mutex<Vec<String>>,
}

impl VitalsDelegate for Recorder {
    fn new_reading(&self, reading: Reading) {
        self.readings.lock().unwrap().push(reading);
    }

    fn status_changed(&self, assessment: Assessment) {
        self.statuses.lock().unwrap().push(assessment);
    }

    fn filter_degraded(&self, reason: String) {
        self.degraded.lock().unwrap().push(reason);
    }
}

#[tokio::test(start_paused = true)]
async fn sequential_loop_calibrates_then_reports() {
    let mock = MockPpg::default();
    let config = SessionConfig {
        estimate_every: 25,
        ..SessionConfig::default()
    };
    let session = Session::new(config, silent_logger());
    let recorder = Arc::new(Recorder::default());

    // 60 calibration samples, then 8 s of pulse.
    let session = run_monitor(
        mock.clone().stream(60 + 400),
        session,
        ReportPolicy::default(),
        recorder.clone(),
        silent_logger(),
    )
    .await;

    assert_eq!(session.phase(), Phase::Estimating);
    assert_eq!(session.sampling_rate(), Some(SamplingRate::new(50.0).unwrap()));

    let readings = recorder.readings.lock().unwrap();
    // First estimate after 3 s of history, then every 25 samples.
    assert_eq!(readings.len(), 11);
    assert!(readings.iter().all(|r| r.session == session.id()));

    let last = readings.last().unwrap();
    assert!((last.estimate.bpm - 72.0).abs() <= 2.0, "bpm {}", last.estimate.bpm);
    assert!((last.estimate.spo2 - 95.0).abs() <= 2.0, "spo2 {}", last.estimate.spo2);
    assert_eq!(last.displayed, Some(last.estimate));
    assert_eq!(last.assessment.status, HealthStatus::Normal);

    let statuses = recorder.statuses.lock().unwrap();
    assert_eq!(statuses.last().map(|a| a.status), Some(HealthStatus::Normal));
    #[cfg(feature = "butterworth")]
    assert!(recorder.degraded.lock().unwrap().is_empty());
    #[cfg(not(feature = "butterworth"))]
    assert_eq!(recorder.degraded.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tachycardia_is_flagged() {
    let mock = MockPpg {
        heart_rate_bpm: 130.0,
        ..MockPpg::default()
    };
    let session = Session::with_sampling_rate(
        SessionConfig {
            estimate_every: 50,
            ..SessionConfig::default()
        },
        SamplingRate::new(50.0).unwrap(),
        silent_logger(),
    );
    let recorder = Arc::new(Recorder::default());

    run_monitor(
        mock.stream(400),
        session,
        ReportPolicy::default(),
        recorder.clone(),
        silent_logger(),
    )
    .await;

    let readings = recorder.readings.lock().unwrap();
    let last = readings.last().unwrap();
    assert!((last.estimate.bpm - 130.0).abs() <= 3.0, "bpm {}", last.estimate.bpm);
    assert_eq!(last.assessment.reason, "High HR");
}

#[tokio::test(start_paused = true)]
async fn fallback_filter_is_announced_once() {
    let session = Session::with_sampling_rate(
        SessionConfig {
            estimate_every: 25,
            filter_backend: FilterBackend::Butterworth,
            parameters: pulsecore::Parameters {
                // Above Nyquist at 50 Hz.
                filter_cutoff_high: 30.0,
                ..pulsecore::Parameters::default()
            },
            ..SessionConfig::default()
        },
        SamplingRate::new(50.0).unwrap(),
        silent_logger(),
    );
    let recorder = Arc::new(Recorder::default());

    // Without the band-pass, sample noise near the troughs would read as beats.
    let mock = MockPpg {
        noise: 0.0,
        ..MockPpg::default()
    };
    run_monitor(
        mock.stream(300),
        session,
        ReportPolicy::default(),
        recorder.clone(),
        silent_logger(),
    )
    .await;

    assert_eq!(recorder.degraded.lock().unwrap().len(), 1);
    let readings = recorder.readings.lock().unwrap();
    assert!(!readings.is_empty());
    let last = readings.last().unwrap();
    assert!((last.estimate.bpm - 72.0).abs() <= 10.0, "bpm {}", last.estimate.bpm);
}

#[tokio::test(start_paused = true)]
async fn split_loop_estimates_from_snapshots() {
    let session = Arc::new(RwLock::new(Session::new(
        SessionConfig::default(),
        silent_logger(),
    )));
    let recorder = Arc::new(Recorder::default());

    run_split_monitor(
        MockPpg::default().stream(60 + 400),
        session.clone(),
        Duration::from_millis(500),
        ReportPolicy::default(),
        recorder.clone(),
        silent_logger(),
    )
    .await;

    let session = session.read().await;
    assert_eq!(session.phase(), Phase::Estimating);
    assert_eq!(session.snapshot().map(|s| s.len()), Some(400));

    let readings = recorder.readings.lock().unwrap();
    assert!(!readings.is_empty());
    let last = readings.last().unwrap();
    assert!((last.estimate.bpm - 72.0).abs() <= 2.0, "bpm {}", last.estimate.bpm);
    assert_eq!(last.assessment.status, HealthStatus::Normal);
}
