use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use slog::{debug, info, o, warn, Logger};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::analysis::calibration::{SampleRateCalibrator, SamplingRate};
use crate::analysis::filter::{select_filter, FilterBackend};
use crate::analysis::ppg::{Parameters, VitalEstimator};
use crate::error::{Result, VitalsError};
use crate::status::{classify, Assessment, PlausibilityGate, StatusThresholds};
use crate::storage::{SampleWindow, WindowSnapshot};
use crate::{Sample, VitalEstimate};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Seconds of history kept for estimation.
    pub window_seconds: f64,
    /// Samples timed to measure the sampling rate.
    pub calibration_samples: usize,
    /// Pushes between two estimates in [`Session::ingest`].
    pub estimate_every: usize,
    pub parameters: Parameters,
    pub filter_backend: FilterBackend,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_seconds: 8.0,
            calibration_samples: 60,
            estimate_every: 1,
            parameters: Parameters::default(),
            filter_backend: FilterBackend::Butterworth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Calibrating,
    Estimating,
}

struct Running {
    fs: SamplingRate,
    window: SampleWindow,
    estimator: Arc<VitalEstimator>,
    degraded_reason: Option<String>,
}

/// Owns the rolling window and the estimator for one monitoring run.
///
/// The session starts out timing a calibration burst; once the sampling rate
/// is fixed it never calibrates again.
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    calibrator: SampleRateCalibrator,
    running: Option<Running>,
    since_estimate: usize,
    logger: Logger,
}

impl Session {
    pub fn new(config: SessionConfig, logger: Logger) -> Self {
        let session = Self::build(config, logger);
        info!(session.logger, "calibrating sampling rate";
            "samples" => session.calibrator.required());
        session
    }

    /// Session with a known sampling rate, skipping calibration.
    pub fn with_sampling_rate(config: SessionConfig, fs: SamplingRate, logger: Logger) -> Self {
        let mut session = Self::build(config, logger);
        session.start_estimating(fs);
        session
    }

    fn build(config: SessionConfig, logger: Logger) -> Self {
        let id = Uuid::new_v4();
        let logger = logger.new(o!("session" => id.to_string()));

        Self {
            id,
            calibrator: SampleRateCalibrator::new(config.calibration_samples),
            config,
            running: None,
            since_estimate: 0,
            logger,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        match self.running {
            Some(_) => Phase::Estimating,
            None => Phase::Calibrating,
        }
    }

    pub fn sampling_rate(&self) -> Option<SamplingRate> {
        self.running.as_ref().map(|r| r.fs)
    }

    /// Why the session runs on the fallback filter, if it does.
    pub fn degraded_reason(&self) -> Option<&str> {
        self.running.as_ref().and_then(|r| r.degraded_reason.as_deref())
    }

    pub fn estimator(&self) -> Option<Arc<VitalEstimator>> {
        self.running.as_ref().map(|r| Arc::clone(&r.estimator))
    }

    /// Routes one sample to calibration or to the window, without estimating.
    ///
    /// A failed calibration restarts the burst and reports the error.
    pub fn feed(&mut self, sample: Sample, at: Instant) -> Result<()> {
        if let Some(running) = self.running.as_mut() {
            running.window.push(sample);
            return Ok(());
        }

        self.calibrator.record(at);
        if !self.calibrator.is_complete() {
            return Ok(());
        }
        match self.calibrator.finish() {
            Ok(fs) => {
                self.start_estimating(fs);
                Ok(())
            }
            Err(err) => {
                warn!(self.logger, "calibration failed, restarting"; "error" => %err);
                self.calibrator = SampleRateCalibrator::new(self.config.calibration_samples);
                Err(err)
            }
        }
    }

    /// Feeds one sample and estimates every `estimate_every` samples once the
    /// window holds enough history.
    pub fn ingest(&mut self, sample: Sample, at: Instant) -> Result<Option<VitalEstimate>> {
        let was_running = self.running.is_some();
        self.feed(sample, at)?;
        if !was_running {
            return Ok(None);
        }

        self.since_estimate += 1;
        let ready = match self.running.as_ref() {
            Some(running) => running.window.len() >= running.estimator.min_samples(),
            None => false,
        };
        if !ready || self.since_estimate < self.config.estimate_every.max(1) {
            return Ok(None);
        }

        self.since_estimate = 0;
        self.estimate().map(Some)
    }

    /// Appends a sample to the window. Fails while still calibrating.
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        let running = self.running.as_mut().ok_or(VitalsError::NotCalibrated)?;
        running.window.push(sample);
        Ok(())
    }

    pub fn snapshot(&self) -> Option<WindowSnapshot> {
        self.running.as_ref().map(|r| r.window.snapshot())
    }

    pub fn estimate(&self) -> Result<VitalEstimate> {
        let running = self.running.as_ref().ok_or(VitalsError::NotCalibrated)?;
        Ok(running
            .estimator
            .estimate(running.window.infrared(), running.window.red()))
    }

    fn start_estimating(&mut self, fs: SamplingRate) {
        let params = self.config.parameters.clone();
        let selected = select_filter(
            self.config.filter_backend,
            params.filter_cutoff_low,
            params.filter_cutoff_high,
            params.filter_order,
            fs,
            &self.logger,
        );
        let estimator = VitalEstimator::new(
            params,
            fs,
            selected.filter,
            self.logger.new(o!("module" => "ppg")),
        );

        // The window must be able to hold the minimum history, or nothing is ever estimated.
        let requested = fs.samples_for(self.config.window_seconds);
        let capacity = requested.max(estimator.min_samples());
        if capacity > requested {
            warn!(self.logger, "window shorter than minimum history, widening";
                "requested" => requested, "capacity" => capacity);
        }
        let window = SampleWindow::new(capacity);
        info!(self.logger, "sampling rate fixed";
            "fs" => fs.hz(), "window" => window.capacity(), "backend" => ?estimator.filter().backend());

        self.running = Some(Running {
            fs,
            window,
            estimator: Arc::new(estimator),
            degraded_reason: selected.degraded_reason,
        });
        self.since_estimate = 0;
    }
}

/// One reported estimate, as handed to display and alert outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub session: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Exactly what the estimator computed.
    pub estimate: VitalEstimate,
    /// Last estimate that passed the plausibility gate.
    pub displayed: Option<VitalEstimate>,
    pub assessment: Assessment,
}

pub trait VitalsDelegate: Send + Sync {
    fn new_reading(&self, reading: Reading);
    fn status_changed(&self, assessment: Assessment);
    fn filter_degraded(&self, reason: String);
}

#[derive(Debug, Clone, Default)]
pub struct ReportPolicy {
    pub gate: PlausibilityGate,
    pub thresholds: StatusThresholds,
    /// Body temperature in Celsius, when a thermometer is attached.
    pub temperature: Option<f64>,
}

struct Reporter {
    session: Uuid,
    policy: ReportPolicy,
    last_status: Option<Assessment>,
    degraded_announced: bool,
    delegate: Arc<dyn VitalsDelegate>,
    logger: Logger,
}

impl Reporter {
    fn new(session: Uuid, policy: ReportPolicy, delegate: Arc<dyn VitalsDelegate>, logger: Logger) -> Self {
        Self {
            session,
            policy,
            last_status: None,
            degraded_announced: false,
            delegate,
            logger,
        }
    }

    fn announce_degraded(&mut self, reason: Option<&str>) {
        if let (Some(reason), false) = (reason, self.degraded_announced) {
            self.degraded_announced = true;
            self.delegate.filter_degraded(reason.to_string());
        }
    }

    fn report(&mut self, estimate: VitalEstimate) {
        let accepted = self.policy.gate.offer(&estimate);
        let displayed = self.policy.gate.displayed();
        let (bpm, spo2) = displayed.map_or((0.0, 0.0), |d| (d.bpm, d.spo2));
        let assessment = classify(bpm, spo2, self.policy.temperature, &self.policy.thresholds);

        debug!(self.logger, "estimate";
            "bpm" => estimate.bpm, "spo2" => estimate.spo2, "accepted" => accepted);

        if self.last_status != Some(assessment) {
            info!(self.logger, "status changed";
                "status" => ?assessment.status, "reason" => assessment.reason);
            self.last_status = Some(assessment);
            self.delegate.status_changed(assessment);
        }

        self.delegate.new_reading(Reading {
            session: self.session,
            timestamp: Utc::now(),
            estimate,
            displayed,
            assessment,
        });
    }
}

/// Single sequential loop: read a sample, feed the session, report any
/// estimate. Returns the session when the source ends.
pub async fn run_monitor<S>(
    source: S,
    mut session: Session,
    policy: ReportPolicy,
    delegate: Arc<dyn VitalsDelegate>,
    logger: Logger,
) -> Session
where
    S: Stream<Item = Sample>,
{
    let logger = logger.new(o!("session" => session.id().to_string()));
    let mut reporter = Reporter::new(session.id(), policy, delegate, logger.clone());
    tokio::pin!(source);

    while let Some(sample) = source.next().await {
        let at = tokio::time::Instant::now().into_std();
        match session.ingest(sample, at) {
            Ok(Some(estimate)) => {
                reporter.announce_degraded(session.degraded_reason());
                reporter.report(estimate);
            }
            Ok(None) => {}
            Err(err) => warn!(logger, "sample rejected"; "error" => %err),
        }
    }

    info!(logger, "source ended");
    session
}

/// Ingestion and estimation on separate tasks.
///
/// A spawned task is the only writer of the session. Every `tick` the
/// estimation side copies a snapshot under the read lock and computes after
/// releasing it. Returns once the source ends.
pub async fn run_split_monitor<S>(
    source: S,
    session: Arc<RwLock<Session>>,
    tick: Duration,
    policy: ReportPolicy,
    delegate: Arc<dyn VitalsDelegate>,
    logger: Logger,
) where
    S: Stream<Item = Sample> + Send + 'static,
{
    let id = session.read().await.id();
    let logger = logger.new(o!("session" => id.to_string()));
    let mut reporter = Reporter::new(id, policy, delegate, logger.clone());

    let writer = Arc::clone(&session);
    let ingest_logger = logger.clone();
    let mut ingestion = tokio::spawn(async move {
        tokio::pin!(source);
        while let Some(sample) = source.next().await {
            let at = tokio::time::Instant::now().into_std();
            let result = writer.write().await.feed(sample, at);
            if let Err(err) = result {
                warn!(ingest_logger, "sample rejected"; "error" => %err);
            }
        }
    });

    let mut ticks = tokio::time::interval(tick);
    loop {
        tokio::select! {
            result = &mut ingestion => {
                if let Err(err) = result {
                    warn!(logger, "ingestion task failed"; "error" => %err);
                }
                break;
            }
            _ = ticks.tick() => {
                let (snapshot, estimator, degraded) = {
                    let session = session.read().await;
                    (
                        session.snapshot(),
                        session.estimator(),
                        session.degraded_reason().map(str::to_string),
                    )
                };
                let (Some(snapshot), Some(estimator)) = (snapshot, estimator) else {
                    continue;
                };
                if snapshot.len() < estimator.min_samples() {
                    continue;
                }
                reporter.announce_degraded(degraded.as_deref());
                reporter.report(estimator.estimate_snapshot(&snapshot));
            }
        }
    }

    info!(logger, "source ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::silent_logger;
    use crate::mock::MockPpg;

    fn fs(hz: f64) -> SamplingRate {
        SamplingRate::new(hz).unwrap()
    }

    #[test]
    fn calibration_fixes_the_rate_once() {
        let config = SessionConfig {
            calibration_samples: 10,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config, silent_logger());
        assert_eq!(session.phase(), Phase::Calibrating);
        assert_eq!(session.push(Sample::new(1, 1)), Err(VitalsError::NotCalibrated));
        assert_eq!(session.estimate(), Err(VitalsError::NotCalibrated));

        let start = Instant::now();
        for i in 0..10u64 {
            let estimate = session
                .ingest(Sample::new(1, 1), start + Duration::from_millis(10 * i))
                .unwrap();
            assert_eq!(estimate, None);
        }

        assert_eq!(session.phase(), Phase::Estimating);
        assert_eq!(session.sampling_rate(), Some(fs(100.0)));
        // Calibration samples are not kept.
        assert_eq!(session.snapshot().map(|s| s.len()), Some(0));
        // 3 s at 100 Hz
        assert_eq!(session.estimator().map(|e| e.min_samples()), Some(300));
    }

    #[test]
    fn failed_calibration_restarts_the_burst() {
        let config = SessionConfig {
            calibration_samples: 3,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config, silent_logger());
        let now = Instant::now();

        assert!(session.ingest(Sample::default(), now).is_ok());
        assert!(session.ingest(Sample::default(), now).is_ok());
        assert_eq!(
            session.ingest(Sample::default(), now),
            Err(VitalsError::NonMonotonicTimestamps)
        );
        assert_eq!(session.phase(), Phase::Calibrating);

        for i in 0..3u64 {
            session
                .ingest(Sample::default(), now + Duration::from_millis(20 * i))
                .unwrap();
        }
        assert_eq!(session.sampling_rate(), Some(fs(50.0)));
    }

    #[test]
    fn estimates_on_cadence_after_minimum_history() {
        let config = SessionConfig {
            estimate_every: 25,
            ..SessionConfig::default()
        };
        let mut session = Session::with_sampling_rate(config, fs(50.0), silent_logger());
        let now = Instant::now();

        let produced: Vec<usize> = MockPpg::default()
            .samples(300)
            .into_iter()
            .enumerate()
            .filter_map(|(i, sample)| session.ingest(sample, now).unwrap().map(|_| i + 1))
            .collect();

        assert_eq!(produced, vec![150, 175, 200, 225, 250, 275, 300]);
    }

    #[test]
    fn session_estimate_tracks_mock_pulse() {
        let mut session =
            Session::with_sampling_rate(SessionConfig::default(), fs(50.0), silent_logger());
        for sample in MockPpg::default().samples(400) {
            session.push(sample).unwrap();
        }

        let estimate = session.estimate().unwrap();
        assert!((estimate.bpm - 72.0).abs() <= 2.0, "bpm {}", estimate.bpm);
        // R = 0.6 gives 110 - 25 * 0.6
        assert!((estimate.spo2 - 95.0).abs() <= 1.5, "spo2 {}", estimate.spo2);
    }

    #[test]
    fn window_holds_minimum_history_at_fractional_rate() {
        let config = SessionConfig {
            window_seconds: 3.0,
            ..SessionConfig::default()
        };
        // round(3 * 33.34) = 100, ceil(3 * 33.34) = 101
        let mut session = Session::with_sampling_rate(config, fs(33.34), silent_logger());
        let min_samples = session.estimator().map(|e| e.min_samples()).unwrap();
        assert_eq!(min_samples, 101);

        let now = Instant::now();
        let mock = MockPpg {
            fs: 33.34,
            ..MockPpg::default()
        };
        let estimates: Vec<VitalEstimate> = mock
            .samples(400)
            .into_iter()
            .filter_map(|sample| session.ingest(sample, now).unwrap())
            .collect();

        assert_eq!(session.snapshot().map(|s| s.len()), Some(min_samples));
        assert_eq!(estimates.len(), 400 - min_samples + 1);
        let last = estimates.last().unwrap();
        assert!((last.bpm - 72.0).abs() <= 4.0, "bpm {}", last.bpm);
    }

    #[test]
    fn unusable_passband_is_reported_as_degraded() {
        let mut session =
            Session::with_sampling_rate(SessionConfig::default(), fs(6.0), silent_logger());
        assert_eq!(
            session.estimator().map(|e| e.filter().backend()),
            Some(FilterBackend::DcRemoval)
        );
        assert!(session.degraded_reason().is_some());

        session.push(Sample::new(10, 10)).unwrap();
        assert_eq!(session.estimate(), Ok(VitalEstimate::insufficient()));
    }
}
