use crate::VitalEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No usable reading yet.
    Init,
    Normal,
    Abnormal,
    Critical,
}

/// What an alert output (LED, buzzer) should do for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Off,
    Steady,
    Beep,
    Continuous,
}

impl HealthStatus {
    pub fn alert_level(self) -> AlertLevel {
        match self {
            HealthStatus::Init => AlertLevel::Off,
            HealthStatus::Normal => AlertLevel::Steady,
            HealthStatus::Abnormal => AlertLevel::Beep,
            HealthStatus::Critical => AlertLevel::Continuous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub status: HealthStatus,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusThresholds {
    pub spo2_critical: f64,
    pub hr_high: f64,
    pub hr_low: f64,
    /// Degrees Celsius.
    pub fever: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            spo2_critical: 88.0,
            hr_high: 100.0,
            hr_low: 60.0,
            fever: 37.5,
        }
    }
}

/// First matching rule wins: low SpO2, high HR, low HR, fever.
pub fn classify(
    bpm: f64,
    spo2: f64,
    temperature: Option<f64>,
    thresholds: &StatusThresholds,
) -> Assessment {
    let assessment = |status, reason| Assessment { status, reason };

    if bpm <= 0.0 || spo2 <= 0.0 {
        return assessment(HealthStatus::Init, "Stabilizing");
    }
    if spo2 < thresholds.spo2_critical {
        return assessment(HealthStatus::Critical, "Low SpO2");
    }
    if bpm > thresholds.hr_high {
        return assessment(HealthStatus::Abnormal, "High HR");
    }
    if bpm < thresholds.hr_low {
        return assessment(HealthStatus::Abnormal, "Low HR");
    }
    if temperature.is_some_and(|t| t > thresholds.fever) {
        return assessment(HealthStatus::Abnormal, "Fever");
    }
    assessment(HealthStatus::Normal, "OK")
}

/// Holds the last plausible estimate so one bad window does not flash a
/// nonsensical reading.
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityGate {
    pub min_bpm: f64,
    pub min_spo2: f64,
    displayed: Option<VitalEstimate>,
}

impl Default for PlausibilityGate {
    fn default() -> Self {
        Self::new(30.0, 70.0)
    }
}

impl PlausibilityGate {
    pub fn new(min_bpm: f64, min_spo2: f64) -> Self {
        Self {
            min_bpm,
            min_spo2,
            displayed: None,
        }
    }

    /// Returns whether `estimate` was accepted as the new displayed value.
    pub fn offer(&mut self, estimate: &VitalEstimate) -> bool {
        let plausible = estimate.bpm > self.min_bpm && estimate.spo2 > self.min_spo2;
        if plausible {
            self.displayed = Some(*estimate);
        }
        plausible
    }

    pub fn displayed(&self) -> Option<VitalEstimate> {
        self.displayed
    }
}
