//! Defaults that depend on which kind of mesh feeds the aggregator.

use std::time::Duration;

use meshwatch_types::TimeSource;

/// The kind of upstream producing records.
///
/// Real radios behind a serial gateway report sparsely and with weak links;
/// a simulated mesh reports every couple of seconds over UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceProfile {
    #[default]
    Serial,
    Simulation,
}

impl SourceProfile {
    /// RSSI assumed when a status report omits it, in dBm.
    pub fn default_rssi(self) -> f64 {
        match self {
            SourceProfile::Serial => -100.0,
            SourceProfile::Simulation => -50.0,
        }
    }

    /// SNR assumed when a status report omits it.
    pub fn default_snr(self) -> Option<f64> {
        match self {
            SourceProfile::Serial => None,
            SourceProfile::Simulation => Some(10.0),
        }
    }

    pub fn default_time_source(self) -> TimeSource {
        match self {
            SourceProfile::Serial => TimeSource::None,
            SourceProfile::Simulation => TimeSource::Simulated,
        }
    }

    /// Silence after which a node is considered offline.
    pub fn offline_threshold(self) -> Duration {
        match self {
            SourceProfile::Serial => Duration::from_secs(90),
            SourceProfile::Simulation => Duration::from_secs(10),
        }
    }

    /// How often the liveness sweep runs.
    pub fn sweep_interval(self) -> Duration {
        match self {
            SourceProfile::Serial => Duration::from_secs(5),
            SourceProfile::Simulation => Duration::from_secs(2),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceProfile::Serial => "serial",
            SourceProfile::Simulation => "simulation",
        }
    }
}
