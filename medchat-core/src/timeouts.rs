use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Every call the gateway can make to the AI service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListPatients,
    Chat,
    GenerateReport,
    UploadDocuments,
    HealthCheck,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::ListPatients,
        Operation::Chat,
        Operation::GenerateReport,
        Operation::UploadDocuments,
        Operation::HealthCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListPatients => "list_patients",
            Operation::Chat => "chat",
            Operation::GenerateReport => "generate_report",
            Operation::UploadDocuments => "upload_documents",
            Operation::HealthCheck => "health_check",
        }
    }

    pub fn class(&self) -> TimeoutClass {
        match self {
            Operation::GenerateReport => TimeoutClass::LongRunning,
            Operation::HealthCheck => TimeoutClass::Probe,
            _ => TimeoutClass::Interactive,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutClass {
    Interactive,
    LongRunning,
    Probe,
}

impl TimeoutClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutClass::Interactive => "interactive",
            TimeoutClass::LongRunning => "long_running",
            TimeoutClass::Probe => "probe",
        }
    }
}

/// Per-operation timeout table.
///
/// Chat and listing are interactive and fail fast; report synthesis is
/// long-running and gets a budget an order of magnitude larger. A caller
/// that wraps the gateway must hold a policy that [`encloses`](Self::encloses)
/// the gateway's, otherwise it gives up on calls the gateway is still
/// legitimately waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    #[serde(with = "secs")]
    pub connect: Duration,
    #[serde(with = "secs")]
    pub list_patients: Duration,
    #[serde(with = "secs")]
    pub chat: Duration,
    #[serde(with = "secs")]
    pub generate_report: Duration,
    #[serde(with = "secs")]
    pub upload_documents: Duration,
    #[serde(with = "secs")]
    pub health_check: Duration,
}

pub const DEFAULT_CONNECT_SECS: u64 = 10;
pub const DEFAULT_INTERACTIVE_SECS: u64 = 60;
pub const DEFAULT_REPORT_SECS: u64 = 200;
pub const DEFAULT_HEALTH_SECS: u64 = 5;
/// Slack the caller adds on top of the gateway's report budget.
pub const DEFAULT_CALLER_REPORT_MARGIN_SECS: u64 = 10;

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_SECS),
            list_patients: Duration::from_secs(DEFAULT_INTERACTIVE_SECS),
            chat: Duration::from_secs(DEFAULT_INTERACTIVE_SECS),
            generate_report: Duration::from_secs(DEFAULT_REPORT_SECS),
            upload_documents: Duration::from_secs(DEFAULT_INTERACTIVE_SECS),
            health_check: Duration::from_secs(DEFAULT_HEALTH_SECS),
        }
    }
}

impl TimeoutPolicy {
    pub fn budget_for(&self, operation: Operation) -> Duration {
        match operation {
            Operation::ListPatients => self.list_patients,
            Operation::Chat => self.chat,
            Operation::GenerateReport => self.generate_report,
            Operation::UploadDocuments => self.upload_documents,
            Operation::HealthCheck => self.health_check,
        }
    }

    /// Policy for a client sitting in front of a gateway running `self`:
    /// identical budgets, except report generation gets `report_margin` extra.
    pub fn caller_policy(&self, report_margin: Duration) -> TimeoutPolicy {
        TimeoutPolicy {
            generate_report: self.generate_report + report_margin,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for operation in Operation::ALL {
            if self.budget_for(operation).is_zero() {
                return Err(ConfigError::ZeroTimeout(operation));
            }
        }
        if self.generate_report <= self.chat {
            return Err(ConfigError::ReportNotLonger {
                report: self.generate_report.as_secs(),
                chat: self.chat.as_secs(),
            });
        }
        Ok(())
    }

    /// Checks outer >= inner for every operation, `self` being the outer caller.
    pub fn encloses(&self, inner: &TimeoutPolicy) -> Result<(), ConfigError> {
        for operation in Operation::ALL {
            let outer_budget = self.budget_for(operation);
            let inner_budget = inner.budget_for(operation);
            if outer_budget < inner_budget {
                return Err(ConfigError::NotNested {
                    operation,
                    outer: outer_budget.as_secs(),
                    inner: inner_budget.as_secs(),
                });
            }
        }
        Ok(())
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
