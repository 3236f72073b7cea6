use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ForecastRisk {
    Shortage,
    Underutilized,
    Balanced,
}

impl ForecastRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastRisk::Shortage => "shortage",
            ForecastRisk::Underutilized => "underutilized",
            ForecastRisk::Balanced => "balanced",
        }
    }
}

impl fmt::Display for ForecastRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ForecastRisk {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "shortage" => Ok(ForecastRisk::Shortage),
            "underutilized" => Ok(ForecastRisk::Underutilized),
            "balanced" => Ok(ForecastRisk::Balanced),
            other => Err(format!("unsupported forecast risk: {other}")),
        }
    }
}

/// Capacity-versus-bookings projection for one future month.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPrediction {
    pub month_label: String,
    pub projected_capacity_hours: i64,
    pub projected_allocated_hours: i64,
    pub surplus_hours: i64,
    pub risk: ForecastRisk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastReport {
    pub predictions: Vec<ForecastPrediction>,
    pub summary: String,
    pub narrative: Option<String>,
}
