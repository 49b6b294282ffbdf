use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The unit a stored series is recorded in.
///
/// The set is closed: each kind picks its own storage key segment and the
/// combinator used when minute values are folded into hourly/daily figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    KwhGenerated,
    KwhUsed,
    TemperatureCelsius,
}

/// How minute values of a kind are folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Sum,
    Mean,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 3] = [
        MeasurementKind::KwhGenerated,
        MeasurementKind::KwhUsed,
        MeasurementKind::TemperatureCelsius,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementKind::KwhGenerated => "kwh_generated",
            MeasurementKind::KwhUsed => "kwh_used",
            MeasurementKind::TemperatureCelsius => "temperature_celsius",
        }
    }

    pub fn combinator(self) -> Combinator {
        match self {
            MeasurementKind::KwhGenerated | MeasurementKind::KwhUsed => Combinator::Sum,
            MeasurementKind::TemperatureCelsius => Combinator::Mean,
        }
    }

    /// Wire name of the reading field this kind is sourced from.
    pub fn source_field(self) -> &'static str {
        match self {
            MeasurementKind::KwhGenerated => "whGenerated",
            MeasurementKind::KwhUsed => "whUsed",
            MeasurementKind::TemperatureCelsius => "tempC",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
}

/// A named series ready for charting, ordered by timestamp ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub name: String,
    pub values: Vec<Measurement>,
}

impl Plot {
    pub fn new(name: impl Into<String>, values: Vec<Measurement>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn energy_kinds_sum_and_temperature_averages() {
        assert_eq!(MeasurementKind::KwhGenerated.combinator(), Combinator::Sum);
        assert_eq!(MeasurementKind::KwhUsed.combinator(), Combinator::Sum);
        assert_eq!(MeasurementKind::TemperatureCelsius.combinator(), Combinator::Mean);
    }

    #[test]
    fn kind_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&MeasurementKind::KwhGenerated).unwrap();
        assert_eq!(json, "\"kwh_generated\"");

        let kind: MeasurementKind = serde_json::from_str("\"temperature_celsius\"").unwrap();
        assert_eq!(kind, MeasurementKind::TemperatureCelsius);
    }

    #[test]
    fn plot_serializes_name_and_values() {
        let plot = Plot::new(
            "kWh Generated",
            vec![Measurement {
                timestamp: datetime!(2024-01-01 00:01:00 UTC),
                value: 2.0,
            }],
        );

        let json = serde_json::to_value(&plot).unwrap();
        assert_eq!(json["name"], "kWh Generated");
        assert_eq!(json["values"][0]["timestamp"], "2024-01-01T00:01:00Z");
        assert_eq!(json["values"][0]["value"], 2.0);
    }
}
