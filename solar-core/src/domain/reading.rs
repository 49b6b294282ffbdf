use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::{MeasurementKind, SiteId};

/// A reading as it arrives on the wire. Every field is nullable until
/// [`normalize`] has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    pub site_id: Option<i64>,
    pub date_time: Option<String>,
    pub wh_used: Option<f64>,
    pub wh_generated: Option<f64>,
    pub temp_c: Option<f64>,
}

/// A validated one-minute reading. Timestamps are held in UTC.
///
/// Deliberately not `PartialEq`: the only identity readings have is the
/// deduplication one, see [`Reading::same_observation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub site_id: SiteId,
    #[serde(rename = "dateTime", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub wh_used: Option<f64>,
    pub wh_generated: Option<f64>,
    pub temp_c: Option<f64>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RejectionReason {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl Reading {
    pub fn value_for(&self, kind: MeasurementKind) -> Option<f64> {
        match kind {
            MeasurementKind::KwhGenerated => self.wh_generated,
            MeasurementKind::KwhUsed => self.wh_used,
            MeasurementKind::TemperatureCelsius => self.temp_c,
        }
    }

    /// Surplus energy for the minute (generated minus used).
    pub fn capacity(&self) -> Option<f64> {
        Some(self.wh_generated? - self.wh_used?)
    }

    /// Deduplication comparison over (timestamp, whUsed, whGenerated, tempC).
    ///
    /// The site id is NOT compared: two sites reporting identical numbers for
    /// the same minute are treated as the same observation.
    pub fn same_observation(&self, other: &Reading) -> bool {
        self.timestamp == other.timestamp
            && self.wh_used == other.wh_used
            && self.wh_generated == other.wh_generated
            && self.temp_c == other.temp_c
    }

    /// Hash of the fields compared by [`Reading::same_observation`].
    pub fn dedup_key(&self) -> [u8; 32] {
        let mut h = blake3::Hasher::new();
        h.update(&self.timestamp.unix_timestamp_nanos().to_le_bytes());
        hash_opt_f64(&mut h, self.wh_used);
        hash_opt_f64(&mut h, self.wh_generated);
        hash_opt_f64(&mut h, self.temp_c);
        *h.finalize().as_bytes()
    }
}

fn hash_opt_f64(hasher: &mut blake3::Hasher, v: Option<f64>) {
    match v {
        Some(x) => {
            hasher.update(&[1]);
            // -0.0 and 0.0 compare equal, so they must hash equal too.
            hasher.update(&(x + 0.0).to_bits().to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// Accepts `yyyy-MM-dd HH:mm:ss` (taken as UTC), the same with a trailing
/// `±hh:mm` offset, or RFC 3339.
pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();

    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(ts.to_offset(UtcOffset::UTC));
    }

    let with_offset = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
    );
    if let Ok(ts) = OffsetDateTime::parse(s, with_offset) {
        return Some(ts.to_offset(UtcOffset::UTC));
    }

    let naive = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(s, naive).ok().map(PrimitiveDateTime::assume_utc)
}

fn check_energy(field: &'static str, v: Option<f64>) -> Result<(), RejectionReason> {
    match v {
        Some(x) if !x.is_finite() => Err(RejectionReason::InvalidValue {
            field,
            reason: "must be finite".to_string(),
        }),
        Some(x) if x < 0.0 => Err(RejectionReason::InvalidValue {
            field,
            reason: "must be non-negative".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Maps `-0.0` to `0.0`; every other value is unchanged.
fn positive_zero(v: Option<f64>) -> Option<f64> {
    v.map(|x| x + 0.0)
}

/// Validate and coerce a raw reading.
///
/// Rules:
/// - siteId must be present and positive (existence is the registry's call).
/// - dateTime must parse; it is normalised to UTC.
/// - whUsed/whGenerated, when present, must be finite and >= 0.
/// - tempC, when present, must be finite.
/// - every field backing a kind in `required` must be present.
pub fn normalize(raw: &RawReading, required: &[MeasurementKind]) -> Result<Reading, RejectionReason> {
    let site_id = raw.site_id.ok_or(RejectionReason::MissingField("siteId"))?;
    if site_id <= 0 {
        return Err(RejectionReason::InvalidValue {
            field: "siteId",
            reason: "must be positive".to_string(),
        });
    }

    let date_time = raw
        .date_time
        .as_deref()
        .ok_or(RejectionReason::MissingField("dateTime"))?;
    let timestamp =
        parse_timestamp(date_time).ok_or_else(|| RejectionReason::InvalidTimestamp(date_time.to_string()))?;

    check_energy("whUsed", raw.wh_used)?;
    check_energy("whGenerated", raw.wh_generated)?;
    if matches!(raw.temp_c, Some(t) if !t.is_finite()) {
        return Err(RejectionReason::InvalidValue {
            field: "tempC",
            reason: "must be finite".to_string(),
        });
    }

    let reading = Reading {
        site_id: SiteId(site_id),
        timestamp,
        wh_used: positive_zero(raw.wh_used),
        wh_generated: positive_zero(raw.wh_generated),
        temp_c: positive_zero(raw.temp_c),
    };

    for kind in required {
        if reading.value_for(*kind).is_none() {
            return Err(RejectionReason::MissingField(kind.source_field()));
        }
    }

    Ok(reading)
}

/// [`normalize`] requiring every measurement kind.
pub fn normalize_all(raw: &RawReading) -> Result<Reading, RejectionReason> {
    normalize(raw, &MeasurementKind::ALL)
}
