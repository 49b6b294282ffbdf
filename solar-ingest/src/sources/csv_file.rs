use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use solar_core::domain::RawReading;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Delimited backfill source for readings (`,` for CSV, `|` for `.dat`).
///
/// Expected header columns (by name):
/// - siteId
/// - dateTime
/// - whUsed (optional)
/// - whGenerated (optional)
/// - tempC (optional)
///
/// Empty cells become absent fields; normalisation decides whether that is
/// acceptable.
pub struct ReadingCsvFileSource {
    path: PathBuf,
    delimiter: u8,
}

impl ReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn parse_optional<T: std::str::FromStr>(name: &str, s: Option<&str>) -> Result<Option<T>, PipelineError>
where
    T::Err: std::fmt::Display,
{
    match s.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|e| PipelineError::Source(format!("invalid {name} '{v}': {e}"))),
    }
}

fn record_to_raw_reading(record: &StringRecord, headers: &StringRecord) -> Result<RawReading, PipelineError> {
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
    };

    if get("siteId").is_none() || get("dateTime").is_none() {
        return Err(PipelineError::Source(
            "missing column 'siteId' or 'dateTime' in delimited record".to_string(),
        ));
    }

    Ok(RawReading {
        site_id: parse_optional("siteId", get("siteId"))?,
        date_time: get("dateTime").map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        wh_used: parse_optional("whUsed", get("whUsed"))?,
        wh_generated: parse_optional("whGenerated", get("whGenerated"))?,
        temp_c: parse_optional("tempC", get("tempC"))?,
    })
}

#[async_trait::async_trait]
impl Source<RawReading> for ReadingCsvFileSource {
    async fn stream(&self) -> EnvelopeStream<RawReading> {
        // This source uses a blocking CSV reader but is wrapped in a single async task.
        // For large files, you might want to move this onto a dedicated thread pool.
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to open delimited file: {e}")));
                    return;
                }
            };
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .from_reader(file);
            let headers = match rdr.headers() {
                Ok(h) => h.clone(),
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to read headers: {e}")));
                    return;
                }
            };

            for result in rdr.records() {
                let parsed = result
                    .map_err(|e| PipelineError::Source(format!("failed to read record: {e}")))
                    .and_then(|record| record_to_raw_reading(&record, &headers));

                match parsed {
                    Ok(raw) => {
                        yield Ok(Envelope::now(raw));
                    }
                    Err(e) => {
                        metrics::counter!("backfill_reading_parse_errors_total").increment(1);
                        yield Err(e);
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[test]
    fn empty_cells_become_absent_fields() {
        let headers = StringRecord::from(vec!["siteId", "dateTime", "whUsed", "whGenerated", "tempC"]);
        let record = StringRecord::from(vec!["7", "2024-01-01 00:00:00", "", "1.25", " "]);

        let raw = record_to_raw_reading(&record, &headers).unwrap();
        assert_eq!(raw.site_id, Some(7));
        assert_eq!(raw.date_time.as_deref(), Some("2024-01-01 00:00:00"));
        assert_eq!(raw.wh_used, None);
        assert_eq!(raw.wh_generated, Some(1.25));
        assert_eq!(raw.temp_c, None);
    }

    #[test]
    fn unparsable_number_is_a_source_error() {
        let headers = StringRecord::from(vec!["siteId", "dateTime", "whUsed"]);
        let record = StringRecord::from(vec!["7", "2024-01-01 00:00:00", "lots"]);
        assert!(matches!(
            record_to_raw_reading(&record, &headers),
            Err(PipelineError::Source(_))
        ));
    }

    #[tokio::test]
    async fn pipe_delimited_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "siteId|dateTime|whUsed|whGenerated|tempC").unwrap();
        writeln!(file, "1|2024-01-01 00:00:00|0.5|1.5|19.0").unwrap();
        writeln!(file, "1|2024-01-01 00:01:00|0.6|1.6|19.5").unwrap();

        let items: Vec<_> = ReadingCsvFileSource::new(file.path())
            .with_delimiter(b'|')
            .stream()
            .await
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        let second = items[1].as_ref().unwrap();
        assert_eq!(second.payload.wh_generated, Some(1.6));
        assert_eq!(second.payload.temp_c, Some(19.5));
    }
}
