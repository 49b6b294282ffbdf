use std::path::PathBuf;

use async_stream::stream;
use solar_core::domain::RawReading;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// NDJSON backfill source.
///
/// Each non-blank line is a JSON object shaped like the HTTP payload
/// (`siteId`, `dateTime`, `whUsed`, `whGenerated`, `tempC`). A line that does
/// not parse is reported as an error item and reading continues; an I/O
/// failure ends the stream.
pub struct ReadingNdjsonFileSource {
    path: PathBuf,
}

impl ReadingNdjsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<RawReading> for ReadingNdjsonFileSource {
    async fn stream(&self) -> EnvelopeStream<RawReading> {
        let path = self.path.clone();
        let s = stream! {
            let file = match File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to open backfill file: {e}")));
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(PipelineError::Source(format!("failed to read backfill line: {e}")));
                        break;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<RawReading>(&line) {
                    Ok(raw) => {
                        yield Ok(Envelope::now(raw));
                    }
                    Err(e) => {
                        metrics::counter!("backfill_reading_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!("line {line_no}: invalid json: {e}")));
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

    #[tokio::test]
    async fn bad_lines_do_not_end_the_stream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"siteId":1,"dateTime":"2024-01-01 00:00:00","whGenerated":1.0}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file, r#"{{"siteId":2,"dateTime":"2024-01-01 00:01:00","whUsed":0.5}}"#).unwrap();

        let items: Vec<_> = ReadingNdjsonFileSource::new(file.path()).stream().await.collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().payload.site_id, Some(1));
        assert!(matches!(&items[1], Err(PipelineError::Source(msg)) if msg.starts_with("line 3")));
        assert_eq!(items[2].as_ref().unwrap().payload.wh_used, Some(0.5));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let items: Vec<_> = ReadingNdjsonFileSource::new("/definitely/not/here.ndjson")
            .stream()
            .await
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }
}
