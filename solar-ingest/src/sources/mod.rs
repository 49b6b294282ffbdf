pub mod csv_file;
pub mod http_json;
pub mod ndjson_file;

pub use csv_file::ReadingCsvFileSource;
pub use http_json::HttpReadingSource;
pub use ndjson_file::ReadingNdjsonFileSource;
