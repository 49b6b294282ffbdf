use serde::Deserialize;
use solar_core::domain::{MeasurementKind, Site};
use std::fs;

fn default_channel_capacity() -> usize {
    1024
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_max_request_records() -> usize {
    10_000
}

fn default_required_kinds() -> Vec<MeasurementKind> {
    MeasurementKind::ALL.to_vec()
}

fn default_global_cap() -> usize {
    solar_core::db::feed::DEFAULT_GLOBAL_CAP
}

fn default_site_cap() -> usize {
    solar_core::db::feed::DEFAULT_SITE_CAP
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSourceConfig {
    pub http_bind_addr: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_request_records")]
    pub max_request_records: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Kinds whose source fields a reading must carry to be accepted.
    #[serde(default = "default_required_kinds")]
    pub required_kinds: Vec<MeasurementKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            required_kinds: default_required_kinds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_global_cap")]
    pub global_max_len: usize,
    #[serde(default = "default_site_cap")]
    pub site_max_len: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            global_max_len: default_global_cap(),
            site_max_len: default_site_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub ingest: HttpSourceConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub sites: Vec<Site>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("SOLAR_CONFIG").unwrap_or_else(|_| "solar-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solar_core::domain::SiteId;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [ingest]
            http_bind_addr = "127.0.0.1:8081"

            [api]
            bind_addr = "127.0.0.1:8080"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.ingest.channel_capacity, 1024);
        assert_eq!(cfg.pipeline.required_kinds, MeasurementKind::ALL.to_vec());
        assert_eq!(cfg.feed.global_max_len, 10_000);
        assert_eq!(cfg.feed.site_max_len, 2_440);
        assert!(cfg.metrics.is_none());
        assert!(cfg.sites.is_empty());
    }

    #[test]
    fn full_config_parses_sites_and_kinds() {
        let cfg = AppConfig::from_toml(
            r#"
            [ingest]
            http_bind_addr = "0.0.0.0:8081"
            channel_capacity = 64

            [api]
            bind_addr = "0.0.0.0:8080"

            [pipeline]
            required_kinds = ["kwh_generated", "kwh_used"]

            [feed]
            site_max_len = 100

            [metrics]
            bind_addr = "0.0.0.0:9000"

            [[sites]]
            id = 42
            capacity = 4.5
            panels = 3
            city = "Oakland"
            coordinate = { lat = 37.8, lng = -122.27 }
            "#,
        )
        .unwrap();

        assert_eq!(cfg.ingest.channel_capacity, 64);
        assert_eq!(
            cfg.pipeline.required_kinds,
            vec![MeasurementKind::KwhGenerated, MeasurementKind::KwhUsed]
        );
        assert_eq!(cfg.feed.site_max_len, 100);
        assert_eq!(cfg.feed.global_max_len, 10_000);
        assert_eq!(cfg.sites.len(), 1);
        assert_eq!(cfg.sites[0].id, SiteId(42));
        assert_eq!(cfg.sites[0].coordinate.map(|c| c.lng), Some(-122.27));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let res = AppConfig::from_toml(
            r#"
            [ingest]
            http_bind_addr = "0.0.0.0:8081"
            [api]
            bind_addr = "0.0.0.0:8080"
            [pipeline]
            required_kinds = ["kwh_sold"]
            "#,
        );
        assert!(res.is_err());
    }
}
