// Configuration for workshop-scribe
// Environment-driven with code defaults; a .env file is honored in
// development.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::analysis::HttpAnalysisConfig;
use crate::pipeline::{GateConfig, PipelineConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub org_id: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub storage_root: PathBuf,
    pub work_dir: PathBuf,
    pub analysis_base_url: String,
    pub analysis_api_key: String,
    pub analysis_model: String,
    pub analysis_max_concurrent: i64,
    pub semaphore_ttl_secs: i64,
    pub max_chunk_duration_ms: i64,
    pub overlap_ms: i64,
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Development convenience; missing .env is fine
        dotenvy::dotenv().ok();

        let data_dir = match std::env::var_os("WS_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("workshop-scribe"),
        };

        let storage_root = match std::env::var_os("WS_STORAGE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => data_dir.join("objects"),
        };

        Ok(Self {
            org_id: env_or("WS_ORG_ID", "org_default"),
            db_path: data_dir.join("workshop-scribe.db"),
            work_dir: data_dir.join("work"),
            data_dir,
            storage_root,
            analysis_base_url: env_or("WS_ANALYSIS_URL", "http://localhost:8500"),
            analysis_api_key: env_or("WS_ANALYSIS_API_KEY", ""),
            analysis_model: env_or("WS_ANALYSIS_MODEL", "scribe-large"),
            analysis_max_concurrent: env_parsed("WS_ANALYSIS_MAX_CONCURRENT", 5)?,
            semaphore_ttl_secs: env_parsed("WS_SEMAPHORE_TTL_SECS", 600)?,
            max_chunk_duration_ms: env_parsed("WS_MAX_CHUNK_DURATION_MS", 3_600_000)?,
            overlap_ms: env_parsed("WS_OVERLAP_MS", 2_000)?,
            poll_interval_secs: env_parsed("WS_POLL_INTERVAL_SECS", 10)?,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            model: self.analysis_model.clone(),
            max_chunk_duration_ms: self.max_chunk_duration_ms,
            overlap_ms: self.overlap_ms,
            work_dir: self.work_dir.clone(),
            gate: GateConfig {
                max_concurrent: self.analysis_max_concurrent,
                ttl_seconds: self.semaphore_ttl_secs,
                ..GateConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    pub fn analysis_config(&self) -> HttpAnalysisConfig {
        HttpAnalysisConfig {
            base_url: self.analysis_base_url.clone(),
            api_key: self.analysis_api_key.clone(),
            model: self.analysis_model.clone(),
            ..HttpAnalysisConfig::default()
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}", name)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_env().unwrap();
        assert!(!config.org_id.is_empty());
        assert_eq!(config.db_path.file_name().unwrap(), "workshop-scribe.db");
        assert!(config.max_chunk_duration_ms > 0);
    }

    #[test]
    fn test_env_override_parsing() {
        std::env::set_var("WS_TEST_PARSE_MS", "1200000");
        let value: i64 = env_parsed("WS_TEST_PARSE_MS", 0).unwrap();
        assert_eq!(value, 1_200_000);

        std::env::set_var("WS_TEST_PARSE_MS", "not-a-number");
        assert!(env_parsed::<i64>("WS_TEST_PARSE_MS", 0).is_err());
        std::env::remove_var("WS_TEST_PARSE_MS");
    }
}
