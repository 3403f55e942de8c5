use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{Result, TicketscopeError, ValidationError};

const MAX_LOOKBACK_DAYS: i64 = 365;
const MAX_CAPTURE_BUFFER_MINUTES: i64 = 24 * 60;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_codebase(config, &mut errors);
        Self::validate_log_search(config, &mut errors);
        Self::validate_url_resolution(config, &mut errors);
        Self::validate_triage(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TicketscopeError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.max_chunk_chars == 0 {
            errors.push(ValidationError::new(
                "chunking.max_chunk_chars",
                "Maximum chunk size must be greater than 0",
            ));
        }

        if chunking.min_chunk_chars >= chunking.max_chunk_chars {
            errors.push(ValidationError::new(
                "chunking.min_chunk_chars",
                "Minimum chunk size must be smaller than the maximum",
            ));
        }

        if chunking.window_lines == 0 || chunking.window_overlap_lines >= chunking.window_lines {
            errors.push(ValidationError::new(
                "chunking.window_overlap_lines",
                format!(
                    "Window overlap ({}) must be smaller than window size ({})",
                    chunking.window_overlap_lines, chunking.window_lines
                ),
            ));
        }

        if chunking.config_split_lines == 0
            || chunking.config_overlap_lines >= chunking.config_split_lines
        {
            errors.push(ValidationError::new(
                "chunking.config_overlap_lines",
                format!(
                    "Config overlap ({}) must be smaller than split size ({})",
                    chunking.config_overlap_lines, chunking.config_split_lines
                ),
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.upsert_batch_size == 0 {
            errors.push(ValidationError::new(
                "index.upsert_batch_size",
                "Upsert batch size must be greater than 0",
            ));
        }

        if config.index.default_top_k == 0 {
            errors.push(ValidationError::new(
                "index.default_top_k",
                "Default top_k must be greater than 0",
            ));
        }
    }

    fn validate_codebase(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.codebase.include_patterns.is_empty() {
            errors.push(ValidationError::new(
                "codebase.include_patterns",
                "At least one include pattern is required",
            ));
        }

        for pattern in &config.codebase.include_patterns {
            if let Err(e) = globset::Glob::new(pattern) {
                errors.push(ValidationError::new(
                    "codebase.include_patterns",
                    format!("Invalid glob '{}': {}", pattern, e),
                ));
            }
        }

        for collection in [&config.codebase.collection, &config.wiki.collection] {
            if collection.is_empty()
                || !collection
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                errors.push(ValidationError::new(
                    "collection",
                    format!("Invalid collection name: '{}'", collection),
                ));
            }
        }
    }

    fn validate_log_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let log_search = &config.log_search;

        if !log_search.pod_urls.contains_key(&log_search.default_pod) {
            errors.push(ValidationError::new(
                "log_search.default_pod",
                format!(
                    "Default pod '{}' is not one of {:?}",
                    log_search.default_pod,
                    log_search.pod_urls.keys().collect::<Vec<_>>()
                ),
            ));
        }

        for (pod, base) in &log_search.pod_urls {
            if url::Url::parse(base).is_err() {
                errors.push(ValidationError::new(
                    format!("log_search.pod_urls.{}", pod),
                    format!("Invalid URL: {}", base),
                ));
            }
        }

        if log_search.default_index_pattern.is_empty() {
            errors.push(ValidationError::new(
                "log_search.default_index_pattern",
                "Index pattern cannot be empty",
            ));
        }

        if log_search.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "log_search.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_url_resolution(config: &Config, errors: &mut Vec<ValidationError>) {
        let resolution = &config.url_resolution;

        if !resolution.destination_path.starts_with('/') {
            errors.push(ValidationError::new(
                "url_resolution.destination_path",
                "Destination path must start with '/'",
            ));
        }

        if resolution.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "url_resolution.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_triage(config: &Config, errors: &mut Vec<ValidationError>) {
        let triage = &config.triage;

        if triage.capture_buffer_minutes < 0 {
            errors.push(ValidationError::new(
                "triage.capture_buffer_minutes",
                "Capture buffer cannot be negative",
            ));
        } else if triage.capture_buffer_minutes > MAX_CAPTURE_BUFFER_MINUTES {
            errors.push(ValidationError::new(
                "triage.capture_buffer_minutes",
                format!(
                    "Capture buffer cannot exceed {} minutes",
                    MAX_CAPTURE_BUFFER_MINUTES
                ),
            ));
        }

        if triage.lookback_days <= 0 {
            errors.push(ValidationError::new(
                "triage.lookback_days",
                "Lookback window must be at least one day",
            ));
        } else if triage.lookback_days > MAX_LOOKBACK_DAYS {
            errors.push(ValidationError::new(
                "triage.lookback_days",
                format!("Lookback window cannot exceed {} days", MAX_LOOKBACK_DAYS),
            ));
        }

        if triage.max_capture_entries == 0 {
            errors.push(ValidationError::new(
                "triage.max_capture_entries",
                "Must scan at least one capture entry",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_default_pod() {
        let mut config = Config::default();
        config.log_search.default_pod = "mars".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let mut config = Config::default();
        config.chunking.window_overlap_lines = config.chunking.window_lines;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_triage_windows_are_bounded() {
        let mut config = Config::default();
        config.triage.lookback_days = i64::MAX;
        config.triage.capture_buffer_minutes = 24 * 60 + 1;

        match ConfigValidator::validate(&config) {
            Err(TicketscopeError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert_eq!(
                    paths,
                    vec!["triage.capture_buffer_minutes", "triage.lookback_days"]
                );
            }
            other => panic!("expected validation failure, got {:?}", other),
        }

        config.triage.lookback_days = 365;
        config.triage.capture_buffer_minutes = 24 * 60;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        config.triage.lookback_days = 0;
        config.codebase.include_patterns = vec!["a[".to_string()];

        match ConfigValidator::validate(&config) {
            Err(TicketscopeError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
