use crate::config::Config;
use crate::error::{Result, ValidationError, FlowlensError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_capture(config, &mut errors);
        Self::validate_scope(config, &mut errors);
        Self::validate_output(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FlowlensError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_capture(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.capture.buffer_size == 0 {
            errors.push(ValidationError::new(
                "capture.buffer_size",
                "Buffer size must be greater than 0",
            ));
        }

        if config.capture.socket_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "capture.socket_path",
                "Socket path must not be empty",
            ));
        }
    }

    fn validate_scope(config: &Config, errors: &mut Vec<ValidationError>) {
        if let Some(domains) = &config.scope.allowed_domains {
            for (i, domain) in domains.iter().enumerate() {
                if domain.trim().is_empty() {
                    errors.push(ValidationError::new(
                        format!("scope.allowed_domains[{}]", i),
                        "Hostname must not be empty",
                    ));
                } else if domain.contains('/') || domain.contains("://") {
                    errors.push(ValidationError::new(
                        format!("scope.allowed_domains[{}]", i),
                        format!("Expected a bare hostname, got: {}", domain),
                    ));
                }
            }
        }
    }

    fn validate_output(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.output.directory.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "output.directory",
                "Output directory must not be empty",
            ));
        }

        if config.output.max_text_excerpt == 0 {
            errors.push(ValidationError::new(
                "output.max_text_excerpt",
                "Excerpt budget must be greater than 0",
            ));
        }

        if config.output.max_binary_inline == 0 {
            errors.push(ValidationError::new(
                "output.max_binary_inline",
                "Inline binary budget must be greater than 0",
            ));
        }
    }
}
