use super::EngineConfig;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &EngineConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    if config.secrets.key_env.trim().is_empty() {
        errors.push(ConfigValidationError {
            path: "secrets.keyEnv".to_string(),
            message: "Key environment variable name must not be empty".to_string(),
        });
    }

    if config.http.timeout_secs == Some(0) {
        errors.push(ConfigValidationError {
            path: "http.timeoutSecs".to_string(),
            message: "Timeout must be greater than 0".to_string(),
        });
    }

    if config.retry.base_delay_ms == 0 {
        warn!("retry.baseDelayMs is 0: retries will not back off");
    }

    for (name, provider) in &config.providers {
        if provider.base_url.is_empty() {
            errors.push(ConfigValidationError {
                path: format!("providers.{name}.baseUrl"),
                message: "Provider base URL is required".to_string(),
            });
        } else if url::Url::parse(&provider.base_url).is_err() {
            errors.push(ConfigValidationError {
                path: format!("providers.{name}.baseUrl"),
                message: format!("'{}' is not a valid URL", provider.base_url),
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_empty());
    }

    #[test]
    fn reports_bad_provider_and_timeout() {
        let mut config = EngineConfig::default();
        config.http.timeout_secs = Some(0);
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                base_url: "not a url".into(),
                api_key_secret: None,
            },
        );
        let errors = validate_config(&config);
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["http.timeoutSecs", "providers.local.baseUrl"]);
    }
}
