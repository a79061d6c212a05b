use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("server returned {status} for {url}")]
    Transfer { status: u16, url: String },

    #[error("Storage error for {path}: {message}")]
    Storage { path: String, message: String },

    #[error("Job registration of '{name}' rejected: {message}")]
    Registration { name: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration value for '{field}': {value} ({reason})")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Storage,
    Scheduling,
    Configuration,
}

impl RefreshError {
    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn registration(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registration {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transfer { .. } | Self::Http(_) => ErrorCategory::Network,
            Self::Storage { .. } | Self::Io(_) => ErrorCategory::Storage,
            Self::Registration { .. } => ErrorCategory::Scheduling,
            Self::InvalidConfigValue { .. }
            | Self::MissingConfig { .. }
            | Self::ConfigParse { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::Transfer { status, .. } if *status >= 500 => {
                "The remote server failed; the next scheduled run will try again"
            }
            Self::Transfer { .. } => "Check that the configured URL is still valid",
            Self::Http(_) => "Check network connectivity or raise the configured timeouts",
            Self::Storage { .. } | Self::Io(_) => {
                "Check that the output directory is writable and the disk is not full"
            }
            Self::Registration { .. } => "Make sure every job has a unique name",
            Self::InvalidConfigValue { .. } | Self::MissingConfig { .. } => {
                "Fix the configuration file and start again"
            }
            Self::ConfigParse { .. } => "Make sure the file exists and is valid TOML",
        }
    }
}

pub type Result<T> = std::result::Result<T, RefreshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_message_contains_status_and_url() {
        let err = RefreshError::Transfer {
            status: 404,
            url: "http://example.com/feed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server returned 404 for http://example.com/feed"
        );
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            RefreshError::storage("/tmp/x", "boom").category(),
            ErrorCategory::Storage
        );
        assert_eq!(
            RefreshError::registration("feed", "duplicate").category(),
            ErrorCategory::Scheduling
        );
        assert_eq!(
            RefreshError::MissingConfig {
                field: "jobs".to_string()
            }
            .category(),
            ErrorCategory::Configuration
        );
    }
}
