use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Invalid input file {path}: {message}")]
    InvalidInput { path: String, message: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_navigation_timeout_message() {
        let err = AppError::NavigationTimeout {
            url: "https://example.com/ad".to_string(),
            timeout_ms: 60000,
        };
        assert_eq!(
            err.to_string(),
            "Navigation to https://example.com/ad timed out after 60000ms"
        );
    }

    #[test]
    fn test_invalid_input_message() {
        let err = AppError::InvalidInput {
            path: "car_links.json".to_string(),
            message: "expected array or object".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid input file car_links.json: expected array or object"
        );
    }

    #[test]
    fn test_element_not_found_error() {
        let err = AppError::ElementNotFound {
            selector: ".offer-price__number".to_string(),
        };
        assert_eq!(err.to_string(), "Element not found: .offer-price__number");
    }
}
