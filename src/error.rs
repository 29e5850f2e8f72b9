use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("{}", missing_column_message(.column, .available, .suggestion))]
    MissingColumn {
        column: String,
        available: Vec<String>,
        suggestion: Option<String>,
    },

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn missing_column_message(column: &str, available: &[String], suggestion: &Option<String>) -> String {
    let mut message = format!(
        "Column '{}' not found. Available columns: {}",
        column,
        available.join(", ")
    );
    if let Some(suggestion) = suggestion {
        message.push_str(&format!(". Did you mean '{}'?", suggestion));
    }
    message
}

impl DashboardError {
    /// Whether the rest of the dashboard can keep rendering after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DashboardError::DataUnavailable(_) | DashboardError::MissingColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message_lists_columns() {
        let err = DashboardError::MissingColumn {
            column: "Regoin".to_string(),
            available: vec!["Region".to_string(), "Sales".to_string()],
            suggestion: Some("Region".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("'Regoin'"));
        assert!(message.contains("Region, Sales"));
        assert!(message.ends_with("Did you mean 'Region'?"));
        assert!(err.is_recoverable());
    }
}
