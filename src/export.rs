use crate::dataset::Dataset;
use crate::error::Result;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_FILE_NAME: &str = "filtered_data.csv";
pub const EXPORT_MIME_TYPE: &str = "text/csv";

/// The filtered dataset as a downloadable CSV document.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub file_name: &'static str,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl CsvExport {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }
}

/// UTF-8 CSV with a header row; dates are written as `YYYY-MM-DD`.
pub fn to_csv(dataset: &Dataset) -> Result<CsvExport> {
    let mut frame = dataset.frame().clone();
    let mut bytes = Vec::new();
    CsvWriter::new(&mut bytes)
        .include_header(true)
        .finish(&mut frame)?;
    Ok(CsvExport {
        file_name: EXPORT_FILE_NAME,
        mime_type: EXPORT_MIME_TYPE,
        bytes,
    })
}

/// Writes `filtered_data.csv` into `dir` and returns its path.
pub fn write_csv(dataset: &Dataset, dir: &Path) -> Result<PathBuf> {
    let export = to_csv(dataset)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export.file_name);
    std::fs::write(&path, &export.bytes)?;
    info!("Exported {} rows to {}", dataset.height(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_dataset;

    #[test]
    fn test_csv_has_header_and_rows() {
        let export = to_csv(&sample_dataset()).unwrap();
        assert_eq!(export.file_name, "filtered_data.csv");
        assert_eq!(export.mime_type, "text/csv");

        let text = export.as_str();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[0].starts_with("Order ID,Customer Name,Product Name,Region"));
        assert!(lines[0].ends_with("Order Date"));
        assert!(lines[1].ends_with("2023-01-03"));
    }

    #[test]
    fn test_empty_dataset_exports_header_only() {
        let export = to_csv(&Dataset::empty()).unwrap();
        assert_eq!(export.as_str().lines().count(), 1);
    }
}
