//! Tabular export of extracted records.
//!
//! Both formats carry the same header row followed by one row per record,
//! in result-set order.

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::{ResultSet, RECORD_HEADERS};

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values
    Csv,
    /// Excel workbook
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors raised while writing exports
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The destination could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] XlsxError),

    #[error("No export formats requested")]
    NoFormats,
}

/// `base_path` with `.ext` appended, keeping any dots already in the name.
pub fn output_path(base_path: &Path, format: ExportFormat) -> PathBuf {
    let mut name = OsString::from(base_path.as_os_str());
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// Writes a [`ResultSet`] in one or more formats
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportSink;

impl ExportSink {
    pub fn new() -> Self {
        Self
    }

    /// Write `results` once per distinct format, returning the files written.
    pub fn write(
        &self,
        results: &ResultSet,
        base_path: &Path,
        formats: &[ExportFormat],
    ) -> Result<Vec<PathBuf>, ExportError> {
        if formats.is_empty() {
            return Err(ExportError::NoFormats);
        }

        let mut written = Vec::new();
        let mut seen = Vec::new();
        for &format in formats {
            if seen.contains(&format) {
                continue;
            }
            seen.push(format);

            let path = output_path(base_path, format);
            match format {
                ExportFormat::Csv => write_csv(results, &path)?,
                ExportFormat::Xlsx => write_xlsx(results, &path)?,
            }
            tracing::info!(path = %path.display(), rows = results.len(), "Wrote {} export", format);
            written.push(path);
        }

        Ok(written)
    }
}

fn write_csv(results: &ResultSet, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv_to(results, file, path)
}

fn write_csv_to<W: io::Write>(results: &ResultSet, out: W, path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);
    writer
        .write_record(RECORD_HEADERS)
        .map_err(|e| csv_error(path, e))?;
    for record in results {
        writer
            .write_record(record.columns())
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// I/O failures surface as [`ExportError::Write`]; the rest stay CSV errors.
fn csv_error(path: &Path, error: csv::Error) -> ExportError {
    if !error.is_io_error() {
        return ExportError::Csv(error);
    }
    let source = match error.into_kind() {
        csv::ErrorKind::Io(source) => source,
        kind => io::Error::other(format!("{:?}", kind)),
    };
    ExportError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn write_xlsx(results: &ResultSet, path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, title) in RECORD_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    for (row, record) in results.iter().enumerate() {
        for (col, value) in record.columns().iter().enumerate() {
            sheet.write_string(row as u32 + 1, col as u16, *value)?;
        }
    }

    let buffer = workbook.save_to_buffer()?;
    std::fs::write(path, buffer).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;
    use tempfile::TempDir;

    fn sample() -> ResultSet {
        let mut results = ResultSet::new();
        results.push(
            ArticleRecord::new(
                "Smith, J. (2020).".to_string(),
                "A1, with a comma".to_string(),
                &["Univ X".to_string(), "Univ Y".to_string()],
            )
            .unwrap(),
        );
        results.push(
            ArticleRecord::new(
                "Doe, J. (2021).".to_string(),
                "A2".to_string(),
                &["Univ Z".to_string()],
            )
            .unwrap(),
        );
        results
    }

    #[test]
    fn test_output_path_appends_extension() {
        assert_eq!(
            output_path(Path::new("out/run.v2"), ExportFormat::Csv),
            PathBuf::from("out/run.v2.csv")
        );
        assert_eq!(
            output_path(Path::new("output"), ExportFormat::Xlsx),
            PathBuf::from("output.xlsx")
        );
    }

    #[test]
    fn test_write_csv_rows() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("output");

        let written = ExportSink::new()
            .write(&sample(), &base, &[ExportFormat::Csv])
            .unwrap();
        assert_eq!(written, vec![dir.path().join("output.csv")]);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&written[0])
            .unwrap();
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], RECORD_HEADERS);
        assert_eq!(rows[1], ["Smith, J. (2020).", "A1, with a comma", "Univ X", "Univ Y"]);
        assert_eq!(rows[2], ["Doe, J. (2021).", "A2", "Univ Z", ""]);
    }

    #[test]
    fn test_empty_result_set_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let written = ExportSink::new()
            .write(&ResultSet::new(), &dir.path().join("empty"), &[ExportFormat::Csv])
            .unwrap();

        let content = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_duplicate_formats_written_once() {
        let dir = TempDir::new().unwrap();
        let written = ExportSink::new()
            .write(
                &sample(),
                &dir.path().join("output"),
                &[ExportFormat::Xlsx, ExportFormat::Csv, ExportFormat::Xlsx],
            )
            .unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_no_formats() {
        let dir = TempDir::new().unwrap();
        let result = ExportSink::new().write(&sample(), &dir.path().join("output"), &[]);
        assert!(matches!(result, Err(ExportError::NoFormats)));
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("missing").join("output");

        let result = ExportSink::new().write(&sample(), &base, &[ExportFormat::Csv]);
        assert!(matches!(result, Err(ExportError::Write { .. })));

        let result = ExportSink::new().write(&sample(), &base, &[ExportFormat::Xlsx]);
        assert!(matches!(result, Err(ExportError::Write { .. })));
    }

    /// Writer whose device has no space left
    struct FullDisk;

    impl io::Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_csv_row_io_failure_is_write_error() {
        let mut results = ResultSet::new();
        results.push(
            ArticleRecord::new(
                "Cite".to_string(),
                "x".repeat(64 * 1024),
                &["Univ X".to_string()],
            )
            .unwrap(),
        );

        let result = write_csv_to(&results, FullDisk, Path::new("out/full.csv"));
        match result {
            Err(ExportError::Write { path, source }) => {
                assert_eq!(path, PathBuf::from("out/full.csv"));
                assert!(source.to_string().contains("no space left"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_format_serde_names() {
        let formats: Vec<ExportFormat> = serde_json::from_str(r#"["csv", "xlsx"]"#).unwrap();
        assert_eq!(formats, vec![ExportFormat::Csv, ExportFormat::Xlsx]);
    }
}
