//! Labelled dataset CSV files and the reference URL lists they are built from.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Name of the label column that follows the 29 features
pub const LABEL_COLUMN: &str = "result";

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to open dataset {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: expected {expected} columns, found {found}")]
    ColumnCount { row: usize, expected: usize, found: usize },

    #[error("Row {row}, column '{column}': '{value}' is not an integer")]
    InvalidValue { row: usize, column: String, value: String },

    #[error("Row {row}: label {label} is neither 1 nor -1")]
    InvalidLabel { row: usize, label: i32 },
}

/// Training label. Phishing is `1`, legitimate is `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Phish,
    Legitimate,
}

impl Label {
    pub fn value(self) -> i32 {
        match self {
            Label::Phish => 1,
            Label::Legitimate => -1,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Label::Phish),
            -1 => Some(Label::Legitimate),
            _ => None,
        }
    }

    pub fn from_prediction(is_phish: bool) -> Self {
        if is_phish { Label::Phish } else { Label::Legitimate }
    }

    pub fn is_phish(self) -> bool {
        self == Label::Phish
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRow {
    pub features: FeatureVector,
    pub label: Label,
}

/// Column header: the 29 feature names then `result`
pub fn header() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = FEATURE_NAMES.to_vec();
    columns.push(LABEL_COLUMN);
    columns
}

/// Appends whole rows to a dataset file, one open/write/flush per row.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    path: PathBuf,
}

impl DatasetWriter {
    /// Start a new dataset, truncating any existing file and writing the header.
    pub fn create(path: &Path) -> Result<Self, DatasetError> {
        let file = File::create(path).map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = WriterBuilder::new().from_writer(file);
        writer.write_record(header())?;
        writer.flush().map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Created dataset {}", path.display());
        Ok(Self { path: path.to_path_buf() })
    }

    /// Continue an existing dataset. No header is written.
    pub fn append(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_row(&self, row: &DatasetRow) -> Result<(), DatasetError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| DatasetError::Open {
                path: self.path.clone(),
                source,
            })?;

        let mut record: Vec<String> = row.features.to_array().iter().map(|v| v.to_string()).collect();
        record.push(row.label.value().to_string());

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(&record)?;
        writer.flush().map_err(|source| DatasetError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Read every row of a dataset written by [`DatasetWriter`].
pub fn read_dataset(path: &Path) -> Result<Vec<DatasetRow>, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        rows.push(parse_row(index + 1, &result?)?);
    }
    Ok(rows)
}

fn parse_row(row: usize, record: &StringRecord) -> Result<DatasetRow, DatasetError> {
    if record.len() != FEATURE_COUNT + 1 {
        return Err(DatasetError::ColumnCount {
            row,
            expected: FEATURE_COUNT + 1,
            found: record.len(),
        });
    }

    let parse = |i: usize, column: &str| {
        record[i].trim().parse::<i32>().map_err(|_| DatasetError::InvalidValue {
            row,
            column: column.to_string(),
            value: record[i].to_string(),
        })
    };

    let mut values = [0i32; FEATURE_COUNT];
    for (i, name) in FEATURE_NAMES.iter().enumerate() {
        values[i] = parse(i, name)?;
    }
    let label_value = parse(FEATURE_COUNT, LABEL_COLUMN)?;
    let label = Label::from_value(label_value).ok_or(DatasetError::InvalidLabel { row, label: label_value })?;

    Ok(DatasetRow {
        features: FeatureVector::from_array(values),
        label,
    })
}

/// Known-phish and known-legitimate URLs read from a reference CSV
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceUrls {
    pub phish: Vec<String>,
    pub legitimate: Vec<String>,
}

impl ReferenceUrls {
    /// `(phish[i], legitimate[i])` for every index both lists share
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.phish
            .iter()
            .zip(self.legitimate.iter())
            .map(|(p, l)| (p.as_str(), l.as_str()))
    }
}

/// Parse `url,status` lines. Malformed lines are skipped, never fatal.
pub fn parse_reference_csv(content: &str) -> ReferenceUrls {
    let mut urls = ReferenceUrls::default();

    for line in content.lines() {
        if !line.chars().all(|c| c.is_ascii_graphic() || c.is_ascii_whitespace()) {
            continue;
        }

        let fields: Vec<&str> = line.trim().split(',').collect();
        // Too many fields means a URL with unescaped commas
        if fields.len() != 2 {
            continue;
        }

        let url = fields[0].trim();
        let status = fields[1].trim();
        if url.eq_ignore_ascii_case("url") || status.eq_ignore_ascii_case("status") {
            continue;
        }

        match status {
            "-1" | "good" => urls.legitimate.push(url.to_string()),
            "1" | "bad" => urls.phish.push(url.to_string()),
            _ => match status.parse::<i64>() {
                Ok(-1) => urls.legitimate.push(url.to_string()),
                Ok(1) => urls.phish.push(url.to_string()),
                _ => {}
            },
        }
    }

    urls
}

pub fn read_reference_csv(path: &Path) -> Result<ReferenceUrls, DatasetError> {
    let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_reference_csv(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = header();
        assert_eq!(header.len(), 30);
        assert_eq!(header[0], "having_ip_address");
        assert_eq!(header[28], "screenshot_ocr");
        assert_eq!(header[29], "result");
    }

    #[test]
    fn test_reference_scenarios() {
        let urls = parse_reference_csv("http://example.com,good\nhttp://bad.example,bad\nhttp://odd.example,foo\n");
        assert_eq!(urls.legitimate, vec!["http://example.com"]);
        assert_eq!(urls.phish, vec!["http://bad.example"]);
    }

    #[test]
    fn test_reference_numeric_and_header() {
        let urls = parse_reference_csv("url,status\nhttp://a.test, -1\nhttp://b.test,1\nhttp://c.test,+1\nhttp://d.test,0\n");
        assert_eq!(urls.legitimate, vec!["http://a.test"]);
        assert_eq!(urls.phish, vec!["http://b.test", "http://c.test"]);
    }

    #[test]
    fn test_reference_skips_malformed_lines() {
        let content = "http://only-url.test\nhttp://x.test/a,b,bad\nhttp://caf\u{e9}.test,bad\n\nhttp://ok.test,bad\n";
        let urls = parse_reference_csv(content);
        assert_eq!(urls.phish, vec!["http://ok.test"]);
        assert!(urls.legitimate.is_empty());
    }

    #[test]
    fn test_string_statuses_are_case_sensitive() {
        let urls = parse_reference_csv("http://a.test,GOOD\nhttp://b.test,Bad\n");
        assert_eq!(urls, ReferenceUrls::default());
    }

    #[test]
    fn test_pairs_stop_at_shorter_list() {
        let urls = ReferenceUrls {
            phish: vec!["p1".into(), "p2".into(), "p3".into()],
            legitimate: vec!["l1".into()],
        };
        assert_eq!(urls.pairs().collect::<Vec<_>>(), vec![("p1", "l1")]);
    }

    #[test]
    fn test_round_trip_preserves_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        let writer = DatasetWriter::create(&path).unwrap();

        let mut first = [1i32; FEATURE_COUNT];
        first[2] = 4;
        let mut second = [-1i32; FEATURE_COUNT];
        second[28] = 0;
        let rows = vec![
            DatasetRow { features: FeatureVector::from_array(first), label: Label::Phish },
            DatasetRow { features: FeatureVector::from_array(second), label: Label::Legitimate },
        ];
        for row in &rows {
            writer.write_row(row).unwrap();
        }

        assert_eq!(read_dataset(&path).unwrap(), rows);
    }

    #[test]
    fn test_append_does_not_repeat_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        let row = DatasetRow {
            features: FeatureVector::from_array([1; FEATURE_COUNT]),
            label: Label::Legitimate,
        };
        DatasetWriter::create(&path).unwrap().write_row(&row).unwrap();
        DatasetWriter::append(&path).write_row(&row).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("having_ip_address").count(), 1);
        assert_eq!(read_dataset(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_bad_label_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        let mut content = header().join(",");
        content.push('\n');
        content.push_str(&vec!["1"; FEATURE_COUNT].join(","));
        content.push_str(",0\n");
        std::fs::write(&path, content).unwrap();

        assert!(matches!(read_dataset(&path), Err(DatasetError::InvalidLabel { row: 1, label: 0 })));
    }
}
