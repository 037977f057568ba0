use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BoundsError {
    #[error("failed to open dataset at {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed csv")]
    Csv(#[from] csv::Error),
    #[error("dataset is missing column `{0}`")]
    MissingColumn(String),
    #[error("column `{column}` row {row}: `{value}` is not a number")]
    NotNumeric {
        column: String,
        row: usize,
        value: String,
    },
    #[error("column `CRASH DATEDayofweek` row {row}: {value} is not a day in 0..=6")]
    InvalidDay { row: usize, value: f64 },
    #[error("column `{0}` has no values")]
    EmptyColumn(String),
    #[error("invalid observed range for `{column}`: min={min} max={max}")]
    InvalidRange { column: String, min: f64, max: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model artifact at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model artifact")]
    Parse(#[from] serde_json::Error),
    #[error("malformed model: {0}")]
    Malformed(String),
    #[error("feature length mismatch: got {got}, expected {expected}")]
    FeatureMismatch { got: usize, expected: usize },
    #[error("model is missing input feature `{0}`")]
    UnknownFeature(String),
    #[error("model produced no output")]
    EmptyOutput,
    #[cfg(feature = "torch")]
    #[error("torch: {0}")]
    Torch(#[from] tch::TchError),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("{field} must be a finite number in {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("day_of_week must be in 0..=6, got {0}")]
    DayOfWeek(u8),
}
