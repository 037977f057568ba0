use std::{fs::File, path::Path};

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::{
    error::BoundsError,
    rescale::{Range, Rescaler},
    types::{CrashRecord, Marker, PredictionInput, DAY_OF_WEEK, LATITUDE_SCALED, LONGITUDE_SCALED, SPLIT, TARGET},
};

/// Real-world target ranges for the two axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub lat: Range,
    pub lon: Range,
}

impl GeoBounds {
    /// Approximate extremes of New York City.
    pub const NYC: GeoBounds = GeoBounds {
        lat: Range { min: 40.477399, max: 40.917577 },
        lon: Range { min: -74.259090, max: -73.700272 },
    };
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self::NYC
    }
}

/// Observed scaled ranges paired with their geographic targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub lat: Rescaler,
    pub lon: Rescaler,
}

impl Bounds {
    pub fn new(observed_lat: Range, observed_lon: Range, geo: GeoBounds) -> Result<Self, BoundsError> {
        check_observed(LATITUDE_SCALED, observed_lat)?;
        check_observed(LONGITUDE_SCALED, observed_lon)?;
        Ok(Self {
            lat: Rescaler::new(observed_lat, geo.lat),
            lon: Rescaler::new(observed_lon, geo.lon),
        })
    }

    pub fn marker(&self, latitude_scaled: f64, longitude_scaled: f64) -> Marker {
        Marker {
            lat: self.lat.rescale(latitude_scaled),
            lon: self.lon.rescale(longitude_scaled),
        }
    }
}

fn check_observed(column: &str, r: Range) -> Result<(), BoundsError> {
    if !r.min.is_finite() || !r.max.is_finite() || r.min > r.max {
        return Err(BoundsError::InvalidRange {
            column: column.to_string(),
            min: r.min,
            max: r.max,
        });
    }
    Ok(())
}

/// What start-up keeps from the cleaned dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub bounds: Bounds,
    /// Rows with `Split == 1`.
    pub holdout: Vec<CrashRecord>,
    pub rows: usize,
}

struct Columns {
    lat: usize,
    lon: usize,
    day: usize,
    split: usize,
    y: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, BoundsError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| BoundsError::MissingColumn(name.to_string()))
        };
        Ok(Self {
            lat: find(LATITUDE_SCALED)?,
            lon: find(LONGITUDE_SCALED)?,
            day: find(DAY_OF_WEEK)?,
            split: find(SPLIT)?,
            y: find(TARGET)?,
        })
    }
}

/// Parses one cell; empty cells are missing values, not errors.
fn cell(record: &StringRecord, idx: usize, column: &str, row: usize) -> Result<Option<f64>, BoundsError> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| BoundsError::NotNumeric {
        column: column.to_string(),
        row,
        value: raw.to_string(),
    })
}

fn widen(acc: Option<Range>, v: f64) -> Option<Range> {
    Some(match acc {
        None => Range::new(v, v),
        Some(r) => Range::new(r.min.min(v), r.max.max(v)),
    })
}

fn day_of_week(v: f64, row: usize) -> Result<u8, BoundsError> {
    if v.fract() == 0.0 && (0.0..=6.0).contains(&v) {
        Ok(v as u8)
    } else {
        Err(BoundsError::InvalidDay { row, value: v })
    }
}

impl Dataset {
    pub fn load<P: AsRef<Path>>(path: P, geo: GeoBounds) -> Result<Self, BoundsError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| BoundsError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, geo)
    }

    pub fn from_reader<R: std::io::Read>(rdr: R, geo: GeoBounds) -> Result<Self, BoundsError> {
        let mut reader = csv::Reader::from_reader(rdr);
        let cols = Columns::locate(reader.headers()?)?;

        let mut lat: Option<Range> = None;
        let mut lon: Option<Range> = None;
        let mut holdout = Vec::new();
        let mut rows = 0;

        for (i, result) in reader.records().enumerate() {
            let record = result?;
            let row = i + 1;
            rows += 1;

            let la = cell(&record, cols.lat, LATITUDE_SCALED, row)?;
            let lo = cell(&record, cols.lon, LONGITUDE_SCALED, row)?;
            if let Some(v) = la {
                lat = widen(lat, v);
            }
            if let Some(v) = lo {
                lon = widen(lon, v);
            }

            if cell(&record, cols.split, SPLIT, row)? != Some(1.0) {
                continue;
            }
            let day = cell(&record, cols.day, DAY_OF_WEEK, row)?;
            let y = cell(&record, cols.y, TARGET, row)?;
            // Incomplete held-out rows are left out of evaluation.
            if let (Some(la), Some(lo), Some(day), Some(y)) = (la, lo, day, y) {
                holdout.push(CrashRecord {
                    input: PredictionInput {
                        latitude_scaled: la,
                        longitude_scaled: lo,
                        day_of_week: day_of_week(day, row)?,
                    },
                    split: 1,
                    y,
                });
            }
        }

        let lat = lat.ok_or_else(|| BoundsError::EmptyColumn(LATITUDE_SCALED.to_string()))?;
        let lon = lon.ok_or_else(|| BoundsError::EmptyColumn(LONGITUDE_SCALED.to_string()))?;

        for (name, r) in [(LATITUDE_SCALED, lat), (LONGITUDE_SCALED, lon)] {
            if r.is_degenerate() {
                tracing::warn!("{} has a single observed value {}; every marker maps to the target minimum", name, r.min);
            }
        }

        Ok(Self {
            bounds: Bounds::new(lat, lon, geo)?,
            holdout,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "LATITUDE_SCALED,LONGITUDE_SCALED,Split,CRASH DATEDayofweek,y\n";

    fn load(body: &str) -> Result<Dataset, BoundsError> {
        Dataset::from_reader(format!("{HEADER}{body}").as_bytes(), GeoBounds::NYC)
    }

    #[test]
    fn extracts_observed_min_max() {
        let ds = load("10,20,0,1,3\n90,5,0,2,4\n35.5,80,1,6,2\n").unwrap();
        assert_eq!(ds.bounds.lat.source, Range::new(10.0, 90.0));
        assert_eq!(ds.bounds.lon.source, Range::new(5.0, 80.0));
        assert_eq!(ds.bounds.lat.target, GeoBounds::NYC.lat);
        assert_eq!(ds.rows, 3);
    }

    #[test]
    fn keeps_only_test_split() {
        let ds = load("10,20,0,1,3\n90,5,1,2,4\n35.5,80,1,6,2\n").unwrap();
        assert_eq!(ds.holdout.len(), 2);
        assert_eq!(ds.holdout[0].input.day_of_week, 2);
        assert_eq!(ds.holdout[1].y, 2.0);
        assert!(ds.holdout.iter().all(|r| r.split == 1));
    }

    #[test]
    fn skips_empty_cells() {
        let ds = load("10,20,0,1,3\n,99,1,2,4\n50,,0,1,1\n").unwrap();
        assert_eq!(ds.bounds.lat.source, Range::new(10.0, 50.0));
        assert_eq!(ds.bounds.lon.source, Range::new(20.0, 99.0));
        assert!(ds.holdout.is_empty());
    }

    #[test]
    fn missing_column_is_fatal() {
        let err = Dataset::from_reader("LATITUDE_SCALED,Split,CRASH DATEDayofweek,y\n1,0,1,1\n".as_bytes(), GeoBounds::NYC)
            .unwrap_err();
        assert!(matches!(err, BoundsError::MissingColumn(ref c) if c == LONGITUDE_SCALED));
    }

    #[test]
    fn non_numeric_cell_is_fatal() {
        let err = load("10,20,0,1,3\nnorth,5,0,2,4\n").unwrap_err();
        assert!(matches!(err, BoundsError::NotNumeric { row: 2, .. }));
    }

    #[test]
    fn out_of_week_day_is_fatal() {
        for body in ["10,20,1,7,3\n", "10,20,1,2.5,3\n"] {
            let err = load(body).unwrap_err();
            assert!(matches!(err, BoundsError::InvalidDay { row: 1, .. }), "{body}: {err}");
        }
    }

    #[test]
    fn constant_column_maps_to_target_min() {
        let ds = load("5,0,0,1,1\n5,100,1,2,2\n").unwrap();
        assert_eq!(ds.bounds.lat.source, Range::new(5.0, 5.0));
        for lat in [0.0, 5.0, 37.0, 100.0] {
            assert_eq!(ds.bounds.marker(lat, 50.0).lat, GeoBounds::NYC.lat.min);
        }
        // the other axis still rescales normally
        assert_eq!(ds.bounds.marker(5.0, 0.0).lon, GeoBounds::NYC.lon.min);
    }

    #[test]
    fn empty_dataset_is_fatal() {
        assert!(matches!(load("").unwrap_err(), BoundsError::EmptyColumn(_)));
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Dataset::load(dir.path().join("nope.csv"), GeoBounds::NYC).unwrap_err();
        assert!(matches!(err, BoundsError::Open { .. }));
    }

    #[test]
    fn loads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{HEADER}0,0,0,0,1\n100,100,1,3,2\n").unwrap();
        let ds = Dataset::load(f.path(), GeoBounds::NYC).unwrap();
        let m = ds.bounds.marker(50.0, 0.0);
        assert!((m.lat - 40.697488).abs() < 1e-6);
        assert_eq!(m.lon, -74.259090);
    }

    #[test]
    fn inverted_observed_range_rejected() {
        let err = Bounds::new(Range::new(5.0, 1.0), Range::new(0.0, 1.0), GeoBounds::NYC).unwrap_err();
        assert!(matches!(err, BoundsError::InvalidRange { .. }));
    }
}
