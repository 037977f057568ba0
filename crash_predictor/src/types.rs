use serde::{Deserialize, Serialize};

use crate::error::{InputError, ModelError};

// Dataset / model column names.
pub const LATITUDE_SCALED: &str = "LATITUDE_SCALED";
pub const LONGITUDE_SCALED: &str = "LONGITUDE_SCALED";
pub const DAY_OF_WEEK: &str = "CRASH DATEDayofweek";
pub const SPLIT: &str = "Split";
pub const TARGET: &str = "y";

/// Model input order when the artifact does not name its features.
pub const FEATURES: [&str; 3] = [LATITUDE_SCALED, LONGITUDE_SCALED, DAY_OF_WEEK];

// Slider domain for the scaled coordinates.
pub const SLIDER_MIN: f64 = 0.0;
pub const SLIDER_MAX: f64 = 100.0;
pub const SLIDER_DEFAULT: f64 = 50.0;
pub const MAX_DAY_OF_WEEK: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub latitude_scaled: f64,
    pub longitude_scaled: f64,
    pub day_of_week: u8,
}

impl PredictionInput {
    /// Rejects anything the page's sliders and selector could not produce.
    pub fn validate(&self) -> Result<(), InputError> {
        for (field, value) in [
            ("latitude_scaled", self.latitude_scaled),
            ("longitude_scaled", self.longitude_scaled),
        ] {
            if !value.is_finite() || !(SLIDER_MIN..=SLIDER_MAX).contains(&value) {
                return Err(InputError::OutOfRange {
                    field,
                    value,
                    min: SLIDER_MIN,
                    max: SLIDER_MAX,
                });
            }
        }
        if self.day_of_week > MAX_DAY_OF_WEEK {
            return Err(InputError::DayOfWeek(self.day_of_week));
        }
        Ok(())
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        match name {
            LATITUDE_SCALED => Some(self.latitude_scaled),
            LONGITUDE_SCALED => Some(self.longitude_scaled),
            DAY_OF_WEEK => Some(f64::from(self.day_of_week)),
            _ => None,
        }
    }

    /// Lays the features out in the model's declared input order.
    pub fn ordered(&self, feat_list: &[String]) -> Result<Vec<f64>, ModelError> {
        feat_list
            .iter()
            .map(|k| {
                self.feature(k)
                    .ok_or_else(|| ModelError::UnknownFeature(k.clone()))
            })
            .collect()
    }
}

/// One row of the cleaned dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrashRecord {
    pub input: PredictionInput,
    pub split: u8,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EchoedInputs {
    pub latitude_scaled: String,
    pub longitude_scaled: String,
    pub day_of_week: String,
}

/// Everything the page renders after "Predict": marker, value, inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionView {
    pub marker: Marker,
    pub prediction: f64,
    pub prediction_display: String,
    pub inputs: EchoedInputs,
}

impl PredictionView {
    pub fn new(input: &PredictionInput, marker: Marker, prediction: f64) -> Self {
        Self {
            marker,
            prediction,
            prediction_display: format!("{prediction:.2}"),
            inputs: EchoedInputs {
                latitude_scaled: format!("{:.4}", input.latitude_scaled),
                longitude_scaled: format!("{:.4}", input.longitude_scaled),
                day_of_week: input.day_of_week.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(lat: f64, lon: f64, day: u8) -> PredictionInput {
        PredictionInput {
            latitude_scaled: lat,
            longitude_scaled: lon,
            day_of_week: day,
        }
    }

    #[test]
    fn validate_accepts_slider_domain() {
        assert!(input(0.0, 100.0, 0).validate().is_ok());
        assert!(input(50.0, 50.0, 6).validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_domain() {
        assert_eq!(input(50.0, 50.0, 7).validate(), Err(InputError::DayOfWeek(7)));
        assert!(matches!(
            input(100.5, 50.0, 1).validate(),
            Err(InputError::OutOfRange { field: "latitude_scaled", .. })
        ));
        assert!(matches!(
            input(50.0, f64::NAN, 1).validate(),
            Err(InputError::OutOfRange { field: "longitude_scaled", .. })
        ));
    }

    #[test]
    fn ordered_follows_feat_list() {
        let feats: Vec<String> = [DAY_OF_WEEK, LATITUDE_SCALED, LONGITUDE_SCALED]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let v = input(1.5, 2.5, 3).ordered(&feats).unwrap();
        assert_eq!(v, vec![3.0, 1.5, 2.5]);
    }

    #[test]
    fn ordered_rejects_unknown_feature() {
        let feats = vec!["HOUR".to_string()];
        let err = input(1.0, 2.0, 3).ordered(&feats).unwrap_err();
        assert!(matches!(err, ModelError::UnknownFeature(ref k) if k == "HOUR"));
    }

    #[test]
    fn view_formats_panels() {
        let v = PredictionView::new(&input(12.345678, 50.0, 4), Marker { lat: 1.0, lon: 2.0 }, 3.14159);
        assert_eq!(v.prediction_display, "3.14");
        assert_eq!(v.inputs.latitude_scaled, "12.3457");
        assert_eq!(v.inputs.longitude_scaled, "50.0000");
        assert_eq!(v.inputs.day_of_week, "4");
    }
}
