use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    bounds::{Bounds, Dataset},
    config::AppConfig,
    error::ModelError,
    model::{self, Predictor},
    types::{CrashRecord, PredictionInput, PredictionView, SLIDER_DEFAULT},
};

/// Built once at start-up and shared read-only by every request.
pub struct Session {
    pub bounds: Bounds,
    pub model: Box<dyn Predictor>,
    pub holdout: Vec<CrashRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub count: usize,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
}

impl Session {
    pub fn new(dataset: Dataset, model: Box<dyn Predictor>) -> Self {
        Self {
            bounds: dataset.bounds,
            model,
            holdout: dataset.holdout,
        }
    }

    /// Loads the dataset and the model named by `cfg`. Any failure here is
    /// fatal for the process.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let geo = cfg.geo_bounds()?;
        let dataset = Dataset::load(&cfg.data_path, geo)
            .with_context(|| format!("failed to load dataset {}", cfg.data_path.display()))?;
        tracing::info!(
            "loaded {} rows ({} held out); lat {:?} -> {:?}, lon {:?} -> {:?}",
            dataset.rows,
            dataset.holdout.len(),
            dataset.bounds.lat.source,
            dataset.bounds.lat.target,
            dataset.bounds.lon.source,
            dataset.bounds.lon.target
        );

        let mdl = model::load(cfg.model_format, &cfg.model_path, cfg.meta_path.as_deref())
            .with_context(|| format!("failed to load model {}", cfg.model_path.display()))?;
        tracing::info!("loaded model; feat_list[{}]: {:?}", mdl.feature_names().len(), mdl.feature_names());

        Ok(Self::new(dataset, mdl))
    }

    /// Runs the model on the default slider position so a broken artifact
    /// fails at start-up rather than on the first click.
    pub fn warmup(&self) -> Result<f64, ModelError> {
        self.model.predict(&PredictionInput {
            latitude_scaled: SLIDER_DEFAULT,
            longitude_scaled: SLIDER_DEFAULT,
            day_of_week: 0,
        })
    }

    pub fn predict(&self, input: &PredictionInput) -> Result<PredictionView, ModelError> {
        let prediction = self.model.predict(input)?;
        let marker = self.bounds.marker(input.latitude_scaled, input.longitude_scaled);
        Ok(PredictionView::new(input, marker, prediction))
    }

    pub fn evaluate(&self) -> Result<Evaluation, ModelError> {
        let count = self.holdout.len();
        if count == 0 {
            return Ok(Evaluation { count, mae: None, rmse: None });
        }
        let mut abs = 0.0;
        let mut sq = 0.0;
        for r in &self.holdout {
            let err = self.model.predict(&r.input)? - r.y;
            abs += err.abs();
            sq += err * err;
        }
        let n = count as f64;
        Ok(Evaluation {
            count,
            mae: Some(abs / n),
            rmse: Some((sq / n).sqrt()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bounds::GeoBounds, rescale::Range};

    /// Predicts `day_of_week + 1` regardless of location.
    struct ByDay(Vec<String>);

    impl Predictor for ByDay {
        fn feature_names(&self) -> &[String] {
            &self.0
        }

        fn predict_row(&self, x: &[f64]) -> Result<f64, ModelError> {
            Ok(x[2] + 1.0)
        }
    }

    fn session(holdout: Vec<CrashRecord>) -> Session {
        let feats = crate::types::FEATURES.iter().map(|s| s.to_string()).collect();
        Session {
            bounds: Bounds::new(Range::new(0.0, 100.0), Range::new(0.0, 100.0), GeoBounds::NYC).unwrap(),
            model: Box::new(ByDay(feats)),
            holdout,
        }
    }

    fn record(day: u8, y: f64) -> CrashRecord {
        CrashRecord {
            input: PredictionInput {
                latitude_scaled: 1.0,
                longitude_scaled: 2.0,
                day_of_week: day,
            },
            split: 1,
            y,
        }
    }

    #[test]
    fn predict_builds_all_panels() {
        let s = session(vec![]);
        let view = s
            .predict(&PredictionInput {
                latitude_scaled: 50.0,
                longitude_scaled: 0.0,
                day_of_week: 3,
            })
            .unwrap();
        assert_eq!(view.prediction, 4.0);
        assert_eq!(view.prediction_display, "4.00");
        assert!((view.marker.lat - 40.697488).abs() < 1e-6);
        assert_eq!(view.marker.lon, -74.259090);
        assert_eq!(view.inputs.day_of_week, "3");
    }

    #[test]
    fn warmup_runs_model() {
        assert_eq!(session(vec![]).warmup().unwrap(), 1.0);
    }

    #[test]
    fn evaluate_reports_errors() {
        // predictions: 1, 3 ; truths: 2, 0 -> errors -1, 3
        let s = session(vec![record(0, 2.0), record(2, 0.0)]);
        let e = s.evaluate().unwrap();
        assert_eq!(e.count, 2);
        assert_eq!(e.mae, Some(2.0));
        assert!((e.rmse.unwrap() - 5.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn evaluate_empty_holdout() {
        let e = session(vec![]).evaluate().unwrap();
        assert_eq!(e, Evaluation { count: 0, mae: None, rmse: None });
    }
}
