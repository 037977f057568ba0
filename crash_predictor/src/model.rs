use serde::Deserialize;
use std::{fs, path::Path, str::FromStr};

use crate::{
    error::ModelError,
    types::{PredictionInput, FEATURES},
};

/// The one thing the service needs from a trained model.
pub trait Predictor: Send + Sync {
    /// Input columns, in the order `predict_row` expects them.
    fn feature_names(&self) -> &[String];

    fn predict_row(&self, x: &[f64]) -> Result<f64, ModelError>;

    fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError> {
        let x = input.ordered(self.feature_names())?;
        self.predict_row(&x)
    }
}

/// The model must take exactly the three dataset features, each once, in any
/// order.
fn check_feature_list(feat_list: &[String]) -> Result<(), ModelError> {
    let complete = feat_list.len() == FEATURES.len()
        && FEATURES
            .iter()
            .all(|f| feat_list.iter().filter(|k| k.as_str() == *f).count() == 1);
    if !complete {
        return Err(ModelError::Malformed(format!(
            "model inputs {:?} are not exactly {:?}",
            feat_list, FEATURES
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// JSON export of an oblivious gradient-boosted tree ensemble.
    Trees,
    /// TorchScript module plus `meta.json` (needs the `torch` feature).
    TorchScript,
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trees" | "catboost" | "json" => Ok(Self::Trees),
            "torchscript" | "torch" => Ok(Self::TorchScript),
            other => Err(format!("unknown model format `{other}`")),
        }
    }
}

pub fn load(format: ModelFormat, model_path: &Path, meta_path: Option<&Path>) -> Result<Box<dyn Predictor>, ModelError> {
    match format {
        ModelFormat::Trees => Ok(Box::new(ObliviousTrees::load(model_path)?)),
        #[cfg(feature = "torch")]
        ModelFormat::TorchScript => {
            let meta = meta_path.ok_or_else(|| ModelError::Malformed("META_PATH is required for torchscript models".into()))?;
            Ok(Box::new(torch::TorchScript::load(model_path, meta)?))
        }
        #[cfg(not(feature = "torch"))]
        ModelFormat::TorchScript => {
            let _ = meta_path;
            Err(ModelError::Malformed(
                "torchscript support not compiled in (enable the `torch` feature)".into(),
            ))
        }
    }
}

// ---------- Oblivious tree ensemble ----------

#[derive(Deserialize)]
struct TreesJson {
    features_info: FeaturesInfo,
    oblivious_trees: Vec<TreeJson>,
    #[serde(default)]
    scale_and_bias: Option<ScaleAndBias>,
}

#[derive(Deserialize)]
struct FeaturesInfo {
    #[serde(default)]
    float_features: Vec<FloatFeature>,
}

#[derive(Deserialize)]
struct FloatFeature {
    feature_index: usize,
    #[serde(default)]
    feature_name: Option<String>,
}

#[derive(Deserialize)]
struct TreeJson {
    leaf_values: Vec<f64>,
    splits: Vec<SplitJson>,
}

#[derive(Deserialize)]
struct SplitJson {
    border: f64,
    float_feature_index: usize,
}

// Older exports write `[scale, bias]`, newer ones `[scale, [bias]]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScaleAndBias {
    Scalar(f64, f64),
    PerDim(f64, Vec<f64>),
}

impl ScaleAndBias {
    fn pair(&self) -> (f64, f64) {
        match self {
            Self::Scalar(s, b) => (*s, *b),
            Self::PerDim(s, b) => (*s, b.first().copied().unwrap_or(0.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub feature: usize,
    pub border: f64,
}

/// Every node at one depth shares a split, so a tree of depth `d` is `d`
/// splits and `2^d` leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct ObliviousTree {
    pub splits: Vec<Split>,
    pub leaf_values: Vec<f64>,
}

impl ObliviousTree {
    /// Bit `j` of the leaf index is set when split `j` says `x > border`.
    pub fn leaf_index(&self, x: &[f64]) -> usize {
        self.splits
            .iter()
            .enumerate()
            .fold(0, |idx, (j, s)| idx | (usize::from(x[s.feature] > s.border) << j))
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        self.leaf_values[self.leaf_index(x)]
    }
}

#[derive(Debug, Clone)]
pub struct ObliviousTrees {
    feat_list: Vec<String>,
    trees: Vec<ObliviousTree>,
    scale: f64,
    bias: f64,
}

impl ObliviousTrees {
    pub fn new(feat_list: Vec<String>, trees: Vec<ObliviousTree>, scale: f64, bias: f64) -> Result<Self, ModelError> {
        check_feature_list(&feat_list)?;
        for (i, t) in trees.iter().enumerate() {
            if t.splits.len() >= usize::BITS as usize {
                return Err(ModelError::Malformed(format!("tree {i} is too deep")));
            }
            let want = 1usize << t.splits.len();
            if t.leaf_values.len() != want {
                return Err(ModelError::Malformed(format!(
                    "tree {i}: {} leaves for depth {}, expected {want}",
                    t.leaf_values.len(),
                    t.splits.len()
                )));
            }
            if let Some(s) = t.splits.iter().find(|s| s.feature >= feat_list.len()) {
                return Err(ModelError::Malformed(format!(
                    "tree {i} splits on feature {} but the model has {}",
                    s.feature,
                    feat_list.len()
                )));
            }
        }
        Ok(Self { feat_list, trees, scale, bias })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let txt = fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&txt)
    }

    pub fn from_json(txt: &str) -> Result<Self, ModelError> {
        let raw: TreesJson = serde_json::from_str(txt)?;

        let mut floats = raw.features_info.float_features;
        if floats.is_empty() {
            return Err(ModelError::Malformed("model declares no float features".into()));
        }
        floats.sort_by_key(|f| f.feature_index);
        if floats.iter().enumerate().any(|(i, f)| f.feature_index != i) {
            return Err(ModelError::Malformed("float feature indices are not contiguous".into()));
        }
        let feat_list = floats
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                f.feature_name
                    .or_else(|| FEATURES.get(i).map(|s| s.to_string()))
                    .ok_or_else(|| ModelError::Malformed(format!("float feature {i} has no name")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let trees = raw
            .oblivious_trees
            .into_iter()
            .map(|t| ObliviousTree {
                splits: t
                    .splits
                    .into_iter()
                    .map(|s| Split {
                        feature: s.float_feature_index,
                        border: s.border,
                    })
                    .collect(),
                leaf_values: t.leaf_values,
            })
            .collect();

        let (scale, bias) = raw.scale_and_bias.map(|sb| sb.pair()).unwrap_or((1.0, 0.0));
        Self::new(feat_list, trees, scale, bias)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Predictor for ObliviousTrees {
    fn feature_names(&self) -> &[String] {
        &self.feat_list
    }

    fn predict_row(&self, x: &[f64]) -> Result<f64, ModelError> {
        if x.len() != self.feat_list.len() {
            return Err(ModelError::FeatureMismatch {
                got: x.len(),
                expected: self.feat_list.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.eval(x)).sum();
        Ok(self.scale * sum + self.bias)
    }
}

// ---------- TorchScript ----------

#[cfg(feature = "torch")]
mod torch {
    use super::*;
    use tch::{kind::Kind, CModule, Device, Tensor};

    #[derive(Deserialize)]
    struct MetaJson {
        feat_list: Vec<String>,
        in_dim: Option<usize>,
    }

    pub struct TorchScript {
        model: CModule,
        device: Device,
        feat_list: Vec<String>,
    }

    impl TorchScript {
        pub fn load(model_path: &Path, meta_path: &Path) -> Result<Self, ModelError> {
            let device = Device::Cpu;

            let meta_txt = fs::read_to_string(meta_path).map_err(|source| ModelError::Read {
                path: meta_path.to_path_buf(),
                source,
            })?;
            let meta: MetaJson = serde_json::from_str(&meta_txt)?;
            let in_dim = meta.in_dim.unwrap_or(meta.feat_list.len());
            if in_dim != meta.feat_list.len() {
                return Err(ModelError::FeatureMismatch {
                    got: meta.feat_list.len(),
                    expected: in_dim,
                });
            }

            check_feature_list(&meta.feat_list)?;

            let model = CModule::load_on_device(model_path, device)?;

            // Probe output shape with a dummy forward.
            let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            if t.numel() == 0 {
                return Err(ModelError::EmptyOutput);
            }

            Ok(Self {
                model,
                device,
                feat_list: meta.feat_list,
            })
        }
    }

    impl Predictor for TorchScript {
        fn feature_names(&self) -> &[String] {
            &self.feat_list
        }

        fn predict_row(&self, x: &[f64]) -> Result<f64, ModelError> {
            let n = self.feat_list.len();
            if x.len() != n {
                return Err(ModelError::FeatureMismatch { got: x.len(), expected: n });
            }
            let xs: Vec<f32> = x.iter().map(|v| *v as f32).collect();
            let input = Tensor::from_slice(&xs).reshape([1, n as i64]).to_device(self.device);

            let t = self.model.forward_ts(&[input])?;
            if t.numel() == 0 {
                return Err(ModelError::EmptyOutput);
            }
            // First prediction of the single-row batch.
            Ok(t.flatten(0, -1).double_value(&[0]))
        }
    }
}
