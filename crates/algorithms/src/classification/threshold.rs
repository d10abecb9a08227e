//! Fixed-threshold burn classification on index deltas

use firescar_core::{Image, Raster, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evaluation::{confusion_counts, ConfusionCounts};
use crate::imagery::{delta_band, BurnDirection, IndexRegistry};

/// Default thresholds on index deltas
pub const DEFAULT_THRESHOLDS: [(&str, f64); 4] =
    [("NDVI", -0.23), ("EVI", -0.235), ("NBR1", -0.24), ("NBR2", -0.685)];

/// Burned/unburned rule for one index delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnRule {
    pub index: String,
    pub threshold: f64,
    #[serde(default)]
    pub direction: BurnDirection,
}

impl BurnRule {
    pub fn new(index: impl Into<String>, threshold: f64, direction: BurnDirection) -> Self {
        Self {
            index: index.into(),
            threshold,
            direction,
        }
    }

    /// Rule taking the burn direction registered for `index`
    pub fn for_index(registry: &IndexRegistry, index: &str, threshold: f64) -> Result<Self> {
        let direction = registry.get(index)?.burn_direction;
        Ok(Self::new(index, threshold, direction))
    }

    /// 1 when burned, 0 when not, NaN for a missing delta.
    /// Comparisons are strict.
    pub fn apply(&self, delta: f64) -> f64 {
        if delta.is_nan() {
            return f64::NAN;
        }
        let burned = match self.direction {
            BurnDirection::Decrease => delta < self.threshold,
            BurnDirection::Increase => delta > self.threshold,
        };
        if burned {
            1.0
        } else {
            0.0
        }
    }

    /// Classify a delta raster
    pub fn classify(&self, delta: &Raster<f64>) -> Raster<f64> {
        let mut out = delta.map(|v| self.apply(v));
        out.set_nodata(Some(f64::NAN));
        out
    }
}

/// A set of per-index threshold rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdClassifier {
    rules: Vec<BurnRule>,
}

impl ThresholdClassifier {
    pub fn new(rules: Vec<BurnRule>) -> Self {
        Self { rules }
    }

    /// Rules from `(index, threshold)` pairs, directions from the registry
    pub fn from_thresholds<S: AsRef<str>>(registry: &IndexRegistry, thresholds: &[(S, f64)]) -> Result<Self> {
        let rules = thresholds
            .iter()
            .map(|(index, t)| BurnRule::for_index(registry, index.as_ref(), *t))
            .collect::<Result<_>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[BurnRule] {
        &self.rules
    }

    /// Classify a delta stack: one 0/1/NaN band per rule, named after the
    /// index and read from its `<index> delta` band
    pub fn classify(&self, deltas: &Image) -> Result<Image> {
        let mut out = Image::new();
        for rule in &self.rules {
            let delta = deltas.band(&delta_band(&rule.index))?;
            out.push_band(rule.index.as_str(), rule.classify(delta))?;
        }
        Ok(out)
    }
}

/// Score a list of thresholds for one index delta against ground truth
pub fn threshold_sweep(
    delta: &Raster<f64>,
    truth: &Raster<f64>,
    direction: BurnDirection,
    thresholds: &[f64],
    scale: f64,
) -> Result<Vec<(f64, ConfusionCounts)>> {
    thresholds
        .iter()
        .map(|&t| {
            let predicted = BurnRule::new("sweep", t, direction).classify(delta);
            let counts = confusion_counts(&predicted, truth, scale)?;
            debug!(threshold = t, accuracy = counts.accuracy(), "threshold sweep step");
            Ok((t, counts))
        })
        .collect()
}
