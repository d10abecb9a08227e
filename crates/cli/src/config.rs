//! Run configuration and scene catalog loading

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use firescar_algorithms::classification::{ClassifierKind, DEFAULT_THRESHOLDS};
use firescar_algorithms::imagery::{
    BurnDirection, CompositeParams, DeltaParams, ImageCollection, IndexRegistry, Kernel, Scene, DEFAULT_INDICES,
    S2_BANDS, STD_BANDS,
};
use firescar_algorithms::pipeline::{FireEvent, FireJob, PipelineConfig, SamplingPlan};
use firescar_algorithms::sampling::SampleParams;
use firescar_core::io::read_geotiff;
use firescar_core::vector::{parse_fire_timestamp, read_fire_records, GeometrySpec};
use firescar_core::{FireRecord, Image, Raster, Region};

// ─── Configuration file ─────────────────────────────────────────────────

/// Top-level JSON configuration of `firescar run`.
///
/// Relative paths are resolved against the directory of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// JSON file of fire-perimeter records
    pub fire_records: PathBuf,
    pub fires: Vec<FireSpec>,
    #[serde(default = "default_deltas")]
    pub deltas: Vec<u32>,
    #[serde(default = "default_indices")]
    pub indices: Vec<String>,
    #[serde(default)]
    pub custom_indices: Vec<CustomIndex>,
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<ThresholdSpec>,
    /// Threshold lists to sweep, keyed by index
    #[serde(default)]
    pub sweeps: BTreeMap<String, Vec<f64>>,
    #[serde(default = "default_classifiers")]
    pub classifiers: Vec<String>,
    #[serde(default)]
    pub sampling: SamplingPlan,
    #[serde(default = "default_training_seed")]
    pub training_seed: u64,
    #[serde(default = "default_validation_seed")]
    pub validation_seed: u64,
    #[serde(default = "default_sample_scale")]
    pub sample_scale: f64,
    #[serde(default = "default_evaluation_scale")]
    pub evaluation_scale: f64,
    #[serde(default = "default_reflectance_scale")]
    pub reflectance_scale: f64,
    #[serde(default = "default_source_bands")]
    pub source_bands: Vec<String>,
    #[serde(default = "default_target_bands")]
    pub target_bands: Vec<String>,
    #[serde(default = "default_true")]
    pub include_pre: bool,
    #[serde(default = "default_true")]
    pub include_post: bool,
    #[serde(default = "default_true")]
    pub blur: bool,
    /// Write delta, classification and confusion GeoTIFFs next to the report
    #[serde(default = "default_true")]
    pub write_rasters: bool,
}

/// One fire to analyse
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FireSpec {
    pub name: String,
    /// `yyyy-MM-dd HH:mm:ss.SSS`, UTC
    pub start: String,
    pub end: String,
    /// General fire area
    pub region: GeometrySpec,
    /// JSON scene catalog
    pub scenes: PathBuf,
    /// Land-cover GeoTIFF on the scene grid, for stratified sampling
    #[serde(default)]
    pub landcover: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomIndex {
    pub name: String,
    pub formula: String,
    #[serde(default)]
    pub burn_direction: BurnDirection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdSpec {
    pub index: String,
    pub threshold: f64,
}

fn default_deltas() -> Vec<u32> {
    vec![10]
}

fn default_indices() -> Vec<String> {
    DEFAULT_INDICES.iter().map(|s| s.to_string()).collect()
}

fn default_thresholds() -> Vec<ThresholdSpec> {
    DEFAULT_THRESHOLDS
        .iter()
        .map(|&(index, threshold)| ThresholdSpec {
            index: index.to_string(),
            threshold,
        })
        .collect()
}

fn default_classifiers() -> Vec<String> {
    PipelineConfig::default().classifiers.iter().map(|k| k.to_string()).collect()
}

fn default_training_seed() -> u64 {
    42
}

fn default_validation_seed() -> u64 {
    43
}

fn default_sample_scale() -> f64 {
    10.0
}

fn default_evaluation_scale() -> f64 {
    30.0
}

fn default_reflectance_scale() -> f64 {
    10000.0
}

fn default_source_bands() -> Vec<String> {
    S2_BANDS.iter().map(|s| s.to_string()).collect()
}

fn default_target_bands() -> Vec<String> {
    STD_BANDS.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    /// Read and parse a config file, resolving its relative paths
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: RunConfig =
            serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        self.fire_records = base.join(&self.fire_records);
        for fire in &mut self.fires {
            fire.scenes = base.join(&fire.scenes);
            if let Some(lc) = &fire.landcover {
                fire.landcover = Some(base.join(lc));
            }
        }
    }

    /// Built-in indices plus the configured custom ones
    pub fn registry(&self) -> Result<IndexRegistry> {
        let mut registry = IndexRegistry::builtin();
        for custom in &self.custom_indices {
            registry
                .register(&custom.name, &custom.formula, custom.burn_direction)
                .with_context(|| format!("Invalid custom index '{}'", custom.name))?;
        }
        Ok(registry)
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        if self.deltas.is_empty() {
            bail!("'deltas' must list at least one window length");
        }
        let classifiers = self
            .classifiers
            .iter()
            .map(|name| name.parse::<ClassifierKind>())
            .collect::<firescar_core::Result<Vec<_>>>()
            .context("Invalid classifier list")?;

        Ok(PipelineConfig {
            deltas: self.deltas.clone(),
            indices: self.indices.clone(),
            composite: CompositeParams {
                source_bands: self.source_bands.clone(),
                target_bands: self.target_bands.clone(),
                reflectance_scale: self.reflectance_scale,
            },
            delta: DeltaParams {
                include_pre: self.include_pre,
                include_post: self.include_post,
                blur: self.blur.then(Kernel::ring_blur),
            },
            thresholds: self.thresholds.iter().map(|t| (t.index.clone(), t.threshold)).collect(),
            sweeps: self.sweeps.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            classifiers,
            sampling: self.sampling.clone(),
            training: SampleParams {
                scale: self.sample_scale,
                seed: self.training_seed,
            },
            validation: SampleParams {
                scale: self.sample_scale,
                seed: self.validation_seed,
            },
            evaluation_scale: self.evaluation_scale,
        })
    }

    pub fn load_records(&self) -> Result<Vec<FireRecord>> {
        read_fire_records(&self.fire_records)
            .with_context(|| format!("Failed to read fire records {}", self.fire_records.display()))
    }

    /// Load every fire's scenes and land cover
    pub fn load_jobs(&self) -> Result<Vec<FireJob>> {
        self.fires.iter().map(FireSpec::load).collect()
    }
}

impl FireSpec {
    pub fn event(&self) -> Result<FireEvent> {
        let start = parse_fire_timestamp("start", &self.start).with_context(|| format!("Fire '{}'", self.name))?;
        let end = parse_fire_timestamp("end", &self.end).with_context(|| format!("Fire '{}'", self.name))?;
        if end < start {
            bail!("Fire '{}' ends before it starts", self.name);
        }
        Ok(FireEvent::new(&self.name, start, end, Region::new(self.region.to_geometry())))
    }

    pub fn load(&self) -> Result<FireJob> {
        let event = self.event()?;
        let scenes = load_catalog(&self.scenes)?;
        let mut job = FireJob::new(event, scenes);
        if let Some(path) = &self.landcover {
            let landcover: Raster<f64> =
                read_geotiff(path).with_context(|| format!("Failed to read land cover {}", path.display()))?;
            job = job.with_landcover(landcover);
        }
        Ok(job)
    }
}

// ─── Scene catalog ──────────────────────────────────────────────────────

/// One catalog entry: an acquisition and one GeoTIFF per band
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneEntry {
    pub id: String,
    /// RFC 3339 acquisition time
    pub acquired: DateTime<Utc>,
    pub bands: BTreeMap<String, PathBuf>,
}

/// Read a JSON catalog (an array of [`SceneEntry`]) and its band files.
/// Band paths are relative to the catalog.
pub fn load_catalog(path: &Path) -> Result<ImageCollection> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let entries: Vec<SceneEntry> =
        serde_json::from_str(&text).with_context(|| format!("Invalid catalog {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut collection = ImageCollection::default();
    for entry in entries {
        let mut image = Image::new();
        for (band, file) in &entry.bands {
            let file = base.join(file);
            let raster: Raster<f64> =
                read_geotiff(&file).with_context(|| format!("Scene '{}': failed to read {}", entry.id, file.display()))?;
            image
                .push_band(band.as_str(), raster)
                .with_context(|| format!("Scene '{}': band {} does not fit", entry.id, band))?;
        }
        collection.push(Scene::new(entry.id, entry.acquired, image));
    }
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use firescar_core::io::write_geotiff;
    use firescar_core::GeoTransform;

    const MINIMAL: &str = r#"{
        "fire_records": "fires.json",
        "fires": [{
            "name": "Sever do Vouga",
            "start": "2016-08-08 04:09:00.000",
            "end": "2016-08-16 12:01:00.000",
            "region": {"type": "Polygon", "coordinates": [[[0,0],[100,0],[100,100],[0,100],[0,0]]]},
            "scenes": "scenes/catalog.json"
        }]
    }"#;

    #[test]
    fn defaults_follow_the_reference_runs() {
        let config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        let pipeline = config.pipeline_config().unwrap();

        assert_eq!(pipeline.deltas, vec![10]);
        assert_eq!(pipeline.indices, vec!["NDVI", "MIRBI", "NBR", "NBR4", "BAI"]);
        assert_eq!(pipeline.composite.reflectance_scale, 10000.0);
        assert_eq!(pipeline.thresholds[0], ("NDVI".to_string(), -0.23));
        assert_eq!(pipeline.training.seed, 42);
        assert_eq!(pipeline.validation.seed, 43);
        assert_eq!(pipeline.evaluation_scale, 30.0);
        assert_eq!(pipeline.sampling, SamplingPlan::Uniform { count: 15000 });
        assert!(pipeline.delta.blur.is_some());
        assert_eq!(pipeline.classifiers.len(), 4);
    }

    #[test]
    fn paths_resolve_against_config_dir() {
        let mut config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/data/run"));
        assert_eq!(config.fire_records, PathBuf::from("/data/run/fires.json"));
        assert_eq!(config.fires[0].scenes, PathBuf::from("/data/run/scenes/catalog.json"));
    }

    #[test]
    fn unknown_classifier_is_rejected() {
        let mut config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        config.classifiers = vec!["cart".into(), "neural_net".into()];
        assert!(config.pipeline_config().is_err());
    }

    #[test]
    fn custom_index_joins_registry() {
        let mut config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        config.custom_indices.push(CustomIndex {
            name: "GNDVI".into(),
            formula: "(NIR - GREEN) / (NIR + GREEN)".into(),
            burn_direction: BurnDirection::Decrease,
        });
        assert!(config.registry().unwrap().contains("GNDVI"));
    }

    #[test]
    fn fire_event_needs_valid_dates() {
        let mut config: RunConfig = serde_json::from_str(MINIMAL).unwrap();
        assert!(config.fires[0].event().is_ok());
        config.fires[0].end = "2016-08-16".into();
        assert!(config.fires[0].event().is_err());
    }

    #[test]
    fn catalog_loads_band_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut band = Raster::filled(3, 4, 1200.0);
        band.set_transform(GeoTransform::new(556_000.0, 4_460_030.0, 10.0, -10.0));
        write_geotiff(&band, dir.path().join("b4.tif")).unwrap();
        write_geotiff(&band, dir.path().join("b8.tif")).unwrap();
        let catalog = dir.path().join("catalog.json");
        std::fs::write(
            &catalog,
            r#"[{"id": "S2A_20160801", "acquired": "2016-08-01T11:20:00Z",
                 "bands": {"B4": "b4.tif", "B8": "b8.tif"}}]"#,
        )
        .unwrap();

        let collection = load_catalog(&catalog).unwrap();
        assert_eq!(collection.len(), 1);
        let scene = &collection.scenes()[0];
        assert_eq!(scene.image.band_names(), &["B4".to_string(), "B8".to_string()]);
        assert_eq!(scene.image.shape(), Some((3, 4)));

        let transform = scene.image.transform().unwrap();
        assert_eq!(transform.origin_x, 556_000.0);
        assert_eq!(transform.origin_y, 4_460_030.0);
        assert_eq!(transform.cell_size(), 10.0);
    }
}
