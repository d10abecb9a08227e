//! Per-fire orchestration
//!
//! A [`FirePipeline`] turns one fire event plus its scenes into a
//! [`FireAnalysis`] (composites, delta stack, ground truth), then scores
//! threshold rules and trained classifiers against the ground truth. Every
//! stage returns its results; nothing is accumulated across fires.

use chrono::{DateTime, Utc};
use firescar_core::{Error, FireRecord, GridSpec, Image, Mask, Raster, Region, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classification::{
    classify_image, threshold_sweep, ClassifierKind, ThresholdClassifier, DEFAULT_THRESHOLDS,
};
use crate::evaluation::{confusion_counts, confusion_image, ConfusionCounts};
use crate::fire::{filter_fire_records, fire_windows, ground_truth, invalid_zone_mask, FilteredFires, TimeWindow, CLASS_BAND};
use crate::imagery::{
    build_composite, compute_indices, delta_band, delta_stack, CompositeParams, DeltaParams, ImageCollection,
    IndexRegistry, Kernel, DEFAULT_INDICES,
};
use crate::maybe_rayon::*;
use crate::sampling::{
    burn_landcover_strata, sample_stratified, sample_uniform, stratum_histogram, targets_from_histogram,
    SampleParams, SampleSet,
};

/// A fire to analyse
#[derive(Debug, Clone)]
pub struct FireEvent {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// General fire area
    pub region: Region,
}

impl FireEvent {
    pub fn new(name: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>, region: Region) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            region,
        }
    }
}

/// Everything one fire needs besides the shared fire records
#[derive(Debug, Clone)]
pub struct FireJob {
    pub event: FireEvent,
    pub scenes: ImageCollection,
    /// Land-cover classes on the analysis grid, for stratified sampling
    pub landcover: Option<Raster<f64>>,
}

impl FireJob {
    pub fn new(event: FireEvent, scenes: ImageCollection) -> Self {
        Self {
            event,
            scenes,
            landcover: None,
        }
    }

    pub fn with_landcover(mut self, landcover: Raster<f64>) -> Self {
        self.landcover = Some(landcover);
        self
    }
}

/// How training and validation pixels are drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingPlan {
    /// `count` pixels uniformly from the fire area
    Uniform { count: usize },
    /// Land cover crossed with burn class, each stratum's target being its
    /// pixel count at `histogram_scale` times a factor
    Stratified {
        training_factor: f64,
        validation_factor: f64,
        histogram_scale: f64,
    },
}

impl Default for SamplingPlan {
    fn default() -> Self {
        SamplingPlan::Uniform { count: 15000 }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window lengths in days; each one is a separate analysis
    pub deltas: Vec<u32>,
    /// Indices stacked for classification
    pub indices: Vec<String>,
    pub composite: CompositeParams,
    pub delta: DeltaParams,
    /// `(index, threshold)` rules scored on the delta bands
    pub thresholds: Vec<(String, f64)>,
    /// Threshold lists swept per index
    pub sweeps: Vec<(String, Vec<f64>)>,
    pub classifiers: Vec<ClassifierKind>,
    pub sampling: SamplingPlan,
    pub training: SampleParams,
    pub validation: SampleParams,
    /// Resolution of the confusion counts, in map units
    pub evaluation_scale: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deltas: vec![10],
            indices: DEFAULT_INDICES.iter().map(|s| s.to_string()).collect(),
            composite: CompositeParams::default(),
            delta: DeltaParams {
                blur: Some(Kernel::ring_blur()),
                ..DeltaParams::default()
            },
            thresholds: DEFAULT_THRESHOLDS.iter().map(|&(i, t)| (i.to_string(), t)).collect(),
            sweeps: Vec::new(),
            classifiers: vec![
                ClassifierKind::Cart,
                ClassifierKind::ContinuousNaiveBayes,
                ClassifierKind::MaxEnt,
                ClassifierKind::RandomForest,
            ],
            sampling: SamplingPlan::default(),
            training: SampleParams { scale: 10.0, seed: 42 },
            validation: SampleParams { scale: 10.0, seed: 43 },
            evaluation_scale: 30.0,
        }
    }
}

impl PipelineConfig {
    /// Configured indices followed by any other index a threshold rule or
    /// sweep refers to
    pub fn required_indices(&self) -> Vec<String> {
        let mut names = self.indices.clone();
        let extra = self
            .thresholds
            .iter()
            .map(|(index, _)| index)
            .chain(self.sweeps.iter().map(|(index, _)| index));
        for index in extra {
            if !names.contains(index) {
                names.push(index.clone());
            }
        }
        names
    }
}

/// Everything derived for one fire and one window length
#[derive(Debug, Clone)]
pub struct FireAnalysis {
    pub fire: String,
    pub delta_days: u32,
    pub pre_window: TimeWindow,
    pub post_window: TimeWindow,
    pub filtered: FilteredFires,
    /// Invalid-zone mask
    pub mask: Mask,
    /// Indices of the pre-fire composite
    pub pre: Image,
    /// Indices of the post-fire composite
    pub post: Image,
    /// Deltas plus the optional pre, post and blurred bands
    pub stack: Image,
    /// Ground truth, band [`CLASS_BAND`]
    pub truth: Raster<f64>,
}

impl FireAnalysis {
    /// Delta stack with the ground truth appended as the label band
    pub fn labelled_stack(&self) -> Result<Image> {
        self.stack.clone().with_band(CLASS_BAND, self.truth.clone())
    }
}

/// Confusion counts with their derived statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    #[serde(flatten)]
    pub counts: ConfusionCounts,
    pub accuracy: f64,
    pub kappa: f64,
}

impl From<ConfusionCounts> for Score {
    fn from(counts: ConfusionCounts) -> Self {
        Self {
            counts,
            accuracy: counts.accuracy(),
            kappa: counts.kappa(),
        }
    }
}

/// Score of one threshold rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdScore {
    pub index: String,
    pub threshold: f64,
    pub score: Score,
}

/// One step of a threshold sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepStep {
    pub threshold: f64,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    pub index: String,
    pub steps: Vec<SweepStep>,
}

/// Threshold classification of one analysis
#[derive(Debug, Clone)]
pub struct ThresholdEvaluation {
    /// One 0/1 band per rule, named after the index
    pub classified: Image,
    /// One 0..3 confusion band per rule
    pub confusion: Image,
    pub scores: Vec<ThresholdScore>,
    pub sweeps: Vec<SweepResult>,
}

/// Result of training and applying one classifier
#[derive(Debug, Clone)]
pub enum ClassifierOutcome {
    Trained {
        kind: ClassifierKind,
        classified: Raster<f64>,
        /// Classified scene against the ground truth
        scene: ConfusionCounts,
        /// Resubstitution matrix on the training samples
        training: ConfusionCounts,
        /// Error matrix on the validation samples
        validation: ConfusionCounts,
    },
    Failed {
        kind: ClassifierKind,
        error: String,
    },
}

impl ClassifierOutcome {
    pub fn kind(&self) -> ClassifierKind {
        match self {
            ClassifierOutcome::Trained { kind, .. } | ClassifierOutcome::Failed { kind, .. } => *kind,
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, ClassifierOutcome::Trained { .. })
    }

    pub fn report(&self) -> ClassifierReport {
        match self {
            ClassifierOutcome::Trained {
                kind,
                scene,
                training,
                validation,
                ..
            } => ClassifierReport::Trained {
                kind: *kind,
                scene: (*scene).into(),
                training: (*training).into(),
                validation: (*validation).into(),
            },
            ClassifierOutcome::Failed { kind, error } => ClassifierReport::Failed {
                kind: *kind,
                error: error.clone(),
            },
        }
    }
}

/// Serializable form of a [`ClassifierOutcome`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassifierReport {
    Trained {
        kind: ClassifierKind,
        scene: Score,
        training: Score,
        validation: Score,
    },
    Failed {
        kind: ClassifierKind,
        error: String,
    },
}

/// Analysis and evaluations for one fire and one window length
#[derive(Debug, Clone)]
pub struct DeltaRun {
    pub analysis: FireAnalysis,
    pub thresholds: ThresholdEvaluation,
    pub classifiers: Vec<ClassifierOutcome>,
}

/// Serializable summary of a [`DeltaRun`]
#[derive(Debug, Clone, Serialize)]
pub struct DeltaReport {
    pub pre_window: String,
    pub post_window: String,
    pub fires_in_scope: usize,
    pub invalid_records: usize,
    pub masked_cells: usize,
    pub thresholds: Vec<ThresholdScore>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sweeps: Vec<SweepResult>,
    pub classifiers: Vec<ClassifierReport>,
}

impl DeltaRun {
    pub fn report(&self) -> DeltaReport {
        let (rows, cols) = self.analysis.mask.shape();
        DeltaReport {
            pre_window: self.analysis.pre_window.to_string(),
            post_window: self.analysis.post_window.to_string(),
            fires_in_scope: self.analysis.filtered.in_scope.len(),
            invalid_records: self.analysis.filtered.invalid.len(),
            masked_cells: rows * cols - self.analysis.mask.kept_count(),
            thresholds: self.thresholds.scores.clone(),
            sweeps: self.thresholds.sweeps.clone(),
            classifiers: self.classifiers.iter().map(ClassifierOutcome::report).collect(),
        }
    }
}

/// One unit of a batch: a fire at one window length
#[derive(Debug)]
pub struct FireRun {
    pub fire: String,
    pub delta_days: u32,
    pub outcome: Result<DeltaRun>,
}

/// Serializable summary of a [`FireRun`]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub fire: String,
    pub delta_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DeltaReport>,
}

impl FireRun {
    pub fn report(&self) -> RunReport {
        let (error, result) = match &self.outcome {
            Ok(run) => (None, Some(run.report())),
            Err(e) => (Some(e.to_string()), None),
        };
        RunReport {
            fire: self.fire.clone(),
            delta_days: self.delta_days,
            error,
            result,
        }
    }
}

/// Burned-area analysis driver
#[derive(Debug, Clone, Default)]
pub struct FirePipeline {
    config: PipelineConfig,
    registry: IndexRegistry,
}

impl FirePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            registry: IndexRegistry::builtin(),
        }
    }

    /// Use a registry with custom indices
    pub fn with_registry(mut self, registry: IndexRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Build the analysis of one fire for one window length.
    ///
    /// # Errors
    /// [`Error::EmptyComposite`] when either window has no scene; index and
    /// band lookup errors from the registry.
    pub fn run(&self, job: &FireJob, records: &[FireRecord], delta_days: u32) -> Result<FireAnalysis> {
        let event = &job.event;
        let (pre_window, post_window) = fire_windows(event.start, event.end, delta_days)?;
        let grid = scene_grid(&job.scenes, &pre_window)?;

        let filtered = filter_fire_records(records, &event.region, event.end, delta_days);
        if !filtered.invalid.is_empty() {
            warn!(
                fire = %event.name,
                invalid = filtered.invalid.len(),
                "fire records with unusable dates are masked out"
            );
        }
        let mask = invalid_zone_mask(&filtered.invalid, &grid);

        let pre_composite = build_composite(&job.scenes, &pre_window, &event.region, &mask, &self.config.composite)?;
        let post_composite = build_composite(&job.scenes, &post_window, &event.region, &mask, &self.config.composite)?;

        let indices = self.config.required_indices();
        let pre = compute_indices(&self.registry, &pre_composite, &indices)?;
        let post = compute_indices(&self.registry, &post_composite, &indices)?;
        let stack = delta_stack(&pre, &post, &self.config.delta)?;
        let truth = ground_truth(&filtered.in_scope, &grid, &event.region, &mask)?;

        debug!(
            fire = %event.name,
            delta_days,
            bands = stack.len(),
            "analysis stack built"
        );

        Ok(FireAnalysis {
            fire: event.name.clone(),
            delta_days,
            pre_window,
            post_window,
            filtered,
            mask,
            pre,
            post,
            stack,
            truth,
        })
    }

    /// Apply the configured threshold rules and sweeps
    pub fn evaluate_thresholds(&self, analysis: &FireAnalysis) -> Result<ThresholdEvaluation> {
        let rules = ThresholdClassifier::from_thresholds(&self.registry, &self.config.thresholds)?;
        let classified = rules.classify(&analysis.stack)?;
        let scale = self.config.evaluation_scale;

        let mut confusion = Image::new();
        let mut scores = Vec::with_capacity(rules.rules().len());
        for rule in rules.rules() {
            let band = classified.band(&rule.index)?;
            let counts = confusion_counts(band, &analysis.truth, scale)?;
            info!(
                fire = %analysis.fire,
                delta_days = analysis.delta_days,
                index = %rule.index,
                threshold = rule.threshold,
                accuracy = counts.accuracy(),
                kappa = counts.kappa(),
                "threshold scored"
            );
            confusion.push_band(rule.index.as_str(), confusion_image(band, &analysis.truth)?)?;
            scores.push(ThresholdScore {
                index: rule.index.clone(),
                threshold: rule.threshold,
                score: counts.into(),
            });
        }

        let mut sweeps = Vec::with_capacity(self.config.sweeps.len());
        for (index, thresholds) in &self.config.sweeps {
            let direction = self.registry.get(index)?.burn_direction;
            let delta = analysis.stack.band(&delta_band(index))?;
            let steps = threshold_sweep(delta, &analysis.truth, direction, thresholds, scale)?
                .into_iter()
                .map(|(threshold, counts)| SweepStep {
                    threshold,
                    score: counts.into(),
                })
                .collect();
            sweeps.push(SweepResult {
                index: index.clone(),
                steps,
            });
        }

        Ok(ThresholdEvaluation {
            classified,
            confusion,
            scores,
            sweeps,
        })
    }

    /// Draw samples, then train and score every configured classifier.
    ///
    /// Failures are per classifier: a sampling failure fails every
    /// classifier with the same reason, a training failure only its own.
    pub fn evaluate_classifiers(&self, analysis: &FireAnalysis, landcover: Option<&Raster<f64>>) -> Vec<ClassifierOutcome> {
        if self.config.classifiers.is_empty() {
            return Vec::new();
        }
        let samples = analysis
            .labelled_stack()
            .and_then(|image| self.draw_samples(&image, &analysis.truth, landcover));
        let (training, validation) = match samples {
            Ok(sets) => sets,
            Err(e) => {
                warn!(fire = %analysis.fire, error = %e, "sampling failed");
                let error = e.to_string();
                return self
                    .config
                    .classifiers
                    .iter()
                    .map(|&kind| ClassifierOutcome::Failed {
                        kind,
                        error: error.clone(),
                    })
                    .collect();
            }
        };
        info!(
            fire = %analysis.fire,
            training = training.len(),
            validation = validation.len(),
            "samples drawn"
        );

        self.config
            .classifiers
            .iter()
            .map(|&kind| match self.train_one(kind, analysis, &training, &validation) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(fire = %analysis.fire, classifier = %kind, error = %e, "classifier failed");
                    ClassifierOutcome::Failed {
                        kind,
                        error: e.to_string(),
                    }
                }
            })
            .collect()
    }

    fn train_one(
        &self,
        kind: ClassifierKind,
        analysis: &FireAnalysis,
        training: &SampleSet,
        validation: &SampleSet,
    ) -> Result<ClassifierOutcome> {
        let model = kind.build().fit(training)?;
        let classified = classify_image(model.as_ref(), &analysis.stack, model.feature_names())?;
        let scene = confusion_counts(&classified, &analysis.truth, self.config.evaluation_scale)?;
        let validation = model.error_matrix(validation);
        info!(
            fire = %analysis.fire,
            delta_days = analysis.delta_days,
            classifier = %kind,
            accuracy = scene.accuracy(),
            kappa = scene.kappa(),
            validation_accuracy = validation.accuracy(),
            "classifier scored"
        );
        Ok(ClassifierOutcome::Trained {
            kind,
            classified,
            scene,
            training: model.training_confusion(),
            validation,
        })
    }

    fn draw_samples(
        &self,
        image: &Image,
        truth: &Raster<f64>,
        landcover: Option<&Raster<f64>>,
    ) -> Result<(SampleSet, SampleSet)> {
        match &self.config.sampling {
            SamplingPlan::Uniform { count } => Ok((
                sample_uniform(image, CLASS_BAND, *count, &self.config.training)?,
                sample_uniform(image, CLASS_BAND, *count, &self.config.validation)?,
            )),
            SamplingPlan::Stratified {
                training_factor,
                validation_factor,
                histogram_scale,
            } => {
                let landcover = landcover.ok_or_else(|| Error::InvalidParameter {
                    name: "landcover",
                    value: "none".into(),
                    reason: "stratified sampling needs a land-cover raster".into(),
                })?;
                let strata = burn_landcover_strata(landcover, truth)?;
                // only pixels the sampler can use count towards a stratum
                let histogram = stratum_histogram(image, CLASS_BAND, &strata, *histogram_scale)?;
                debug!(strata = histogram.len(), "stratum histogram");

                let draw = |factor: f64, params: &SampleParams| {
                    let available = stratum_histogram(image, CLASS_BAND, &strata, params.scale)?;
                    let targets: Vec<(i64, usize)> = targets_from_histogram(&histogram, factor)
                        .into_iter()
                        .filter(|(stratum, _)| available.contains_key(stratum))
                        .collect();
                    sample_stratified(image, CLASS_BAND, &strata, &targets, params)
                };
                Ok((
                    draw(*training_factor, &self.config.training)?,
                    draw(*validation_factor, &self.config.validation)?,
                ))
            }
        }
    }

    /// Analyse one fire at every configured window length and evaluate it
    pub fn run_all(&self, job: &FireJob, records: &[FireRecord]) -> Vec<FireRun> {
        self.config
            .deltas
            .iter()
            .map(|&delta_days| {
                let outcome = self.run(job, records, delta_days).and_then(|analysis| {
                    let thresholds = self.evaluate_thresholds(&analysis)?;
                    let classifiers = self.evaluate_classifiers(&analysis, job.landcover.as_ref());
                    Ok(DeltaRun {
                        analysis,
                        thresholds,
                        classifiers,
                    })
                });
                if let Err(e) = &outcome {
                    warn!(fire = %job.event.name, delta_days, error = %e, "fire analysis failed");
                }
                FireRun {
                    fire: job.event.name.clone(),
                    delta_days,
                    outcome,
                }
            })
            .collect()
    }

    /// Analyse independent fires in parallel. Results keep the job order.
    pub fn run_batch(&self, jobs: &[FireJob], records: &[FireRecord]) -> Vec<FireRun> {
        info!(fires = jobs.len(), deltas = ?self.config.deltas, "running batch");
        let runs: Vec<Vec<FireRun>> = jobs.par_iter().map(|job| self.run_all(job, records)).collect();
        runs.into_iter().flatten().collect()
    }
}

/// Analysis grid taken from the first scene of the collection
fn scene_grid(scenes: &ImageCollection, window: &TimeWindow) -> Result<GridSpec> {
    let scene = scenes.scenes().first().ok_or_else(|| Error::EmptyComposite {
        window: window.to_string(),
    })?;
    match (scene.image.shape(), scene.image.transform()) {
        (Some((rows, cols)), Some(transform)) => Ok(GridSpec::new(rows, cols, *transform)),
        _ => Err(Error::Algorithm(format!("scene '{}' has no bands", scene.id))),
    }
}
