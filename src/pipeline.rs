//! Per-URL state machine and the paired batch loop.
//!
//! `check liveness -> extract -> label -> (optionally) persist`, one URL at a
//! time. Interrupts are honoured between URLs and before a row is written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::classifier::{ClassifierError, Predictor};
use crate::dataset::{DatasetError, DatasetRow, DatasetWriter, Label, ReferenceUrls};
use crate::features::{FeatureSource, FeatureVector};
use crate::liveness::{Liveness, LivenessProbe};

/// Set by the Ctrl-C handler, consumed by the batch loop.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptDecision {
    Skip,
    Abort,
}

/// Decides what an interrupt means for the current URL.
pub trait InterruptHandler {
    fn decide(&mut self, url: &str) -> InterruptDecision;
}

/// Interrupts always skip the current URL.
pub struct AlwaysSkip;

impl InterruptHandler for AlwaysSkip {
    fn decide(&mut self, _url: &str) -> InterruptDecision {
        InterruptDecision::Skip
    }
}

/// Map a free-form answer to `(S)kip or (E)xit?` onto a decision.
/// Only `e` aborts; anything else skips.
pub fn decision_from_answer(answer: &str) -> InterruptDecision {
    if answer.trim().eq_ignore_ascii_case("e") {
        InterruptDecision::Abort
    } else {
        InterruptDecision::Skip
    }
}

/// Where a URL's label comes from
pub enum Labeler<'a> {
    /// Reference label from the input list
    Known(Label),
    /// Classifier verdict
    Model(&'a dyn Predictor),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UrlOutcome {
    SkippedDead(Liveness),
    Classified { vector: FeatureVector, label: Label },
    Persisted { vector: FeatureVector, label: Label },
    /// Interrupted and skipped before a row was written
    Skipped,
}

impl UrlOutcome {
    pub fn label(&self) -> Option<Label> {
        match self {
            UrlOutcome::Classified { label, .. } | UrlOutcome::Persisted { label, .. } => Some(*label),
            _ => None,
        }
    }
}

/// Console line for one hunted URL. `count` is the verdict number.
pub fn verdict_line(count: usize, url: &str, outcome: &UrlOutcome) -> String {
    match outcome {
        UrlOutcome::SkippedDead(_) => format!("[*] {} is offline", url),
        UrlOutcome::Skipped => format!("[*] {} skipped", url),
        UrlOutcome::Classified { label, .. } | UrlOutcome::Persisted { label, .. } => {
            if label.is_phish() {
                format!("[*] {} - {} is PHISH: true", count, url)
            } else {
                format!("[-] {} - {} is PHISH: false", count, url)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Observer for per-URL progress, used by the CLI to print verdict lines.
pub trait PipelineObserver {
    fn on_start(&mut self, _url: &str, _label: Option<Label>) {}
    fn on_outcome(&mut self, _index: usize, _url: &str, _outcome: &UrlOutcome) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub written: usize,
    pub offline: usize,
    pub skipped: usize,
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Stop once this many rows have been written
    pub limit: Option<usize>,
    pub request_delay: Duration,
}

pub struct Pipeline<'a> {
    liveness: &'a dyn LivenessProbe,
    extractor: &'a dyn FeatureSource,
    writer: Option<&'a DatasetWriter>,
    interrupt: InterruptFlag,
}

impl<'a> Pipeline<'a> {
    pub fn new(liveness: &'a dyn LivenessProbe, extractor: &'a dyn FeatureSource, interrupt: InterruptFlag) -> Self {
        Self {
            liveness,
            extractor,
            writer: None,
            interrupt,
        }
    }

    /// Append every labelled vector to this dataset.
    pub fn with_writer(mut self, writer: &'a DatasetWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Run one URL through the whole chain. Extraction never runs for a
    /// URL the liveness gate rejects.
    pub async fn process_url(&self, url: &str, labeler: &Labeler<'_>) -> Result<UrlOutcome, PipelineError> {
        match self.evaluate(url, labeler).await? {
            UrlOutcome::Classified { vector, label } => self.persist(vector, label),
            other => Ok(other),
        }
    }

    /// Liveness, extraction and labelling, without touching the dataset.
    async fn evaluate(&self, url: &str, labeler: &Labeler<'_>) -> Result<UrlOutcome, PipelineError> {
        let liveness = self.liveness.check(url).await;
        if !liveness.is_analyzable() {
            debug!("Skipping {}: {:?}", url, liveness.state);
            return Ok(UrlOutcome::SkippedDead(liveness));
        }

        let vector = self.extractor.extract(url).await;
        let label = match labeler {
            Labeler::Known(label) => *label,
            Labeler::Model(model) => Label::from_prediction(model.predict(&vector)?),
        };
        Ok(UrlOutcome::Classified { vector, label })
    }

    fn persist(&self, vector: FeatureVector, label: Label) -> Result<UrlOutcome, PipelineError> {
        match self.writer {
            Some(writer) => {
                writer.write_row(&DatasetRow { features: vector, label })?;
                Ok(UrlOutcome::Persisted { vector, label })
            }
            None => Ok(UrlOutcome::Classified { vector, label }),
        }
    }

    /// Consult the handler if an interrupt arrived; `None` means carry on.
    fn pending_interrupt(&self, url: &str, handler: &mut dyn InterruptHandler) -> Option<InterruptDecision> {
        if self.interrupt.take() {
            let decision = handler.decide(url);
            info!("Interrupt while processing {}: {:?}", url, decision);
            Some(decision)
        } else {
            None
        }
    }

    /// Process `(phish, legitimate)` pairs in order. When `model` is given
    /// it labels every URL; otherwise each URL keeps its reference label.
    pub async fn run_pairs(
        &self,
        urls: &ReferenceUrls,
        model: Option<&dyn Predictor>,
        options: BatchOptions,
        handler: &mut dyn InterruptHandler,
        observer: &mut dyn PipelineObserver,
    ) -> Result<BatchSummary, PipelineError> {
        let mut summary = BatchSummary::default();
        let mut first = true;

        'pairs: for (phish, legitimate) in urls.pairs() {
            for (url, reference) in [(phish, Label::Phish), (legitimate, Label::Legitimate)] {
                if !first && !options.request_delay.is_zero() {
                    tokio::time::sleep(options.request_delay).await;
                }
                first = false;

                if let Some(decision) = self.pending_interrupt(url, handler) {
                    match decision {
                        InterruptDecision::Abort => {
                            summary.aborted = true;
                            break 'pairs;
                        }
                        InterruptDecision::Skip => {
                            summary.skipped += 1;
                            observer.on_outcome(summary.processed, url, &UrlOutcome::Skipped);
                            continue;
                        }
                    }
                }

                let labeler = match model {
                    Some(model) => Labeler::Model(model),
                    None => Labeler::Known(reference),
                };
                observer.on_start(url, model.is_none().then_some(reference));

                // Extraction and classification happen before any write so an
                // interrupt raised meanwhile can still drop the row.
                let outcome = self.evaluate(url, &labeler).await?;
                summary.processed += 1;

                // An interrupt raised during this URL belongs to this URL,
                // whatever the outcome
                let outcome = match (outcome, self.pending_interrupt(url, handler)) {
                    (_, Some(InterruptDecision::Abort)) => {
                        summary.aborted = true;
                        break 'pairs;
                    }
                    (UrlOutcome::Classified { .. }, Some(InterruptDecision::Skip)) => {
                        summary.skipped += 1;
                        UrlOutcome::Skipped
                    }
                    (UrlOutcome::Classified { vector, label }, None) => self.persist(vector, label)?,
                    // Offline: nothing left to drop
                    (other, _) => other,
                };

                match &outcome {
                    UrlOutcome::SkippedDead(_) => summary.offline += 1,
                    UrlOutcome::Persisted { .. } => summary.written += 1,
                    _ => {}
                }
                observer.on_outcome(summary.processed, url, &outcome);

                if let Some(limit) = options.limit {
                    if summary.written >= limit {
                        info!("Reached limit of {} rows", limit);
                        break 'pairs;
                    }
                }
            }
        }

        Ok(summary)
    }
}
