use crate::config::MlConfig;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref MARKUP_PATTERN: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref URL_STRIP_PATTERN: Regex = Regex::new(r"http\S+").unwrap();
    static ref WHITESPACE_PATTERN: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

/// One classifier reading. `degraded` marks a neutral fallback produced when
/// the model is unavailable, the input is empty, or inference failed; the
/// probability floor applies there too so a failure never reads as certainty
/// of benignity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlSignal {
    pub probability: f64,
    pub confidence_band: ConfidenceBand,
    pub source_label: String,
    pub degraded: bool,
}

/// A loaded model. Implementations may be called from many scans at once;
/// a backend whose model is not reentrant must serialize internally.
pub trait Classifier: Send + Sync {
    /// Phishing probability in [0, 1] for already-cleaned text.
    fn score(&self, text: &str) -> anyhow::Result<f64>;
}

/// Factory for a [`Classifier`]. `load` is called at most once per adapter;
/// heavy model initialization belongs here, not in the constructor.
pub trait ClassifierBackend: Send + Sync {
    fn label(&self) -> &str;
    fn load(&self) -> anyhow::Result<Arc<dyn Classifier>>;
}

enum ModelState {
    Unloaded,
    Ready(Arc<dyn Classifier>),
    Failed,
}

/// Capability boundary around the external phishing classifier.
///
/// `predict` never fails and always reports a probability at or above the
/// configured floor. The model handle is loaded lazily on first use, guarded
/// so concurrent first calls trigger exactly one load; a failed load is
/// sticky and yields degraded readings from then on.
pub struct MlAdapter {
    config: MlConfig,
    backend: Box<dyn ClassifierBackend>,
    state: Mutex<ModelState>,
}

impl MlAdapter {
    pub fn new(config: MlConfig, backend: Box<dyn ClassifierBackend>) -> Self {
        MlAdapter {
            config,
            backend,
            state: Mutex::new(ModelState::Unloaded),
        }
    }

    pub fn predict(&self, text: &str) -> MlSignal {
        let cleaned = clean_text(text, self.config.max_input_chars);
        if cleaned.is_empty() {
            log::debug!("Empty classifier input, returning degraded reading");
            return self.degraded_signal();
        }

        let classifier = match self.classifier() {
            Some(classifier) => classifier,
            None => return self.degraded_signal(),
        };

        match classifier.score(&cleaned) {
            Ok(raw) => {
                let probability = round3(raw.clamp(self.config.probability_floor, 1.0));
                MlSignal {
                    probability,
                    confidence_band: self.band(probability),
                    source_label: self.backend.label().to_string(),
                    degraded: false,
                }
            }
            Err(e) => {
                log::error!("Inference failed: {e}");
                self.degraded_signal()
            }
        }
    }

    /// Returns the shared model handle, loading it on first use.
    fn classifier(&self) -> Option<Arc<dyn Classifier>> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(e) => {
                log::error!("Model state lock poisoned: {e}");
                return None;
            }
        };

        if let ModelState::Unloaded = *state {
            *state = match self.backend.load() {
                Ok(classifier) => {
                    log::info!("Classifier loaded: {}", self.backend.label());
                    ModelState::Ready(classifier)
                }
                Err(e) => {
                    log::error!("Failed to load classifier {}: {e}", self.backend.label());
                    ModelState::Failed
                }
            };
        }

        match &*state {
            ModelState::Ready(classifier) => Some(classifier.clone()),
            _ => None,
        }
    }

    fn band(&self, probability: f64) -> ConfidenceBand {
        if probability >= self.config.high_confidence_cutoff {
            ConfidenceBand::High
        } else if probability >= self.config.medium_confidence_cutoff {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    fn degraded_signal(&self) -> MlSignal {
        MlSignal {
            probability: self.config.probability_floor,
            confidence_band: ConfidenceBand::Low,
            source_label: self.backend.label().to_string(),
            degraded: true,
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Normalize prose before inference: drop markup and URLs, collapse
/// whitespace, truncate to the configured length cap.
pub fn clean_text(raw: &str, max_chars: usize) -> String {
    let text = MARKUP_PATTERN.replace_all(raw, " ");
    let text = URL_STRIP_PATTERN.replace_all(&text, " ");
    let text = WHITESPACE_PATTERN.replace_all(&text, " ");
    let text = text.trim();
    text.chars().take(max_chars).collect()
}

/// Deterministic keyword-evidence classifier used when no external model is
/// wired in. Each matched term contributes its weight to an evidence total
/// mapped through `1 - e^-evidence`, so the score stays in [0, 1) and grows
/// with the number and strength of phishing indicators.
pub struct LexicalBackend {
    terms: Vec<(String, f64)>,
}

impl LexicalBackend {
    pub fn new() -> Self {
        let terms = [
            ("verify your account", 0.9),
            ("account suspended", 0.8),
            ("click here", 0.7),
            ("wire transfer", 0.7),
            ("unusual activity", 0.7),
            ("password expired", 0.6),
            ("login now", 0.6),
            ("security alert", 0.6),
            ("update your information", 0.6),
            ("claim your prize", 0.6),
            ("reset your password", 0.5),
            ("urgent", 0.4),
            ("act now", 0.4),
            ("winner", 0.3),
        ];
        LexicalBackend {
            terms: terms
                .iter()
                .map(|(term, weight)| (term.to_string(), *weight))
                .collect(),
        }
    }
}

impl Default for LexicalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierBackend for LexicalBackend {
    fn label(&self) -> &str {
        "lexical"
    }

    fn load(&self) -> anyhow::Result<Arc<dyn Classifier>> {
        Ok(Arc::new(LexicalClassifier {
            terms: self.terms.clone(),
        }))
    }
}

struct LexicalClassifier {
    terms: Vec<(String, f64)>,
}

impl Classifier for LexicalClassifier {
    fn score(&self, text: &str) -> anyhow::Result<f64> {
        let text = text.to_lowercase();
        let evidence: f64 = self
            .terms
            .iter()
            .filter(|(term, _)| text.contains(term))
            .map(|(_, weight)| weight)
            .sum();
        Ok(1.0 - (-evidence).exp())
    }
}
