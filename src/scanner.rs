use crate::config::{Config, ParseFailurePolicy};
use crate::decision::{DecisionEngine, Verdict};
use crate::domain_utils;
use crate::error::ErrorInfo;
use crate::ml::MlAdapter;
use crate::parser;
use crate::persistence::{ScanRecord, ScanSink};
use crate::rules::RuleEngine;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSignals {
    pub rules: Vec<String>,
    pub ml_probability: f64,
}

/// The one artifact handed to callers. Immutable once returned; each scan's
/// records are independent of every other scan's.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub scan_id: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub signals: ScanSignals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub timestamp: String,
}

/// Sequences one scan: parse, rules, ML inference, fusion. Strictly
/// sequential with no retries; every failure mode ends in a complete
/// `ScanResult`, never an error crossing this boundary.
pub struct EmailScanner {
    rules: RuleEngine,
    decision: DecisionEngine,
    adapter: Arc<MlAdapter>,
    sink: Option<Arc<dyn ScanSink>>,
    parse_failure_policy: ParseFailurePolicy,
}

impl EmailScanner {
    pub fn new(config: &Config, adapter: Arc<MlAdapter>, sink: Option<Arc<dyn ScanSink>>) -> Self {
        EmailScanner {
            rules: RuleEngine::new(config.rules.clone()),
            decision: DecisionEngine::new(config.fusion.clone()),
            adapter,
            sink,
            parse_failure_policy: config.scan.on_parse_failure,
        }
    }

    pub fn scan(&self, raw_email: &str) -> ScanResult {
        let scan_id = Uuid::new_v4().to_string();
        log::debug!("Scan {scan_id}: parsing {} bytes", raw_email.len());

        let parsed = parser::parse(raw_email);
        if let Some(error) = parsed.parse_error.clone() {
            return self.short_circuit(scan_id, error);
        }

        let rule_eval = self
            .rules
            .evaluate(&parsed.headers, &parsed.urls, &parsed.body);

        // The classifier sees subject and both body variants as one prose blob.
        let ml_text = format!(
            "{} {} {}",
            parsed.headers.subject,
            parsed.body.plain_text.as_deref().unwrap_or(""),
            parsed.body.html.as_deref().unwrap_or("")
        );
        let ml_signal = self.adapter.predict(&ml_text);
        if ml_signal.degraded {
            log::warn!("Scan {scan_id}: classifier degraded, using floor probability");
        }

        let decision = self.decision.fuse(&rule_eval, &ml_signal);
        log::info!(
            "Scan {scan_id}: verdict={} score={} rules={:?}",
            decision.verdict,
            decision.final_score,
            decision.rules_triggered
        );

        let result = ScanResult {
            scan_id,
            verdict: decision.verdict,
            confidence: decision.final_score,
            signals: ScanSignals {
                rules: decision.rules_triggered,
                ml_probability: ml_signal.probability,
            },
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.persist(&parsed.headers.from, &result);
        result
    }

    /// Parse failures skip rules and inference entirely; the verdict comes
    /// from the configured policy.
    fn short_circuit(&self, scan_id: String, error: ErrorInfo) -> ScanResult {
        let (verdict, confidence) = match self.parse_failure_policy {
            ParseFailurePolicy::FailOpen => (Verdict::Benign, 0.0),
            ParseFailurePolicy::FailClosed => (Verdict::Phishing, 1.0),
        };
        log::warn!(
            "Scan {scan_id}: short-circuit to {verdict} on parse failure: {}",
            error.message
        );

        let result = ScanResult {
            scan_id,
            verdict,
            confidence,
            signals: ScanSignals {
                rules: Vec::new(),
                ml_probability: 0.0,
            },
            error: Some(error),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.persist("", &result);
        result
    }

    fn persist(&self, from_header: &str, result: &ScanResult) {
        let sink = match &self.sink {
            Some(sink) => sink,
            None => return,
        };
        let sender_domain = domain_utils::sender_domain(from_header)
            .unwrap_or_else(|| "unknown".to_string());
        sink.record(ScanRecord {
            scan_id: result.scan_id.clone(),
            sender_domain,
            verdict: result.verdict.as_str().to_string(),
            confidence: result.confidence,
            signals: result.signals.clone(),
            created_at: result.timestamp.clone(),
        });
    }
}
