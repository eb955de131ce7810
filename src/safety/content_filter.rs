//! Content Filter
//!
//! Pattern-based detection of prompt injection in queries and PII in answers.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    PromptInjection,
    Pii,
    /// Reported by the LLM classifier.
    Policy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub category: ThreatCategory,
    pub severity: Severity,
    pub description: String,
    /// Matched text, when the threat came from a pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

/// Content filter for queries and answers
pub struct ContentFilter {
    injection_patterns: Vec<(Regex, &'static str, Severity)>,
    pii_patterns: Vec<(Regex, &'static str, Severity)>,
}

impl ContentFilter {
    pub fn new() -> Self {
        Self {
            injection_patterns: Self::build_injection_patterns(),
            pii_patterns: Self::build_pii_patterns(),
        }
    }

    fn build_injection_patterns() -> Vec<(Regex, &'static str, Severity)> {
        vec![
            (
                Regex::new(r"(?i)ignore\s+(?:previous|all|above|the|any|prior).*\s*instructions").unwrap(),
                "Instruction override attempt",
                Severity::Critical,
            ),
            (
                Regex::new(r"(?i)disregard\s+(?:all\s+)?(?:previous|prior|above|your)\s+(?:instructions|rules|guidelines)")
                    .unwrap(),
                "Instruction override attempt",
                Severity::Critical,
            ),
            (
                Regex::new(r"(?i)system\s*:\s*you").unwrap(),
                "System prompt injection",
                Severity::Critical,
            ),
            (
                Regex::new(r"(?i)you\s+are\s+now\s+(?:a|an)\b").unwrap(),
                "Role override attempt",
                Severity::High,
            ),
            (
                Regex::new(r"(?i)forget\s+everything").unwrap(),
                "Memory wipe attempt",
                Severity::High,
            ),
            (
                Regex::new(r"(?i)reveal\s+(?:your\s+)?(?:system\s+prompt|hidden\s+instructions)").unwrap(),
                "System prompt extraction attempt",
                Severity::High,
            ),
            (
                Regex::new(r"\]\]\s*\[\[").unwrap(),
                "Bracket injection pattern",
                Severity::Medium,
            ),
        ]
    }

    fn build_pii_patterns() -> Vec<(Regex, &'static str, Severity)> {
        vec![
            (
                Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
                "Social security number",
                Severity::High,
            ),
            (
                Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b").unwrap(),
                "Payment card number",
                Severity::High,
            ),
            (
                Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
                "Email address",
                Severity::Medium,
            ),
            (
                Regex::new(r"(?:\+1[-. ]?)?\(?\b\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b").unwrap(),
                "Phone number",
                Severity::Medium,
            ),
        ]
    }

    /// First injection pattern the query matches, if any.
    pub fn scan_query(&self, query: &str) -> Option<Threat> {
        self.injection_patterns
            .iter()
            .find_map(|(pattern, description, severity)| {
                pattern.find(query).map(|m| Threat {
                    category: ThreatCategory::PromptInjection,
                    severity: *severity,
                    description: description.to_string(),
                    matched: Some(m.as_str().to_string()),
                })
            })
    }

    /// Every PII occurrence in the answer.
    pub fn scan_answer(&self, answer: &str) -> Vec<Threat> {
        let mut threats = Vec::new();
        for (pattern, description, severity) in &self.pii_patterns {
            for m in pattern.find_iter(answer) {
                threats.push(Threat {
                    category: ThreatCategory::Pii,
                    severity: *severity,
                    description: description.to_string(),
                    matched: Some(m.as_str().to_string()),
                });
            }
        }
        threats
    }

    /// Replace the matched text of every PII threat at or above `min_severity`.
    pub fn redact(&self, text: &str, threats: &[Threat], min_severity: Severity) -> String {
        let mut redacted = text.to_string();
        for threat in threats {
            if threat.category != ThreatCategory::Pii || threat.severity < min_severity {
                continue;
            }
            if let Some(ref matched) = threat.matched {
                redacted = redacted.replace(matched.as_str(), REDACTION_MARKER);
            }
        }
        redacted
    }
}

pub const REDACTION_MARKER: &str = "[REDACTED]";

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}
