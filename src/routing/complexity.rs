//! Complexity Analysis
//!
//! Extracts routing features from a prompt, folds them into a bounded
//! composite score and maps the score onto a model tier.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::tier::{ModelTier, TaskType};
use crate::utils::approx_token_count;

/// Token count at which the length signal saturates.
const TOKEN_SATURATION: f32 = 2000.0;
/// Prompts above this estimate are flagged as long-context.
const LONG_CONTEXT_TOKENS: usize = 2000;
const STRUCTURE_SATURATION: f32 = 10.0;
const ENTITY_SATURATION: f32 = 10.0;

const WEIGHT_TOKENS: f32 = 0.10;
const WEIGHT_KEYWORD: f32 = 0.30;
const WEIGHT_QUESTION: f32 = 0.15;
const WEIGHT_STRUCTURE: f32 = 0.10;
const WEIGHT_ENTITIES: f32 = 0.10;
const WEIGHT_SAFETY: f32 = 0.15;
const WEIGHT_AMBIGUITY: f32 = 0.05;
const WEIGHT_LONG_CONTEXT: f32 = 0.05;

/// Terms match at word starts. A trailing `*` marks a stem that matches any
/// continuation; other terms also match their plural and verb forms.
const KEYWORD_TERMS: &[(&str, TaskType)] = &[
    ("architect*", TaskType::Architecture),
    ("system design", TaskType::Architecture),
    ("design", TaskType::Architecture),
    ("trade-off", TaskType::Reasoning),
    ("tradeoff", TaskType::Reasoning),
    ("scalab*", TaskType::Architecture),
    ("distributed", TaskType::Architecture),
    ("root cause", TaskType::Reasoning),
    ("threat model*", TaskType::Reasoning),
    ("strateg*", TaskType::Reasoning),
    ("implement*", TaskType::Implementation),
    ("refactor*", TaskType::Implementation),
    ("debug*", TaskType::Implementation),
    ("function", TaskType::Implementation),
    ("write code", TaskType::Implementation),
    ("code", TaskType::Implementation),
    ("fix", TaskType::Implementation),
    ("integrat*", TaskType::Implementation),
    ("analy*", TaskType::Analysis),
    ("classif*", TaskType::Classification),
    ("categori*", TaskType::Classification),
    ("label", TaskType::Classification),
    ("detect language", TaskType::Classification),
    ("extract*", TaskType::Extraction),
    ("list", TaskType::Extraction),
    ("format", TaskType::Extraction),
    ("summari*", TaskType::Summarization),
    ("translat*", TaskType::Summarization),
];

const SAFETY_TERMS: &[&str] = &[
    "security", "vulnerab*", "exploit", "breach", "complian*", "gdpr", "hipaa", "pci",
    "sox", "legal", "lawsuit", "liabilit*", "regulat*", "privacy", "pii", "fraud*", "audit",
];

const VAGUE_TERMS: &[&str] = &[
    "something", "somehow", "stuff", "maybe", "etc", "whatever", "kind of", "sort of", "thing",
];

fn term_regex(term: &str) -> Regex {
    let pattern = match term.strip_suffix('*') {
        Some(stem) => format!(r"(?i)\b{}\w*", regex::escape(stem)),
        None => format!(r"(?i)\b{}(?:s|es|ed|ing)?\b", regex::escape(term)),
    };
    Regex::new(&pattern).unwrap()
}

lazy_static! {
    static ref KEYWORD_PATTERNS: Vec<(Regex, TaskType)> =
        KEYWORD_TERMS.iter().map(|(term, task_type)| (term_regex(term), *task_type)).collect();
    static ref SAFETY_PATTERNS: Vec<Regex> = SAFETY_TERMS.iter().map(|t| term_regex(t)).collect();
    static ref VAGUE_PATTERNS: Vec<Regex> = VAGUE_TERMS.iter().map(|t| term_regex(t)).collect();
    static ref STRUCTURE_MARKER: Regex = Regex::new(r"(?m)^\s*(#{1,6}\s|[-*\x{2022}]\s|\d+[.)]\s)").unwrap();
    static ref QUESTION_WORDS: Vec<(Regex, f32)> = vec![
        (Regex::new(r"(?i)\bwhy\b").unwrap(), 1.0),
        (Regex::new(r"(?i)\bhow\b").unwrap(), 0.8),
        (Regex::new(r"(?i)\b(compare|explain|evaluate)\b").unwrap(), 0.7),
        (Regex::new(r"(?i)\b(what|which)\b").unwrap(), 0.4),
        (Regex::new(r"(?i)\b(when|where|who)\b").unwrap(), 0.3),
    ];
}

/// Raw routing features. Higher values never make a prompt look simpler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFeatures {
    pub token_count: usize,
    pub keyword_tier: ModelTier,
    /// Weight of the keyword classification, 0.0-1.0.
    pub keyword_tier_score: f32,
    pub task_type_detected: TaskType,
    pub question_type_score: f32,
    pub structural_complexity: usize,
    pub entity_count: usize,
    pub safety_sensitivity: f32,
    pub ambiguity_score: f32,
    pub requires_long_context: bool,
}

impl Default for ComplexityFeatures {
    fn default() -> Self {
        Self {
            token_count: 0,
            keyword_tier: ModelTier::Standard,
            keyword_tier_score: 0.0,
            task_type_detected: TaskType::General,
            question_type_score: 0.0,
            structural_complexity: 0,
            entity_count: 0,
            safety_sensitivity: 0.0,
            ambiguity_score: 0.0,
            requires_long_context: false,
        }
    }
}

/// Clamp into [0, 1], mapping NaN to zero.
fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl ComplexityFeatures {
    /// Bounded weighted sum of the normalized features.
    pub fn score(&self) -> f32 {
        let tokens = unit(self.token_count as f32 / TOKEN_SATURATION);
        let structure = unit(self.structural_complexity as f32 / STRUCTURE_SATURATION);
        let entities = unit(self.entity_count as f32 / ENTITY_SATURATION);
        let long_context = if self.requires_long_context { 1.0 } else { 0.0 };

        let raw = WEIGHT_TOKENS * tokens
            + WEIGHT_KEYWORD * unit(self.keyword_tier_score)
            + WEIGHT_QUESTION * unit(self.question_type_score)
            + WEIGHT_STRUCTURE * structure
            + WEIGHT_ENTITIES * entities
            + WEIGHT_SAFETY * unit(self.safety_sensitivity)
            + WEIGHT_AMBIGUITY * unit(self.ambiguity_score)
            + WEIGHT_LONG_CONTEXT * long_context;

        unit(raw)
    }
}

/// Score thresholds that map a composite score onto a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub heavy: f32,
    pub standard: f32,
    pub safety_override: f32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            heavy: 0.6,
            standard: 0.3,
            safety_override: 0.6,
        }
    }
}

impl TierThresholds {
    /// Safety sensitivity above its threshold forces the heavy tier.
    pub fn determine(&self, features: &ComplexityFeatures, score: f32) -> ModelTier {
        if features.safety_sensitivity > self.safety_override {
            return ModelTier::Heavy;
        }
        if score > self.heavy {
            ModelTier::Heavy
        } else if score > self.standard {
            ModelTier::Standard
        } else {
            ModelTier::Tiny
        }
    }
}

fn keyword_weight(tier: ModelTier) -> f32 {
    match tier {
        ModelTier::Heavy => 1.0,
        ModelTier::Standard => 0.5,
        ModelTier::Tiny => 0.1,
    }
}

/// Stateless feature extractor.
#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, prompt: &str, task_type_hint: Option<TaskType>) -> ComplexityFeatures {
        let lower = prompt.to_lowercase();
        let token_count = approx_token_count(prompt);

        let (keyword_tier, task_type_detected, keyword_tier_score) = match task_type_hint {
            Some(hint) => (hint.tier(), hint, keyword_weight(hint.tier())),
            None => Self::classify_keywords(&lower),
        };

        ComplexityFeatures {
            token_count,
            keyword_tier,
            keyword_tier_score,
            task_type_detected,
            question_type_score: Self::question_type(prompt),
            structural_complexity: STRUCTURE_MARKER.find_iter(prompt).count(),
            entity_count: Self::count_entities(prompt),
            safety_sensitivity: unit(Self::count_terms(&lower, &SAFETY_PATTERNS) as f32 * 0.35),
            ambiguity_score: unit(Self::count_terms(&lower, &VAGUE_PATTERNS) as f32 * 0.25),
            requires_long_context: token_count > LONG_CONTEXT_TOKENS,
        }
    }

    fn classify_keywords(lower: &str) -> (ModelTier, TaskType, f32) {
        let mut hits = [0usize; 3];
        let mut first_type: [Option<TaskType>; 3] = [None; 3];

        for (pattern, task_type) in KEYWORD_PATTERNS.iter() {
            if pattern.is_match(lower) {
                let idx = task_type.tier() as usize;
                hits[idx] += 1;
                first_type[idx].get_or_insert(*task_type);
            }
        }

        // Most hits wins; ties go to the stronger tier.
        let best = ModelTier::ALL
            .iter()
            .copied()
            .max_by_key(|tier| hits[*tier as usize])
            .filter(|tier| hits[*tier as usize] > 0);

        match best {
            Some(tier) => {
                let task_type = first_type[tier as usize].unwrap_or(TaskType::General);
                (tier, task_type, keyword_weight(tier))
            }
            None => (ModelTier::Standard, TaskType::General, 0.0),
        }
    }

    fn question_type(prompt: &str) -> f32 {
        QUESTION_WORDS
            .iter()
            .filter(|(re, _)| re.is_match(prompt))
            .map(|(_, weight)| *weight)
            .fold(0.0, f32::max)
    }

    fn count_terms(lower: &str, patterns: &[Regex]) -> usize {
        patterns.iter().filter(|p| p.is_match(lower)).count()
    }

    /// Capitalised words that do not open a sentence.
    fn count_entities(prompt: &str) -> usize {
        let mut count = 0;
        let mut sentence_start = true;
        for word in prompt.split_whitespace() {
            let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
            if !sentence_start && trimmed.chars().next().is_some_and(|c| c.is_uppercase()) {
                count += 1;
            }
            sentence_start = word.ends_with(['.', '!', '?', ':']);
        }
        count
    }
}
