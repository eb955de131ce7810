use serde::{Deserialize, Serialize};
use std::fmt;

/// LLM capability/cost bands, ordered from cheapest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Fast classification, extraction and safety checks.
    Tiny,
    /// Balanced default for most specialist work.
    Standard,
    /// Complex reasoning and architecture work.
    Heavy,
}

impl ModelTier {
    pub const ALL: [ModelTier; 3] = [ModelTier::Tiny, ModelTier::Standard, ModelTier::Heavy];

    /// Escalation path: the next stronger tier, or the current one at the ceiling.
    pub fn escalate(&self) -> Self {
        match self {
            ModelTier::Tiny => ModelTier::Standard,
            ModelTier::Standard => ModelTier::Heavy,
            ModelTier::Heavy => ModelTier::Heavy,
        }
    }

    pub fn is_top(&self) -> bool {
        *self == ModelTier::Heavy
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Tiny => "tiny",
            ModelTier::Standard => "standard",
            ModelTier::Heavy => "heavy",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied task type. Overrides the keyword classification outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Architecture,
    Reasoning,
    Implementation,
    Analysis,
    Classification,
    Extraction,
    Summarization,
    General,
}

impl TaskType {
    pub fn tier(&self) -> ModelTier {
        match self {
            TaskType::Architecture | TaskType::Reasoning => ModelTier::Heavy,
            TaskType::Implementation | TaskType::Analysis | TaskType::General => ModelTier::Standard,
            TaskType::Classification | TaskType::Extraction | TaskType::Summarization => ModelTier::Tiny,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Architecture => "architecture",
            TaskType::Reasoning => "reasoning",
            TaskType::Implementation => "implementation",
            TaskType::Analysis => "analysis",
            TaskType::Classification => "classification",
            TaskType::Extraction => "extraction",
            TaskType::Summarization => "summarization",
            TaskType::General => "general",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_path_stops_at_heavy() {
        assert_eq!(ModelTier::Tiny.escalate(), ModelTier::Standard);
        assert_eq!(ModelTier::Standard.escalate(), ModelTier::Heavy);
        assert_eq!(ModelTier::Heavy.escalate(), ModelTier::Heavy);
        assert!(ModelTier::Heavy.is_top());
    }

    #[test]
    fn test_tiers_are_ordered() {
        assert!(ModelTier::Tiny < ModelTier::Standard);
        assert!(ModelTier::Standard < ModelTier::Heavy);
    }

    #[test]
    fn test_task_type_tiers() {
        assert_eq!(TaskType::Architecture.tier(), ModelTier::Heavy);
        assert_eq!(TaskType::Implementation.tier(), ModelTier::Standard);
        assert_eq!(TaskType::Extraction.tier(), ModelTier::Tiny);
    }
}
