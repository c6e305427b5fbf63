//! Per-table pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of one table's pipeline.
///
/// Stages advance strictly in order; `Failed` is absorbing and reachable
/// from every working stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    LoadConcepts,
    LoadCodeMappings,
    StageQuery,
    SwapKeys,
    Merge,
    Done,
    Failed,
}

impl Stage {
    /// The stage that follows a successful `self`
    pub fn next(self) -> Stage {
        match self {
            Stage::Start => Stage::LoadConcepts,
            Stage::LoadConcepts => Stage::LoadCodeMappings,
            Stage::LoadCodeMappings => Stage::StageQuery,
            Stage::StageQuery => Stage::SwapKeys,
            Stage::SwapKeys => Stage::Merge,
            Stage::Merge => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::Failed => Stage::Failed,
        }
    }

    /// Whether the stage ends the table's pipeline
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "START",
            Stage::LoadConcepts => "LOAD_CONCEPTS",
            Stage::LoadCodeMappings => "LOAD_CODE_MAPPINGS",
            Stage::StageQuery => "STAGE_QUERY",
            Stage::SwapKeys => "SWAP_KEYS",
            Stage::Merge => "MERGE",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_advance_in_order() {
        let mut stage = Stage::Start;
        let mut visited = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next();
            visited.push(stage);
        }
        assert_eq!(
            visited,
            vec![
                Stage::Start,
                Stage::LoadConcepts,
                Stage::LoadCodeMappings,
                Stage::StageQuery,
                Stage::SwapKeys,
                Stage::Merge,
                Stage::Done
            ]
        );
    }

    #[test]
    fn test_failed_is_absorbing() {
        assert_eq!(Stage::Failed.next(), Stage::Failed);
        assert!(Stage::Failed.is_terminal());
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&Stage::LoadCodeMappings).unwrap();
        assert_eq!(json, "\"LOAD_CODE_MAPPINGS\"");
        assert_eq!(Stage::SwapKeys.to_string(), "SWAP_KEYS");
    }
}
