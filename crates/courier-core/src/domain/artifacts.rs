//! Post-run repository snapshot (`job:{id}:artifacts`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Written once after the agent exits, never updated.
///
/// A field is `None` when its inspection command failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status: Option<String>,
}

impl Artifacts {
    pub const DIFF_FIELD: &'static str = "gitDiff";
    pub const STATUS_FIELD: &'static str = "gitStatus";

    pub fn is_empty(&self) -> bool {
        self.git_diff.is_none() && self.git_status.is_none()
    }

    pub fn from_fields(map: &HashMap<String, String>) -> Self {
        Self {
            git_diff: map.get(Self::DIFF_FIELD).cloned(),
            git_status: map.get(Self::STATUS_FIELD).cloned(),
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(2);
        if let Some(diff) = &self.git_diff {
            out.push((Self::DIFF_FIELD.to_string(), diff.clone()));
        }
        if let Some(status) = &self.git_status {
            out.push((Self::STATUS_FIELD.to_string(), status.clone()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_not_written() {
        let artifacts = Artifacts {
            git_diff: None,
            git_status: Some(" M src/lib.rs\n".to_string()),
        };
        let fields = artifacts.to_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, "gitStatus");
    }

    #[test]
    fn empty_diff_is_still_an_artifact() {
        let artifacts = Artifacts {
            git_diff: Some(String::new()),
            git_status: Some(String::new()),
        };
        assert!(!artifacts.is_empty());
        let map: HashMap<_, _> = artifacts.to_fields().into_iter().collect();
        assert_eq!(Artifacts::from_fields(&map), artifacts);
    }
}
