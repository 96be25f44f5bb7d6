//! Impact analysis: who breaks if this symbol changes.
//!
//! Callers-only BFS from a seed symbol, bounded by depth and edge
//! confidence. The result is annotated with a confidence grade so
//! callers can tell complete data from truncated or stale data.

use crate::error::Result;
use crate::store::Store;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Stored caller paths are capped; counts are exact regardless.
const MAX_TRACKED_PATHS: usize = 50;

#[derive(Debug, Clone)]
pub struct ImpactOptions {
    pub branch: String,
    pub max_depth: u32,
    pub confidence_threshold: f32,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            max_depth: 10,
            confidence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    fn from_dependents(count: usize) -> Self {
        match count {
            0..=3 => Self::Low,
            4..=10 => Self::Medium,
            11..=25 => Self::High,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactConfidence {
    /// Complete walk over consistent data.
    High,
    /// The depth cap truncated the walk, or an endpoint was missing.
    Medium,
    /// Some visited symbol is newer than the edge that reached it.
    Degraded,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImpactAnalysis {
    pub symbol_id: String,
    pub qualified_name: String,
    pub direct_dependents: usize,
    pub transitive_dependents: usize,
    pub risk: RiskLevel,
    pub confidence: ImpactConfidence,
    /// Caller chains from the seed outward, as qualified names.
    pub paths: Vec<Vec<String>>,
    pub depth_reached: u32,
}

pub fn analyze_impact(
    store: &Arc<Store>,
    symbol_id: &str,
    options: &ImpactOptions,
) -> Result<Option<ImpactAnalysis>> {
    let branch = options.branch.as_str();
    let Some(seed) = store.symbols().by_id(symbol_id, branch)? else {
        return Ok(None);
    };

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(seed.id.clone());
    let mut paths: HashMap<String, Vec<String>> = HashMap::new();
    paths.insert(seed.id.clone(), vec![seed.qualified_name.clone()]);

    let mut queue: VecDeque<(String, u32)> = VecDeque::new();
    queue.push_back((seed.id.clone(), 0));

    let mut direct_dependents = 0usize;
    let mut transitive: Vec<String> = Vec::new();
    let mut depth_reached = 0u32;
    let mut truncated = false;
    let mut missing_endpoint = false;
    let mut stale = false;

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= options.max_depth {
            truncated = true;
            continue;
        }

        for edge in store.edges().callers(&id, branch)? {
            if edge.confidence < options.confidence_threshold {
                continue;
            }
            let caller_id = edge.source_id.clone();
            if !visited.insert(caller_id.clone()) {
                continue;
            }

            let Some(caller) = store.symbols().by_id(&caller_id, branch)? else {
                missing_endpoint = true;
                continue;
            };
            // A symbol newer than the edge that reached it means the edge
            // predates the current code.
            if caller.updated_at > edge.updated_at {
                stale = true;
            }

            if depth == 0 {
                direct_dependents += 1;
            }
            depth_reached = depth_reached.max(depth + 1);
            transitive.push(caller_id.clone());

            if paths.len() < MAX_TRACKED_PATHS {
                let mut path = paths.get(&id).cloned().unwrap_or_default();
                path.push(caller.qualified_name.clone());
                paths.insert(caller_id.clone(), path);
            }
            queue.push_back((caller_id, depth + 1));
        }
    }

    let confidence = if stale {
        ImpactConfidence::Degraded
    } else if (truncated && depth_reached >= options.max_depth) || missing_endpoint {
        ImpactConfidence::Medium
    } else {
        ImpactConfidence::High
    };

    let mut caller_paths: Vec<Vec<String>> = transitive
        .iter()
        .filter_map(|id| paths.get(id).cloned())
        .collect();
    caller_paths.sort();
    caller_paths.truncate(MAX_TRACKED_PATHS);

    let transitive_dependents = transitive.len();
    Ok(Some(ImpactAnalysis {
        symbol_id: seed.id,
        qualified_name: seed.qualified_name,
        direct_dependents,
        transitive_dependents,
        risk: RiskLevel::from_dependents(transitive_dependents),
        confidence,
        paths: caller_paths,
        depth_reached,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_buckets_match_contract() {
        assert_eq!(RiskLevel::from_dependents(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_dependents(3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_dependents(4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_dependents(10), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_dependents(12), RiskLevel::High);
        assert_eq!(RiskLevel::from_dependents(25), RiskLevel::High);
        assert_eq!(RiskLevel::from_dependents(26), RiskLevel::Critical);
    }
}
