//! Read-only analyses over the stored symbol graph.

mod diff;
mod impact;

pub use diff::{
    BranchDiffResult, DiffOptions, DiffSummary, ModifiedSymbol, SymbolChanges, diff_branches,
};
pub use impact::{
    ImpactAnalysis, ImpactConfidence, ImpactOptions, RiskLevel, analyze_impact,
};
