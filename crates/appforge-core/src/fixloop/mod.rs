//! Build-fix loop: compile, classify into priority tiers, fix the top tier, repeat.

pub mod classify;
pub mod engine;
pub mod signature;

pub use classify::Classifier;
pub use engine::{
    BuildFixLoop, BuildScope, Compiler, FixAction, FixDecision, FixLog, FixMode, FixOutcome,
    FixPolicy, FixStrategy, Fixer, UnitFix,
};
pub use signature::Signature;
