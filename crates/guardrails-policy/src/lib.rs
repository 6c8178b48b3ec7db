//! Guardrails Policy Engine
//!
//! Pattern-based detection rules and everything that evaluates or
//! governs them:
//! - Pattern compilation (exact, keyword, regex, glob)
//! - Per-org rule stores with copy-on-write snapshots
//! - The scan engine and its per-rule time budget
//! - Severity/action resolution, including placeholder sanitization
//! - Rule lifecycle: authoring, member suggestions, policy packs
//!
//! Built-in default rules and the bundled policy packs ship with the crate.

pub mod defaults;
pub mod engine;
pub mod lifecycle;
pub mod pack;
pub mod pattern;
pub mod resolver;
pub mod store;
pub mod suggestion;

pub use engine::{Finding, ScanAborted, ScanBudget, ScanEngine, ScanResult};
pub use lifecycle::{LifecycleManager, SeedPolicy};
pub use pack::{AllowAll, EntitlementCheck, PackCatalog, PackInstallReport, PackRule, PolicyPack};
pub use pattern::{CompileOptions, Matcher, PatternCompiler, PatternPreview, Span};
pub use resolver::{
    FinalAction, PlaceholderCollision, Resolution, ResolvedFinding, Resolver, ResolverPolicy,
    ScanFailure, ScanMode,
};
pub use store::{CompiledRule, OrgRuleStore, RuleSet, RuleStoreRegistry};
pub use suggestion::{RuleSuggestion, SuggestionDraft, SuggestionStatus};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{Finding, ScanEngine, ScanResult};
    pub use crate::lifecycle::LifecycleManager;
    pub use crate::pattern::PatternCompiler;
    pub use crate::resolver::{FinalAction, Resolution, Resolver, ScanMode};
    pub use crate::store::{RuleSet, RuleStoreRegistry};
}
