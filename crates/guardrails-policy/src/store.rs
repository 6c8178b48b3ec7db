//! Rule store
//!
//! Each organization owns an [`OrgRuleStore`]. Scans read an immutable
//! [`RuleSet`] snapshot; mutations are serialized per org, build a new
//! snapshot off to the side and swap it in, so an in-flight scan never
//! sees a half-applied edit.

use guardrails_core::{OrgId, PatternType, Result, Rule, RuleId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::pattern::{Matcher, PatternCompiler};
use crate::suggestion::RuleSuggestion;

/// A rule together with its compiled matcher
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    matcher: Arc<Matcher>,
}

impl CompiledRule {
    pub fn compile(rule: Rule, compiler: &PatternCompiler) -> Result<Self> {
        let matcher = compiler
            .compile(&rule.pattern, rule.pattern_type)
            .map_err(|e| e.with_rule(&rule.id))?;
        Ok(Self {
            rule,
            matcher: Arc::new(matcher),
        })
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }
}

/// Immutable snapshot of an org's rules, in evaluation (creation) order
#[derive(Debug, Clone)]
pub struct RuleSet {
    org_id: OrgId,
    rules: Vec<CompiledRule>,
    version: u64,
}

impl RuleSet {
    pub fn empty(org_id: OrgId) -> Self {
        Self {
            org_id,
            rules: Vec::new(),
            version: 0,
        }
    }

    /// Compile a standalone rule set
    pub fn compile(org_id: OrgId, rules: Vec<Rule>, compiler: &PatternCompiler) -> Result<Self> {
        Self::empty(org_id).rebuild(rules, compiler)
    }

    /// Build the next snapshot, reusing matchers for unchanged patterns
    fn rebuild(&self, rules: Vec<Rule>, compiler: &PatternCompiler) -> Result<Self> {
        let cache: HashMap<(String, PatternType), Arc<Matcher>> = self
            .rules
            .iter()
            .map(|c| {
                (
                    (c.rule.pattern.clone(), c.rule.pattern_type),
                    Arc::clone(&c.matcher),
                )
            })
            .collect();

        let mut compiled = Vec::with_capacity(rules.len());
        let mut reused = 0usize;
        for rule in rules {
            let key = (rule.pattern.clone(), rule.pattern_type);
            let matcher = match cache.get(&key) {
                Some(existing) => {
                    reused += 1;
                    Arc::clone(existing)
                }
                None => Arc::new(
                    compiler
                        .compile(&rule.pattern, rule.pattern_type)
                        .map_err(|e| e.with_rule(&rule.id))?,
                ),
            };
            compiled.push(CompiledRule { rule, matcher });
        }

        debug!(
            org = %self.org_id,
            rules = compiled.len(),
            reused,
            "Built rule set snapshot"
        );

        Ok(Self {
            org_id: self.org_id.clone(),
            rules: compiled,
            version: self.version + 1,
        })
    }

    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    /// Incremented on every committed mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Active rules in evaluation order
    pub fn active(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|c| c.rule.is_active)
    }

    pub fn get(&self, id: &RuleId) -> Option<&CompiledRule> {
        self.rules.iter().find(|c| &c.rule.id == id)
    }

    /// Case-insensitive lookup by display name
    pub fn find_by_name(&self, name: &str) -> Option<&CompiledRule> {
        let name = name.trim();
        self.rules
            .iter()
            .find(|c| c.rule.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Working copy handed to a mutation; committed only if the closure succeeds
pub struct Transaction<'a> {
    compiler: &'a PatternCompiler,
    rules: Vec<Rule>,
    suggestions: Vec<RuleSuggestion>,
    rules_changed: bool,
}

impl<'a> Transaction<'a> {
    pub fn compiler(&self) -> &PatternCompiler {
        self.compiler
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut Vec<Rule> {
        self.rules_changed = true;
        &mut self.rules
    }

    pub fn rule_mut(&mut self, id: &RuleId) -> Option<&mut Rule> {
        self.rules_changed = true;
        self.rules.iter_mut().find(|r| &r.id == id)
    }

    pub fn name_taken(&self, name: &str) -> bool {
        let name = name.trim();
        self.rules.iter().any(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn suggestions(&self) -> &[RuleSuggestion] {
        &self.suggestions
    }

    pub fn suggestion_mut(&mut self, id: &str) -> Option<&mut RuleSuggestion> {
        self.suggestions.iter_mut().find(|s| s.id == id)
    }

    pub fn suggestions_mut(&mut self) -> &mut Vec<RuleSuggestion> {
        &mut self.suggestions
    }
}

/// Rules and suggestions of one organization
pub struct OrgRuleStore {
    org_id: OrgId,
    compiler: PatternCompiler,
    snapshot: RwLock<Arc<RuleSet>>,
    /// Also the per-org writer lock: held for the whole of a mutation
    suggestions: Mutex<Vec<RuleSuggestion>>,
}

impl OrgRuleStore {
    pub fn new(org_id: OrgId, compiler: PatternCompiler) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RuleSet::empty(org_id.clone()))),
            org_id,
            compiler,
            suggestions: Mutex::new(Vec::new()),
        }
    }

    /// Create a store pre-populated with rules (built-in defaults, fixtures)
    pub fn with_rules(org_id: OrgId, compiler: PatternCompiler, rules: Vec<Rule>) -> Result<Self> {
        let set = RuleSet::compile(org_id.clone(), rules, &compiler)?;
        let store = Self::new(org_id, compiler);
        *store.snapshot.write() = Arc::new(set);
        Ok(store)
    }

    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    pub fn compiler(&self) -> &PatternCompiler {
        &self.compiler
    }

    /// Current snapshot; cheap, and safe to hold across a whole scan
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.snapshot.read())
    }

    /// Copy of the current suggestions
    pub fn suggestions(&self) -> Vec<RuleSuggestion> {
        self.suggestions.lock().clone()
    }

    /// Run a serialized mutation.
    ///
    /// The closure edits a working copy. If it returns `Ok` and the rules
    /// compile, the new snapshot and suggestions are published together;
    /// on any error nothing changes.
    pub fn transact<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut suggestions = self.suggestions.lock();
        let current = self.snapshot();

        let mut tx = Transaction {
            compiler: &self.compiler,
            rules: current.rules().iter().map(|c| c.rule.clone()).collect(),
            suggestions: suggestions.clone(),
            rules_changed: false,
        };

        let value = f(&mut tx)?;

        if tx.rules_changed {
            let next = current.rebuild(tx.rules, &self.compiler)?;
            *self.snapshot.write() = Arc::new(next);
        }
        *suggestions = tx.suggestions;

        Ok(value)
    }
}

/// All org stores; lookups never block on another org's mutation
pub struct RuleStoreRegistry {
    compiler: PatternCompiler,
    orgs: RwLock<HashMap<OrgId, Arc<OrgRuleStore>>>,
}

impl RuleStoreRegistry {
    pub fn new(compiler: PatternCompiler) -> Self {
        Self {
            compiler,
            orgs: RwLock::new(HashMap::new()),
        }
    }

    pub fn compiler(&self) -> &PatternCompiler {
        &self.compiler
    }

    pub fn get(&self, org_id: &OrgId) -> Option<Arc<OrgRuleStore>> {
        self.orgs.read().get(org_id).cloned()
    }

    /// Fetch an org's store, creating it on first use.
    ///
    /// New stores are seeded with the built-in default rules when
    /// `seed_built_ins` is set.
    pub fn get_or_create(&self, org_id: &OrgId, seed_built_ins: bool) -> Result<Arc<OrgRuleStore>> {
        if let Some(store) = self.get(org_id) {
            return Ok(store);
        }

        // Compile outside the registry lock; a racing creator wins and
        // this copy is dropped.
        let rules = if seed_built_ins {
            crate::defaults::built_in_rules(org_id)
        } else {
            Vec::new()
        };
        let store = Arc::new(OrgRuleStore::with_rules(
            org_id.clone(),
            self.compiler.clone(),
            rules,
        )?);

        let mut orgs = self.orgs.write();
        let entry = orgs.entry(org_id.clone()).or_insert_with(|| {
            info!(org = %org_id, seeded = seed_built_ins, "Created rule store");
            store
        });
        Ok(Arc::clone(entry))
    }

    /// Register a store built elsewhere, replacing any existing one
    pub fn insert(&self, store: OrgRuleStore) -> Arc<OrgRuleStore> {
        let store = Arc::new(store);
        self.orgs
            .write()
            .insert(store.org_id().clone(), Arc::clone(&store));
        store
    }

    pub fn org_ids(&self) -> Vec<OrgId> {
        self.orgs.read().keys().cloned().collect()
    }
}

impl Default for RuleStoreRegistry {
    fn default() -> Self {
        Self::new(PatternCompiler::default())
    }
}
