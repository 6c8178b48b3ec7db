//! Rule lifecycle manager
//!
//! Every way a rule enters, changes in or leaves an org's rule set goes
//! through here: direct authoring, suggestion approval and pack
//! installation. Each operation takes the acting [`Actor`] explicitly and
//! only ever touches the actor's own org.

use guardrails_core::{
    Actor, Error, OrgId, PatternType, Result, Rule, RuleDraft, RuleId, RulePatch, RuleSource,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::pack::{
    EntitlementCheck, InstalledRule, PackCatalog, PackInstallReport, RuleRejection,
};
use crate::pattern::PatternPreview;
use crate::store::{OrgRuleStore, RuleStoreRegistry, Transaction};
use crate::suggestion::{RuleSuggestion, SuggestionDraft, SuggestionStatus};

/// Which orgs get the built-in rules on first use
#[derive(Debug, Clone)]
pub struct SeedPolicy {
    pub default: bool,
    pub overrides: HashMap<OrgId, bool>,
}

impl SeedPolicy {
    pub fn seeds(&self, org_id: &OrgId) -> bool {
        self.overrides.get(org_id).copied().unwrap_or(self.default)
    }
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            default: true,
            overrides: HashMap::new(),
        }
    }
}

/// Governs rule authoring, suggestions and pack installs
pub struct LifecycleManager {
    registry: Arc<RuleStoreRegistry>,
    catalog: PackCatalog,
    seeding: SeedPolicy,
}

impl LifecycleManager {
    pub fn new(registry: Arc<RuleStoreRegistry>, catalog: PackCatalog) -> Self {
        Self {
            registry,
            catalog,
            seeding: SeedPolicy::default(),
        }
    }

    pub fn with_seeding(mut self, seeding: SeedPolicy) -> Self {
        self.seeding = seeding;
        self
    }

    pub fn registry(&self) -> &Arc<RuleStoreRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &PackCatalog {
        &self.catalog
    }

    /// The org's store, created (and possibly seeded) on first use.
    ///
    /// Only write paths and scans call this.
    pub fn store(&self, org_id: &OrgId) -> Result<Arc<OrgRuleStore>> {
        self.registry
            .get_or_create(org_id, self.seeding.seeds(org_id))
    }

    // ---- rules ----

    /// Author a custom rule
    pub fn create_rule(&self, actor: &Actor, draft: RuleDraft) -> Result<Rule> {
        actor.require_privileged("create rules")?;
        let rule = Rule::from_draft(
            actor.org_id.clone(),
            draft,
            actor.user_id.as_str(),
            RuleSource::Custom,
        )?;

        let store = self.store(&actor.org_id)?;
        let created = store.transact(|tx| {
            ensure_name_free(tx, &rule.name, None)?;
            tx.rules_mut().push(rule.clone());
            Ok(rule)
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            rule = %created.id,
            pattern_type = %created.pattern_type,
            "Rule created"
        );
        Ok(created)
    }

    /// Apply a partial update; the pattern is recompiled when it changes
    pub fn update_rule(&self, actor: &Actor, rule_id: &RuleId, patch: RulePatch) -> Result<Rule> {
        actor.require_privileged("edit rules")?;

        let store = self.store(&actor.org_id)?;
        let updated = store.transact(|tx| {
            if let Some(name) = &patch.name {
                ensure_name_free(tx, name, Some(rule_id))?;
            }
            let rule = tx
                .rule_mut(rule_id)
                .ok_or_else(|| Error::not_found("rule", rule_id.as_str()))?;
            rule.apply_patch(&patch)?;
            Ok(rule.clone())
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            rule = %rule_id,
            recompiled = patch.touches_pattern(),
            "Rule updated"
        );
        Ok(updated)
    }

    /// Toggle a rule; allowed for built-in rules too
    pub fn set_rule_active(&self, actor: &Actor, rule_id: &RuleId, active: bool) -> Result<Rule> {
        self.update_rule(
            actor,
            rule_id,
            RulePatch {
                is_active: Some(active),
                ..Default::default()
            },
        )
    }

    /// Delete a custom rule. Past violations keep their rule snapshot.
    pub fn delete_rule(&self, actor: &Actor, rule_id: &RuleId) -> Result<Rule> {
        actor.require_privileged("delete rules")?;

        let store = self.store(&actor.org_id)?;
        let removed = store.transact(|tx| {
            let index = tx
                .rules()
                .iter()
                .position(|r| &r.id == rule_id)
                .ok_or_else(|| Error::not_found("rule", rule_id.as_str()))?;
            if tx.rules()[index].is_built_in {
                return Err(Error::BuiltInRule {
                    rule_id: rule_id.clone(),
                    operation: "deleted",
                });
            }
            Ok(tx.rules_mut().remove(index))
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            rule = %rule_id,
            "Rule deleted"
        );
        Ok(removed)
    }

    /// All rules of the actor's org, in evaluation order.
    ///
    /// Reads never create a store; an org nobody has written to or scanned
    /// for reports the rules it would be seeded with.
    pub fn list_rules(&self, actor: &Actor) -> Result<Vec<Rule>> {
        match self.registry.get(&actor.org_id) {
            Some(store) => Ok(store
                .snapshot()
                .rules()
                .iter()
                .map(|c| c.rule.clone())
                .collect()),
            None => Ok(self.unseeded_rules(&actor.org_id)),
        }
    }

    pub fn get_rule(&self, actor: &Actor, rule_id: &RuleId) -> Result<Rule> {
        let found = match self.registry.get(&actor.org_id) {
            Some(store) => store.snapshot().get(rule_id).map(|c| c.rule.clone()),
            None => self
                .unseeded_rules(&actor.org_id)
                .into_iter()
                .find(|r| &r.id == rule_id),
        };
        found.ok_or_else(|| Error::not_found("rule", rule_id.as_str()))
    }

    fn unseeded_rules(&self, org_id: &OrgId) -> Vec<Rule> {
        if self.seeding.seeds(org_id) {
            crate::defaults::built_in_rules(org_id)
        } else {
            Vec::new()
        }
    }

    /// Try a pattern against sample text without saving anything
    pub fn preview_pattern(
        &self,
        actor: &Actor,
        pattern: &str,
        pattern_type: PatternType,
        sample: &str,
    ) -> Result<PatternPreview> {
        actor.require_privileged("preview rules")?;
        self.registry.compiler().preview(pattern, pattern_type, sample)
    }

    // ---- suggestions ----

    /// Propose a rule for review; open to every role
    pub fn submit_suggestion(&self, actor: &Actor, draft: SuggestionDraft) -> Result<RuleSuggestion> {
        let suggestion = RuleSuggestion::new(actor.org_id.clone(), draft, actor.user_id.as_str())?;

        let store = self.store(&actor.org_id)?;
        let submitted = store.transact(|tx| {
            tx.suggestions_mut().push(suggestion.clone());
            Ok(suggestion)
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            suggestion = %submitted.id,
            "Suggestion submitted"
        );
        Ok(submitted)
    }

    /// Privileged actors see every suggestion; members see their own
    pub fn list_suggestions(
        &self,
        actor: &Actor,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<RuleSuggestion>> {
        let privileged = actor.role.is_privileged();
        let Some(store) = self.registry.get(&actor.org_id) else {
            return Ok(Vec::new());
        };
        Ok(store
            .suggestions()
            .into_iter()
            .filter(|s| privileged || s.suggested_by == actor.user_id)
            .filter(|s| status.map_or(true, |st| s.status == st))
            .collect())
    }

    /// Materialize a pending suggestion as an active rule.
    ///
    /// The reviewer supplies the pattern. If it fails to compile, or the
    /// suggestion already left `pending`, nothing changes.
    pub fn approve_suggestion(
        &self,
        actor: &Actor,
        suggestion_id: &str,
        pattern: String,
        pattern_type: PatternType,
    ) -> Result<Rule> {
        actor.require_privileged("approve suggestions")?;

        let store = self.store(&actor.org_id)?;
        let rule = store.transact(|tx| {
            let suggestion = tx
                .suggestions()
                .iter()
                .find(|s| s.id == suggestion_id)
                .ok_or_else(|| Error::not_found("suggestion", suggestion_id))?;
            suggestion.ensure_pending()?;

            let draft = RuleDraft {
                name: suggestion.name.clone(),
                description: suggestion.description.clone(),
                pattern,
                pattern_type,
                category: suggestion.category,
                severity: suggestion.severity,
                is_active: true,
            };
            let rule = Rule::from_draft(
                actor.org_id.clone(),
                draft,
                actor.user_id.as_str(),
                RuleSource::Suggestion(suggestion_id.to_string()),
            )?;
            ensure_name_free(tx, &rule.name, None)?;
            tx.compiler()
                .compile(&rule.pattern, rule.pattern_type)
                .map_err(|e| e.with_rule(&rule.id))?;

            if let Some(s) = tx.suggestion_mut(suggestion_id) {
                s.mark_approved(&actor.user_id, rule.id.clone())?;
            }
            tx.rules_mut().push(rule.clone());
            Ok(rule)
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            suggestion = %suggestion_id,
            rule = %rule.id,
            "Suggestion approved"
        );
        Ok(rule)
    }

    /// Reject a pending suggestion; the suggestion is kept for audit
    pub fn reject_suggestion(
        &self,
        actor: &Actor,
        suggestion_id: &str,
        reason: Option<String>,
    ) -> Result<RuleSuggestion> {
        actor.require_privileged("reject suggestions")?;

        let store = self.store(&actor.org_id)?;
        let rejected = store.transact(|tx| {
            let suggestion = tx
                .suggestion_mut(suggestion_id)
                .ok_or_else(|| Error::not_found("suggestion", suggestion_id))?;
            suggestion.mark_rejected(&actor.user_id, reason)?;
            Ok(suggestion.clone())
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            suggestion = %suggestion_id,
            "Suggestion rejected"
        );
        Ok(rejected)
    }

    // ---- packs ----

    /// Install every packaged rule the org lacks and is entitled to.
    ///
    /// Name collisions are skipped, entitlement refusals and invalid
    /// patterns are reported per rule; none of them aborts the pack.
    pub fn install_pack(
        &self,
        actor: &Actor,
        pack_name: &str,
        entitlement: &dyn EntitlementCheck,
    ) -> Result<PackInstallReport> {
        actor.require_privileged("install policy packs")?;
        let pack = self
            .catalog
            .get(pack_name)
            .ok_or_else(|| Error::not_found("pack", pack_name))?;

        let store = self.store(&actor.org_id)?;
        let report = store.transact(|tx| {
            let mut report = PackInstallReport {
                pack: pack.name.clone(),
                ..Default::default()
            };

            for packaged in &pack.rules {
                if tx.name_taken(&packaged.name) {
                    debug!(rule = %packaged.name, "Skipping packaged rule, name exists");
                    report.skipped.push(packaged.name.clone());
                    continue;
                }

                if !entitlement.permits(&actor.org_id, pack, packaged) {
                    let err = Error::Entitlement {
                        pack: pack.name.clone(),
                        rule_name: packaged.name.clone(),
                    };
                    report.denied.push(RuleRejection::from_error(&packaged.name, &err));
                    continue;
                }

                let rule = Rule::from_draft(
                    actor.org_id.clone(),
                    packaged.to_draft(),
                    actor.user_id.as_str(),
                    RuleSource::Pack(pack.name.clone()),
                )
                .and_then(|rule| {
                    tx.compiler()
                        .compile(&rule.pattern, rule.pattern_type)
                        .map_err(|e| e.with_rule(&rule.id))?;
                    Ok(rule)
                });

                match rule {
                    Ok(rule) => {
                        report.created.push(InstalledRule {
                            rule_id: rule.id.clone(),
                            name: rule.name.clone(),
                        });
                        tx.rules_mut().push(rule);
                    }
                    Err(e) => {
                        warn!(pack = %pack.name, rule = %packaged.name, error = %e, "Packaged rule rejected");
                        report.failed.push(RuleRejection::from_error(&packaged.name, &e));
                    }
                }
            }

            Ok(report)
        })?;

        info!(
            org = %actor.org_id,
            actor = %actor.user_id,
            pack = %report.pack,
            created = report.created.len(),
            skipped = report.skipped.len(),
            denied = report.denied.len(),
            failed = report.failed.len(),
            "Policy pack installed"
        );
        Ok(report)
    }
}

fn ensure_name_free(tx: &Transaction<'_>, name: &str, except: Option<&RuleId>) -> Result<()> {
    let name = name.trim();
    let clash = tx
        .rules()
        .iter()
        .any(|r| r.name.eq_ignore_ascii_case(name) && Some(&r.id) != except);
    if clash {
        return Err(Error::invalid_rule(format!(
            "a rule named '{}' already exists",
            name
        )));
    }
    Ok(())
}
