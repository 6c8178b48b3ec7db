//! Per-org settings
//!
//! Resolves the configured defaults and overrides into what the policy
//! crate consumes: a [`ResolverPolicy`], a [`SeedPolicy`] and an
//! [`EntitlementCheck`]. Override keys are lowercased on load because the
//! environment layer folds key case; org ids are expected in lowercase.

use guardrails_core::OrgId;
use guardrails_policy::{EntitlementCheck, PackRule, PolicyPack, ResolverPolicy, SeedPolicy};
use std::collections::HashMap;

use crate::config::{OrgDefaults, OrgOverrides};

/// Wildcard entry in an entitlement list
pub const ALL_PACKS: &str = "*";

#[derive(Debug, Clone, Default)]
pub struct OrgPolicies {
    defaults: OrgDefaults,
    overrides: HashMap<String, OrgOverrides>,
}

impl OrgPolicies {
    pub fn new(defaults: OrgDefaults, overrides: &HashMap<String, OrgOverrides>) -> Self {
        Self {
            defaults,
            overrides: overrides
                .iter()
                .map(|(org, o)| (org.to_ascii_lowercase(), o.clone()))
                .collect(),
        }
    }

    fn override_for(&self, org_id: &OrgId) -> Option<&OrgOverrides> {
        self.overrides.get(&org_id.as_str().to_ascii_lowercase())
    }

    pub fn resolver_policy(&self, org_id: &OrgId) -> ResolverPolicy {
        ResolverPolicy {
            sanitize_blocking: self
                .override_for(org_id)
                .and_then(|o| o.sanitize_blocking)
                .unwrap_or(self.defaults.sanitize_blocking),
        }
    }

    /// Seeding decision for every org named in configuration
    pub fn seed_policy(&self) -> SeedPolicy {
        SeedPolicy {
            default: self.defaults.seed_built_in_rules,
            overrides: self
                .overrides
                .iter()
                .filter_map(|(org, o)| o.seed_built_in_rules.map(|s| (OrgId::from(org.as_str()), s)))
                .collect(),
        }
    }

    pub fn entitlement(&self, org_id: &OrgId) -> PlanEntitlement {
        let packs = self
            .override_for(org_id)
            .and_then(|o| o.entitled_packs.clone())
            .unwrap_or_else(|| self.defaults.entitled_packs.clone());
        PlanEntitlement::new(packs)
    }
}

/// Permits the packs listed in an org's plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntitlement {
    packs: Vec<String>,
}

impl PlanEntitlement {
    pub fn new(packs: Vec<String>) -> Self {
        Self { packs }
    }
}

impl EntitlementCheck for PlanEntitlement {
    fn permits(&self, _org_id: &OrgId, pack: &PolicyPack, _rule: &PackRule) -> bool {
        self.packs.iter().any(|p| p == ALL_PACKS || p == &pack.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policies() -> OrgPolicies {
        let mut overrides = HashMap::new();
        overrides.insert(
            "Globex".to_string(),
            OrgOverrides {
                seed_built_in_rules: Some(false),
                sanitize_blocking: Some(true),
                entitled_packs: Some(vec![ALL_PACKS.to_string()]),
            },
        );
        OrgPolicies::new(OrgDefaults::default(), &overrides)
    }

    fn pack(name: &str) -> PolicyPack {
        PolicyPack::from_yaml(&format!(
            "name: {}\nrules:\n  - name: r\n    pattern: x\n    pattern_type: exact\n    category: custom\n    severity: warn\n",
            name
        ))
        .unwrap()
    }

    #[test]
    fn test_overrides_apply_case_insensitively() {
        let policies = policies();
        let globex = OrgId::from("globex");
        let acme = OrgId::from("acme");

        assert!(policies.resolver_policy(&globex).sanitize_blocking);
        assert!(!policies.resolver_policy(&acme).sanitize_blocking);
    }

    #[test]
    fn test_seed_policy() {
        let seeding = policies().seed_policy();
        assert!(!seeding.seeds(&OrgId::from("globex")));
        assert!(seeding.seeds(&OrgId::from("acme")));
    }

    #[test]
    fn test_plan_entitlement() {
        let policies = policies();
        let hipaa = pack("hipaa");
        let pii = pack("pii-basic");
        let rule = &hipaa.rules[0];

        let acme = OrgId::from("acme");
        let default_plan = policies.entitlement(&acme);
        assert!(!default_plan.permits(&acme, &hipaa, rule));
        assert!(default_plan.permits(&acme, &pii, rule));

        let globex = OrgId::from("globex");
        assert!(policies.entitlement(&globex).permits(&globex, &hipaa, rule));
    }
}
