//! Policy packs
//!
//! A pack is a named, versioned bundle of rules defined in YAML. The
//! bundled packs are compiled into the binary; operators can add more
//! from a directory.

use guardrails_core::{Category, Error, OrgId, PatternType, Result, RuleDraft, RuleId, Severity};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

const BUNDLED_PACKS: &[(&str, &str)] = &[
    ("secrets-essentials", include_str!("../packs/secrets-essentials.yaml")),
    ("pii-basic", include_str!("../packs/pii-basic.yaml")),
    ("hipaa", include_str!("../packs/hipaa.yaml")),
    ("pci-dss", include_str!("../packs/pci-dss.yaml")),
];

/// A named bundle of rules installable in one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyPack {
    /// Pack identifier used for installation
    pub name: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Description of what this pack covers
    #[serde(default)]
    pub description: String,

    /// Version of the pack
    #[serde(default)]
    pub version: String,

    /// Regulatory framework this pack supports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulation: Option<String>,

    /// Rules in this pack
    pub rules: Vec<PackRule>,
}

impl PolicyPack {
    /// Load a pack from YAML string
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a pack from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| Error::config(format!("invalid pack {}: {}", path.display(), e)))
    }
}

/// One packaged rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    pub pattern_type: PatternType,
    pub category: Category,
    pub severity: Severity,
}

impl PackRule {
    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            pattern: self.pattern.clone(),
            pattern_type: self.pattern_type,
            category: self.category,
            severity: self.severity,
            is_active: true,
        }
    }
}

/// Plan entitlement predicate, supplied by the billing collaborator
pub trait EntitlementCheck: Send + Sync {
    fn permits(&self, org_id: &OrgId, pack: &PolicyPack, rule: &PackRule) -> bool;
}

impl<F> EntitlementCheck for F
where
    F: Fn(&OrgId, &PolicyPack, &PackRule) -> bool + Send + Sync,
{
    fn permits(&self, org_id: &OrgId, pack: &PolicyPack, rule: &PackRule) -> bool {
        self(org_id, pack, rule)
    }
}

/// Entitlement check that permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EntitlementCheck for AllowAll {
    fn permits(&self, _org_id: &OrgId, _pack: &PolicyPack, _rule: &PackRule) -> bool {
        true
    }
}

/// The set of packs available for installation
#[derive(Debug, Clone, Default)]
pub struct PackCatalog {
    packs: Vec<PolicyPack>,
}

impl PackCatalog {
    pub fn new(packs: Vec<PolicyPack>) -> Self {
        Self { packs }
    }

    /// The packs shipped with the engine
    pub fn bundled() -> Result<Self> {
        let packs = BUNDLED_PACKS
            .iter()
            .map(|(name, yaml)| {
                PolicyPack::from_yaml(yaml)
                    .map_err(|e| Error::config(format!("bundled pack {}: {}", name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { packs })
    }

    /// Add every `*.yaml` / `*.yml` pack found in a directory.
    ///
    /// A pack whose name is already present replaces the earlier one.
    /// Unreadable files are skipped with a warning.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
            {
                continue;
            }
            match PolicyPack::from_file(&path) {
                Ok(pack) => {
                    self.packs.retain(|p| p.name != pack.name);
                    self.packs.push(pack);
                    loaded += 1;
                }
                Err(e) => warn!("Failed to load pack {:?}: {}", path, e),
            }
        }
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Option<&PolicyPack> {
        self.packs.iter().find(|p| p.name == name)
    }

    pub fn packs(&self) -> &[PolicyPack] {
        &self.packs
    }
}

/// A rule created by a pack installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRule {
    pub rule_id: RuleId,
    pub name: String,
}

/// A packaged rule that was not installed, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRejection {
    pub name: String,
    pub kind: String,
    pub message: String,
}

impl RuleRejection {
    pub fn from_error(name: &str, err: &Error) -> Self {
        Self {
            name: name.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Exactly which packaged rules were created and which were not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackInstallReport {
    pub pack: String,

    pub created: Vec<InstalledRule>,

    /// Names already present in the org's rule set
    pub skipped: Vec<String>,

    /// Rules the org's plan does not permit
    pub denied: Vec<RuleRejection>,

    /// Rules that failed validation or compilation
    pub failed: Vec<RuleRejection>,
}
