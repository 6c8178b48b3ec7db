//! Server configuration
//!
//! Layering, lowest precedence first: built-in defaults, the optional YAML
//! file, `GUARDRAILS__*` environment variables (`__` separates nested keys,
//! e.g. `GUARDRAILS__SCAN__RULE_BUDGET_MS=20`), then command-line flags.

use guardrails_core::MatchRedaction;
use guardrails_policy::{CompileOptions, ScanBudget};
use guardrails_telemetry::LedgerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,

    /// Listen port
    pub port: u16,

    pub scan: ScanSettings,

    /// Masking applied to matched text in records and responses
    pub redaction: MatchRedaction,

    pub audit: AuditSettings,

    /// Settings applied to every org without an override
    pub defaults: OrgDefaults,

    /// Per-org overrides, keyed by org id
    pub orgs: HashMap<String, OrgOverrides>,

    /// Extra policy packs (`*.yaml`) loaded next to the bundled ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packs_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".to_string(),
            port: 8080,
            scan: ScanSettings::default(),
            redaction: MatchRedaction::default(),
            audit: AuditSettings::default(),
            defaults: OrgDefaults::default(),
            orgs: HashMap::new(),
            packs_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file, environment and CLI overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GUARDRAILS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("defaults.entitled_packs"),
        );

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line flags on top of the loaded layers
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(dir) = &cli.audit_dir {
            self.audit.backend = AuditBackend::Jsonl;
            self.audit.dir = dir.clone();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan.rule_budget_ms == 0 {
            anyhow::bail!("scan.rule_budget_ms must be greater than zero");
        }
        if self.scan.max_content_bytes == 0 {
            anyhow::bail!("scan.max_content_bytes must be greater than zero");
        }
        if self.audit.max_file_size == 0 {
            anyhow::bail!("audit.max_file_size must be greater than zero");
        }
        Ok(())
    }
}

/// Scan limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Wall-clock budget for a single rule evaluation
    pub rule_budget_ms: u64,

    /// Largest content accepted by the scan endpoint, in bytes
    pub max_content_bytes: usize,

    /// Maximum compiled regex program size, in bytes
    pub regex_size_limit: usize,

    /// Maximum lazy DFA cache size, in bytes
    pub dfa_size_limit: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        let options = CompileOptions::default();
        Self {
            rule_budget_ms: 50,
            max_content_bytes: 1024 * 1024, // 1MB
            regex_size_limit: options.regex_size_limit,
            dfa_size_limit: options.dfa_size_limit,
        }
    }
}

impl ScanSettings {
    pub fn budget(&self) -> ScanBudget {
        ScanBudget {
            per_rule: Duration::from_millis(self.rule_budget_ms),
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            regex_size_limit: self.regex_size_limit,
            dfa_size_limit: self.dfa_size_limit,
        }
    }
}

/// Where violation records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// In-process only; records are lost on restart
    #[default]
    Memory,
    /// Hash-chained JSON-lines files
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub backend: AuditBackend,

    /// Ledger directory, used by the `jsonl` backend
    pub dir: PathBuf,

    /// Rotate ledger files at this size (bytes)
    pub max_file_size: u64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        let ledger = LedgerConfig::new("./guardrails-ledger");
        Self {
            backend: AuditBackend::Memory,
            dir: ledger.dir,
            max_file_size: ledger.max_file_size,
        }
    }
}

impl AuditSettings {
    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            dir: self.dir.clone(),
            max_file_size: self.max_file_size,
        }
    }
}

/// Org settings used when no override is present
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgDefaults {
    /// Give new orgs the built-in rules
    pub seed_built_in_rules: bool,

    /// Sanitize block-severity findings instead of rejecting the content
    pub sanitize_blocking: bool,

    /// Packs an org's plan permits; `*` permits every pack
    pub entitled_packs: Vec<String>,
}

impl Default for OrgDefaults {
    fn default() -> Self {
        Self {
            seed_built_in_rules: true,
            sanitize_blocking: false,
            entitled_packs: vec!["secrets-essentials".to_string(), "pii-basic".to_string()],
        }
    }
}

/// Per-org override; absent fields fall back to [`OrgDefaults`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgOverrides {
    pub seed_built_in_rules: Option<bool>,
    pub sanitize_blocking: Option<bool>,
    pub entitled_packs: Option<Vec<String>>,
}
