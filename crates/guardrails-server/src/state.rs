//! Shared application state

use guardrails_core::MatchRedaction;
use guardrails_policy::{LifecycleManager, PackCatalog, PatternCompiler, RuleStoreRegistry, ScanEngine};
use guardrails_telemetry::{JsonlRecorder, MemoryRecorder, ViolationRecorder};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use crate::config::{AuditBackend, ServerConfig};
use crate::org::OrgPolicies;

/// State handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub engine: ScanEngine,
    pub recorder: Arc<dyn ViolationRecorder>,
    pub orgs: Arc<OrgPolicies>,
    pub redaction: MatchRedaction,
    pub max_content_bytes: usize,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state from configuration, opening the configured ledger
    pub fn from_config(config: &ServerConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<Self> {
        let recorder: Arc<dyn ViolationRecorder> = match config.audit.backend {
            AuditBackend::Memory => {
                info!("Violations are kept in memory only");
                Arc::new(MemoryRecorder::new())
            }
            AuditBackend::Jsonl => {
                let recorder = JsonlRecorder::open(config.audit.ledger())?;
                info!(dir = %recorder.dir().display(), "Violation ledger opened");
                Arc::new(recorder)
            }
        };

        let mut catalog = PackCatalog::bundled()?;
        if let Some(dir) = &config.packs_dir {
            let loaded = catalog.load_dir(dir)?;
            info!(dir = %dir.display(), loaded, "Loaded additional policy packs");
        }

        Ok(Self::new(config, catalog, recorder, metrics))
    }

    /// Build state around an existing recorder
    pub fn new(
        config: &ServerConfig,
        catalog: PackCatalog,
        recorder: Arc<dyn ViolationRecorder>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let orgs = OrgPolicies::new(config.defaults.clone(), &config.orgs);
        let registry = Arc::new(RuleStoreRegistry::new(PatternCompiler::new(
            config.scan.compile_options(),
        )));
        let lifecycle = LifecycleManager::new(registry, catalog).with_seeding(orgs.seed_policy());

        Self {
            lifecycle: Arc::new(lifecycle),
            engine: ScanEngine::new(config.scan.budget()),
            recorder,
            orgs: Arc::new(orgs),
            redaction: config.redaction,
            max_content_bytes: config.scan.max_content_bytes,
            metrics,
        }
    }
}
