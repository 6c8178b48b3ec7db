use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "guardrails-server")]
#[command(about = "Guardrails DLP scanning and rule management service", long_about = None)]
pub struct Cli {
    /// Configuration file path (YAML); missing files are ignored
    #[arg(short, long, env = "GUARDRAILS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Store violations as a JSON-lines ledger in this directory
    #[arg(long)]
    pub audit_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}
