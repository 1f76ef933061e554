use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "langdetect-server")]
#[command(
    author,
    version,
    about = "HTTP language detection backed by the CLD3 wasm engine"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "langdetect.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT")]
    pub port: Option<u16>,

    /// Path to the wasm artifact
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Directory holding index.html, the wrapper and the artifact
    #[arg(short, long)]
    pub static_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
