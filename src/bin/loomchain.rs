//! Loomchain CLI: inspect configuration, plan imports, and run a local simulation.
//!
//! Usage:
//!   loomchain config [--config path]
//!   loomchain plan-import <FILE> --old-root <ID>
//!   loomchain simulate --count N --model M [--prompt text] [--placement kind] [--config path]

use clap::{Parser, Subcommand};
use loomchain::config::default_config_path;
use loomchain::{
    order_for_import, GenerateRequest, GenerationParams, ImportNode, LoomApi, LoomConfig, MemoryChain,
    MemoryContentStore, MockProvider, NodeId, Placement, RecordingSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "loomchain",
    version,
    about = "Transaction ordering and event reconciliation for loom trees"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as YAML
    Config {
        /// Path to a YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the order an import would place nodes in
    PlanImport {
        /// JSON file holding an array of nodes
        file: PathBuf,
        /// Root id of the source tree
        #[arg(long)]
        old_root: String,
    },
    /// Generate children against an in-memory chain and print every event
    Simulate {
        /// Number of continuations to request
        #[arg(long, default_value_t = 3)]
        count: usize,
        /// Model identifier passed to the provider
        #[arg(long, default_value = "mock-model")]
        model: String,
        /// Root passage
        #[arg(long, default_value = "Once upon a time")]
        prompt: String,
        /// lightweight, token_bearing or store_backed
        #[arg(long, default_value = "lightweight", value_parser = parse_placement)]
        placement: Placement,
        /// Path to a YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loomchain=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LoomConfig, String> {
    LoomConfig::load_or_default(path).map_err(|e| format!("Failed to load config: {}", e))
}

/// Placement names are the serde names of [`Placement`].
fn parse_placement(value: &str) -> Result<Placement, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown placement '{}'", value))
}

fn cmd_config(path: Option<&Path>) -> i32 {
    let config = match load_config(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match config.to_yaml() {
        Ok(yaml) => {
            if path.is_none() {
                if let Some(p) = default_config_path() {
                    println!("# default location: {}", p.display());
                }
            }
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_plan_import(file: &Path, old_root: &str) -> i32 {
    let raw = match std::fs::read_to_string(file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", file.display(), e);
            return 1;
        }
    };
    let nodes: Vec<ImportNode> = match serde_json::from_str(&raw) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Error: invalid node list: {}", e);
            return 1;
        }
    };

    let order = order_for_import(&nodes, &NodeId::from_string(old_root));
    for (i, node) in order.ordered.iter().enumerate() {
        println!("{:>4}  {}  <- {}", i + 1, node.node_id, node.parent_id);
    }
    println!(
        "{} nodes, {} with unresolvable parents",
        order.ordered.len(),
        order.unresolved
    );
    if order.is_complete() {
        0
    } else {
        2
    }
}

async fn cmd_simulate(
    count: usize,
    model: String,
    prompt: String,
    placement: Placement,
    config: Option<&Path>,
) -> i32 {
    let config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let chain = Arc::new(MemoryChain::new("0x5151000000000000000000000000000000000001"));
    let (tree, root) = chain.create_tree(&prompt, placement.mints_token());
    let sink = Arc::new(RecordingSink::new());
    let api = LoomApi::new(
        chain.clone(),
        Arc::new(MockProvider::always(" and the loom kept weaving.", 6)),
        Arc::new(MemoryContentStore::new()),
        sink.clone(),
        config,
    );

    let result = api
        .generate_children(GenerateRequest {
            tree,
            parent_id: root,
            parent_content: None,
            count,
            requester: None,
            model_id: model,
            params: GenerationParams::default(),
            placement,
        })
        .await;

    for event in sink.events() {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Error: failed to encode event: {}", e),
        }
    }

    match result {
        Ok(summary) if summary.success => 0,
        Ok(_) => 2,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Config { config } => cmd_config(config.as_deref()),
        Commands::PlanImport { file, old_root } => cmd_plan_import(&file, &old_root),
        Commands::Simulate {
            count,
            model,
            prompt,
            placement,
            config,
        } => {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Error: failed to start runtime: {}", e);
                    std::process::exit(1);
                }
            };
            runtime.block_on(cmd_simulate(count, model, prompt, placement, config.as_deref()))
        }
    };
    std::process::exit(code);
}
