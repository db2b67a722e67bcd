//! fragbox - single-shot sandboxed execution of code fragments.
//!
//! Usage:
//!   fragbox run --backend python < fragment.py     # exit status is the result
//!   fragbox command --backend riscv                # print the launch argv
//!   fragbox serve [--port 8080]                    # HTTP service mode

use clap::{Parser, Subcommand};
use fragbox::backend::BackendKind;
use fragbox::config::SandboxConfig;
use fragbox::launcher::{EnvironmentId, LaunchSpec, OutputMode};
use fragbox::state::AppState;
use fragbox::supervisor::Supervisor;
use std::io::Read;
use std::path::PathBuf;
use std::process::exit;
use tracing_subscriber::EnvFilter;

/// Usage-class failures (bad config, unreadable stdin).
const USAGE_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "fragbox")]
#[command(about = "Run an untrusted code fragment in a throwaway container")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file
    #[arg(long, global = true, env = "FRAGBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Container runtime client executable
    #[arg(long, global = true, env = "FRAGBOX_RUNTIME")]
    runtime: Option<String>,

    /// Image for the selected backend
    #[arg(long, global = true)]
    image: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Read a fragment from stdin and run it
    Run {
        #[arg(long, value_enum)]
        backend: BackendKind,
    },
    /// Print the launch command without running anything
    Command {
        #[arg(long, value_enum)]
        backend: BackendKind,
    },
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args, backend: Option<BackendKind>) -> SandboxConfig {
    let mut config = match &args.config {
        Some(path) => match SandboxConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                exit(USAGE_EXIT_CODE);
            }
        },
        None => SandboxConfig::default(),
    };
    if let Some(runtime) = &args.runtime {
        config.runtime = runtime.clone();
    }
    if let Some(image) = &args.image {
        match backend {
            Some(BackendKind::Python) => config.interpreted_image = image.clone(),
            Some(BackendKind::Riscv) => config.emulated_image = image.clone(),
            None => {
                eprintln!("Error: --image needs a backend");
                exit(USAGE_EXIT_CODE);
            }
        }
    }
    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Commands::Run { backend } => {
            init_tracing("warn");
            let config = load_config(&args, Some(backend));

            let mut fragment = Vec::new();
            if let Err(e) = std::io::stdin().lock().read_to_end(&mut fragment) {
                eprintln!("Error: reading fragment from stdin: {}", e);
                exit(USAGE_EXIT_CODE);
            }

            let report = Supervisor::new(&config)
                .run(backend, &fragment, OutputMode::Inherit)
                .await;
            exit(report.exit_code());
        }
        Commands::Command { backend } => {
            let config = load_config(&args, Some(backend));
            let strategy = backend.build(&config);
            let id = match EnvironmentId::generate(&config.name_prefix) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit(1);
                }
            };
            let spec = LaunchSpec {
                runtime: &config.runtime,
                id: &id,
                backend: strategy.as_ref(),
                output: OutputMode::Inherit,
            };
            for arg in spec.argv() {
                println!("{}", arg);
            }
        }
        Commands::Serve { port } => {
            init_tracing("info");
            let config = load_config(&args, None);
            if let Err(e) = fragbox::http_server::run_server(port, AppState::new(config)).await {
                eprintln!("Error: {}", e);
                exit(1);
            }
        }
    }
}
