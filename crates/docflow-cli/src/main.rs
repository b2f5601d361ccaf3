//! docflow CLI: register capabilities, route requests and drive document
//! pipelines.
//!
//! Reuses the same core (docflow-core) and server bootstrap
//! (docflow-server) as the HTTP API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docflow_cli::commands::{self, GlobalOptions};

/// docflow: route document requests to capabilities and run their pipelines
#[derive(Parser)]
#[command(name = "docflow", version, about = "docflow: document generation routing and pipelines")]
pub struct Cli {
    /// Path to the SQLite database file (overrides server.db_path)
    #[arg(long, env = "DOCFLOW_DB_PATH", global = true)]
    db: Option<String>,

    /// Path to a docflow.yaml config file
    #[arg(long, env = "DOCFLOW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Root directory input files are resolved under (overrides resolver.root)
    #[arg(long, env = "DOCFLOW_ROOT", global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the docflow HTTP server
    Server {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage capabilities
    Capability {
        #[command(subcommand)]
        action: CapabilityAction,
    },

    /// Show which capability a request routes to
    Route {
        /// Free-form request text
        query: String,
    },

    /// Resolve a capability's input files without submitting
    Resolve {
        /// Capability name
        capability: String,
        /// Parameter as key=value (repeatable)
        #[arg(long = "param", short = 'P')]
        params: Vec<String>,
    },

    /// Submit a task from free text, or for a named capability
    Submit {
        /// Free-form request text (routed)
        #[arg(conflicts_with = "capability", required_unless_present = "capability")]
        query: Option<String>,
        /// Capability name (skips routing)
        #[arg(long)]
        capability: Option<String>,
        /// Parameter as key=value (repeatable, with --capability)
        #[arg(long = "param", short = 'P', requires = "capability")]
        params: Vec<String>,
        /// Wait for the task to finish and print its outcome
        #[arg(long)]
        wait: bool,
        /// Maximum seconds to wait with --wait
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },

    /// Inspect and cancel tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Send a raw JSON-RPC request
    Rpc {
        /// JSON-RPC method name (e.g. "tasks.list")
        #[arg(long)]
        method: String,
        /// JSON-RPC params as a JSON string
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[derive(Subcommand)]
enum CapabilityAction {
    /// Register or update a capability from a YAML/JSON descriptor file
    Register {
        /// Descriptor file
        file: PathBuf,
    },
    /// List registered capabilities
    List,
    /// Show one capability
    Get { name: String },
    /// Remove a capability
    Remove { name: String },
    /// Free-text search over names and descriptions
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// List tasks, newest first
    List {
        /// Filter by status (e.g. COMPLETED, FAILED)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show a task and its aggregated outcome
    Get { id: String },
    /// Cancel a task that has not finished
    Cancel { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docflow_core=warn,docflow_server=info,docflow_cli=info".into()),
        )
        .init();

    let opts = GlobalOptions {
        db: cli.db,
        config: cli.config,
        root: cli.root,
    };

    let result = if let Some(command) = cli.command {
        match command {
            Commands::Server { host, port } => match commands::load_config(&opts) {
                Ok(config) => commands::server::run(config, host, port).await,
                Err(e) => Err(e),
            },

            Commands::Capability { action } => {
                let state = commands::init_state(&opts).await;
                match action {
                    CapabilityAction::Register { file } => {
                        commands::capability::register(&state, &file).await
                    }
                    CapabilityAction::List => commands::capability::list(&state).await,
                    CapabilityAction::Get { name } => {
                        commands::capability::get(&state, &name).await
                    }
                    CapabilityAction::Remove { name } => {
                        commands::capability::remove(&state, &name).await
                    }
                    CapabilityAction::Search { query, limit } => {
                        commands::capability::search(&state, &query, limit).await
                    }
                }
            }

            Commands::Route { query } => {
                let state = commands::init_state(&opts).await;
                commands::route::run(&state, &query).await
            }

            Commands::Resolve { capability, params } => {
                let state = commands::init_state(&opts).await;
                commands::resolve::run(&state, &capability, &params).await
            }

            Commands::Submit {
                query,
                capability,
                params,
                wait,
                timeout_secs,
            } => {
                let state = commands::init_state(&opts).await;
                let target = match (&query, &capability) {
                    (_, Some(name)) => commands::task::SubmitTarget::Capability {
                        name,
                        params: &params,
                    },
                    (Some(q), None) => commands::task::SubmitTarget::Query(q),
                    (None, None) => {
                        eprintln!("Error: give a query or --capability");
                        std::process::exit(2);
                    }
                };
                commands::task::submit(&state, target, wait.then_some(timeout_secs)).await
            }

            Commands::Task { action } => {
                let state = commands::init_state(&opts).await;
                match action {
                    TaskAction::List { status, limit } => {
                        commands::task::list(&state, status.as_deref(), limit).await
                    }
                    TaskAction::Get { id } => commands::task::get(&state, &id).await,
                    TaskAction::Cancel { id } => commands::task::cancel(&state, &id).await,
                }
            }

            Commands::Rpc { method, params } => {
                let state = commands::init_state(&opts).await;
                commands::rpc::call(&state, &method, &params).await
            }
        }
    } else {
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
