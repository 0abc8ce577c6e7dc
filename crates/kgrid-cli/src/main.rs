//! kgrid — provision grids of Kubernetes clusters and deploy an application to all of them.
//!
//! ```text
//! kgrid create --from-yaml grid.yaml --app app.yaml
//! kgrid get grids
//! kgrid get namespaces --grid nightly -c grid-0123
//! kgrid delete --from-yaml grid.yaml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "kgrid",
    about = "kgrid — multi-cluster Kubernetes test grids",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Grids document to read and write (default: ~/.kgrid/config.yaml).
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// kgrid.toml with timeouts and binary paths (default: ~/.kgrid/kgrid.toml if present).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a grid, optionally deploying an application to it.
    Create {
        /// Grid manifest.
        #[arg(long)]
        from_yaml: PathBuf,
        /// Override the grid name from the manifest.
        #[arg(long)]
        name: Option<String>,
        /// Application manifest to deploy once every cluster is up.
        #[arg(long)]
        app: Option<PathBuf>,
    },
    /// Deploy an application to every cluster of an existing grid.
    Deploy {
        #[arg(long)]
        grid: String,
        /// Application manifest.
        #[arg(long)]
        app: PathBuf,
    },
    /// Tear down the clusters a grid created and forget the grid.
    Delete {
        #[arg(long)]
        from_yaml: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// List resources.
    Get {
        #[command(subcommand)]
        resource: GetResource,
    },
    /// Show one resource in detail.
    Describe {
        #[command(subcommand)]
        resource: DescribeResource,
    },
    /// Print the effective settings as TOML.
    Settings,
    /// Print the kgrid version.
    Version,
}

#[derive(Subcommand)]
enum GetResource {
    /// All grids with their cluster counts.
    Grids {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Namespaces in one cluster of a grid.
    #[command(visible_aliases = ["namespace", "ns"])]
    Namespaces {
        #[arg(long)]
        grid: String,
        /// Name of the cluster to list namespaces in.
        #[arg(short, long)]
        cluster: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

#[derive(Subcommand)]
enum DescribeResource {
    Grid {
        name: String,
        /// Include each cluster's kubeconfig.
        #[arg(long)]
        show_kubeconfig: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => "info,kgrid=debug".parse()?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let global = commands::GlobalArgs {
        config_file: cli.config_file,
        settings: cli.settings,
    };

    match cli.command {
        Commands::Create {
            from_yaml,
            name,
            app,
        } => commands::grid::create(&global, &from_yaml, name.as_deref(), app.as_deref()).await,
        Commands::Deploy { grid, app } => commands::grid::deploy(&global, &grid, &app).await,
        Commands::Delete { from_yaml, name } => {
            commands::grid::delete(&global, &from_yaml, name.as_deref()).await
        }
        Commands::Get { resource } => match resource {
            GetResource::Grids { output } => commands::inspect::get_grids(&global, output),
            GetResource::Namespaces {
                grid,
                cluster,
                output,
            } => commands::inspect::get_namespaces(&global, &grid, &cluster, output).await,
        },
        Commands::Describe { resource } => match resource {
            DescribeResource::Grid {
                name,
                show_kubeconfig,
                output,
            } => commands::inspect::describe_grid(&global, &name, show_kubeconfig, output),
        },
        Commands::Settings => commands::inspect::settings(&global),
        Commands::Version => {
            println!("kgrid {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
