mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use skyform_cloud_kamatera::config::{
    DEFAULT_API_URL, ENV_API_CLIENT_ID, ENV_API_SECRET, ENV_API_URL,
};
use skyform_cloud_kamatera::{KamateraProvider, PowerOperation, ProviderConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyform")]
#[command(about = "Provision and inspect Kamatera cloud servers", long_about = None)]
struct Cli {
    #[command(flatten)]
    api: ApiArgs,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Kamatera API session settings
#[derive(Args)]
struct ApiArgs {
    /// Kamatera API base URL
    #[arg(long, env = ENV_API_URL, default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Kamatera API client id
    #[arg(long, env = ENV_API_CLIENT_ID, hide_env_values = true, global = true)]
    api_client_id: Option<String>,

    /// Kamatera API secret
    #[arg(long, env = ENV_API_SECRET, hide_env_values = true, global = true)]
    api_secret: Option<String>,
}

impl ApiArgs {
    fn provider(&self) -> anyhow::Result<KamateraProvider> {
        let config = ProviderConfig::new(
            self.api_url.as_str(),
            self.api_client_id.clone().unwrap_or_default(),
            self.api_secret.clone().unwrap_or_default(),
        )?;
        Ok(KamateraProvider::new(config))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the API credentials
    Check,
    /// List datacenters available to the account
    Datacenters,
    /// List public images of a datacenter
    Images {
        /// Datacenter id, e.g. EU
        #[arg(short, long)]
        datacenter: String,
    },
    /// Server operations
    #[command(subcommand)]
    Server(ServerCommands),
    /// Show the disk changes between two disk size lists (offline)
    DiskPlan {
        /// Current disk sizes in GB as a JSON list, e.g. '[10, 20]'
        #[arg(long)]
        prior: String,
        /// Desired disk sizes in GB as a JSON list
        #[arg(long)]
        desired: String,
        /// Server id used in the printed requests
        #[arg(long, default_value = "<server-id>")]
        server_id: String,
    },
    /// Wait for a queued command to finish
    Wait {
        /// Command id returned by a mutating call
        command_id: String,
    },
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Show one server
    Show {
        /// Server name
        #[arg(required_unless_present = "id", conflicts_with = "id")]
        name: Option<String>,
        /// Internal server id
        #[arg(long)]
        id: Option<String>,
    },
    /// Power a server on or off
    Power {
        /// Internal server id
        id: String,
        state: PowerState,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PowerState {
    On,
    Off,
}

impl From<PowerState> for PowerOperation {
    fn from(state: PowerState) -> Self {
        match state {
            PowerState::On => PowerOperation::On,
            PowerState::Off => PowerOperation::Off,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that never reach the API
    match cli.command {
        Commands::Version => {
            println!("skyform {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::DiskPlan {
            ref prior,
            ref desired,
            ref server_id,
        } => return commands::disk_plan::handle(prior, desired, server_id),
        _ => {}
    }

    let provider = cli.api.provider()?;

    match cli.command {
        Commands::Check => commands::check::handle(&provider).await?,
        Commands::Datacenters => commands::datacenters::handle(&provider).await?,
        Commands::Images { datacenter } => commands::images::handle(&provider, &datacenter).await?,
        Commands::Server(ServerCommands::Show { name, id }) => {
            commands::server::show(&provider, name, id).await?
        }
        Commands::Server(ServerCommands::Power { id, state }) => {
            commands::server::power(&provider, &id, state.into()).await?
        }
        Commands::Wait { command_id } => commands::wait::handle(&provider, &command_id).await?,
        Commands::Version | Commands::DiskPlan { .. } => {
            unreachable!("offline commands are handled before the provider is built")
        }
    }

    Ok(())
}
