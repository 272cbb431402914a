use std::process;

use clap::{Parser, Subcommand};

mod cmd;
mod print;

use print::Format;

/// Control-plane client for a drand daemon's loopback `Control`
/// service.
///
/// Example:
///     $ drandctl --control 127.0.0.1:8888 list-beacon-ids
///     $ drandctl --control 127.0.0.1:8888 follow-chain default --node http://peer:4444 --up-to 1000
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Address of the daemon's Control service.
    #[arg(long, default_value = "http://127.0.0.1:8888")]
    control: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stop one beacon id's process, or every process if omitted.
    Shutdown {
        #[arg(default_value = "")]
        beacon_id: String,
    },
    /// Start a `BeaconProcess` for a beacon id already present on disk.
    LoadBeacon { beacon_id: String },
    /// Copy a beacon id's database to a new location.
    BackupDb {
        beacon_id: String,
        output_file: String,
    },
    /// Pull historical rounds from peers up to a target round.
    FollowChain {
        beacon_id: String,
        #[arg(long = "node")]
        nodes: Vec<String>,
        #[arg(long)]
        up_to: u64,
    },
    /// Walk the local chain verifying signatures and linkage.
    CheckChain {
        beacon_id: String,
        #[arg(long = "node")]
        nodes: Vec<String>,
        /// Stop the walk at this round; 0 means "through the last stored round".
        #[arg(long, default_value_t = 0)]
        up_to: u64,
        /// Report invalid rounds without fetching repairs from peers.
        #[arg(long)]
        dry_run: bool,
    },
    /// List beacon ids currently loaded by the daemon.
    ListBeaconIds {
        #[arg(long, value_enum, default_value = "pretty")]
        format: Format,
    },
    /// List signature schemes this daemon build supports.
    ListSchemes {
        #[arg(long, value_enum, default_value = "pretty")]
        format: Format,
    },
    /// Ask the daemon to probe a list of peer addresses for liveness.
    RemoteStatus {
        addresses: Vec<String>,
        #[arg(long, value_enum, default_value = "pretty")]
        format: Format,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Shutdown { beacon_id } => cmd::control::shutdown(&cli.control, beacon_id).await,
        Commands::LoadBeacon { beacon_id } => cmd::control::load_beacon(&cli.control, beacon_id).await,
        Commands::BackupDb { beacon_id, output_file } => {
            cmd::control::backup_database(&cli.control, beacon_id, output_file).await
        }
        Commands::FollowChain { beacon_id, nodes, up_to } => {
            cmd::sync::follow_chain(&cli.control, beacon_id, nodes, up_to).await
        }
        Commands::CheckChain { beacon_id, nodes, up_to, dry_run } => {
            cmd::sync::check_chain(&cli.control, beacon_id, nodes, up_to, dry_run).await
        }
        Commands::ListBeaconIds { format } => cmd::control::list_beacon_ids(&cli.control, format).await,
        Commands::ListSchemes { format } => cmd::control::list_schemes(&cli.control, format).await,
        Commands::RemoteStatus { addresses, format } => {
            cmd::control::remote_status(&cli.control, addresses, format).await
        }
    };

    match output {
        Ok(result) => println!("{result}"),
        Err(err) => {
            eprintln!("{err}");
            process::exit(1)
        }
    }
}
