use std::process::ExitCode;

use clap::Parser;
use hc_ansible::{inventory, module, version};
use hc_infra::HetznerCloud;

#[derive(Debug, Parser)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print the whole inventory
    #[arg(long)]
    list: bool,

    /// Print variables of a single host (unsupported, `--list` carries them)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    module::init_tracing();
    let cli = Cli::parse();

    if cli.version {
        println!("{}", version::get());
        return ExitCode::SUCCESS;
    }
    if cli.host.is_some() {
        eprintln!("--host is unsupported");
        return ExitCode::FAILURE;
    }
    if !cli.list {
        eprintln!("--list is required");
        return ExitCode::FAILURE;
    }

    let client = match HetznerCloud::from_env(None) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error creating Hetzner Cloud client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let inventory = match inventory::collect(&client).await {
        Ok(inventory) => inventory,
        Err(e) => {
            eprintln!("Error listing servers: {e}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&inventory) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error encoding inventory: {e}");
            ExitCode::FAILURE
        }
    }
}
