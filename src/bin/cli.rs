use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use profiles::account::AccountFactory;
use profiles::config::Configuration;
use profiles::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Manage profiles accounts", long_about = None)]
struct Args {
    /// Path to `config.yaml`.
    #[arg(long, short, env = "CONFIG_PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Create a regular account.
    CreateAccount {
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        name: String,
        /// Without password, the account cannot log in.
        #[arg(long, short)]
        password: Option<String>,
    },
    /// Create an account with staff and superuser rights.
    CreateSuperadmin {
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        name: String,
        #[arg(long, short)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match args.config {
        Some(path) => Configuration::default().path(path),
        None => Configuration::default(),
    }
    .read();

    // Only local logs: a short-lived command has nothing to export.
    if let Err(err) = telemetry::init(None, "warn") {
        eprintln!("Cannot initialize logging: {err}");
    }

    if config.postgres.is_none() {
        eprintln!("`postgres` entry is missing on `config.yaml`, nothing would be saved.");
        return ExitCode::FAILURE;
    }

    let state = match profiles::initialize_state(config).await {
        Ok(state) => state,
        Err(err) => {
            eprintln!("Cannot initialize: {err}");
            return ExitCode::FAILURE;
        },
    };

    let result = match args.cmd {
        Commands::CreateAccount {
            email,
            name,
            password,
        } => {
            state
                .accounts
                .create_account(&email, &name, password.as_deref())
                .await
        },
        Commands::CreateSuperadmin {
            email,
            name,
            password,
        } => {
            state
                .accounts
                .create_superadmin(&email, &name, &password)
                .await
        },
    };

    match result {
        Ok(account) => {
            println!("Account {account} has been created with id {}.", account.id);
            ExitCode::SUCCESS
        },
        Err(profiles::ServerError::Validation(errors)) => {
            for (field, issues) in errors.field_errors() {
                for issue in issues {
                    eprintln!("{field}: {issue}");
                }
            }
            ExitCode::FAILURE
        },
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        },
    }
}
