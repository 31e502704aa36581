use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gophkeeper_core::payload::{CardRecord, CredentialRecord};

use gophkeeper_cli::catalog::sqlite::SqliteCatalog;
use gophkeeper_cli::catalog::Catalog;
use gophkeeper_cli::commands::{self, resolve_secret};
use gophkeeper_cli::config::Config;

#[derive(Parser)]
#[command(name = "gophkeeper", about = "Zero-knowledge personal secrets keeper")]
struct Cli {
    /// Path to the client configuration file
    #[arg(long, default_value = "gophkeeper.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account
    Register {
        /// User login
        #[arg(short = 'l', long)]
        login: String,

        /// User password (prompted if omitted)
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Master password protecting the stored data (prompted if omitted)
        #[arg(short = 'm', long)]
        master_password: Option<String>,
    },

    /// Sign in to an existing account
    Auth {
        /// User login
        #[arg(short = 'l', long)]
        login: String,

        /// User password (prompted if omitted)
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Master password protecting the stored data (prompted if omitted)
        #[arg(short = 'm', long)]
        master_password: Option<String>,
    },

    /// Securely store data
    Store {
        #[command(subcommand)]
        what: StoreCommands,
    },

    /// List locally known resources
    List,

    /// Delete resources by id
    Delete {
        /// Resource ids to delete
        ids: Vec<String>,
    },

    /// Reconcile the local catalog with the server
    Sync,
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Store files
    Files {
        /// Paths of the files to store
        files: Vec<String>,
    },

    /// Store a payment card
    Card {
        /// Card identificator/name
        #[arg(short = 'i', long)]
        name: String,

        /// Card number
        #[arg(short = 'n', long)]
        number: String,

        /// Holder's name
        #[arg(short = 'u', long)]
        holder: String,

        /// Expiry date in MM/YY format
        #[arg(short = 'd', long)]
        expiry: String,

        /// Security code if present
        #[arg(short = 'c', long)]
        cvc: Option<String>,
    },

    /// Store login credentials
    Cred {
        /// Login
        #[arg(short = 'l', long)]
        username: String,

        /// Password (prompted if omitted)
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Resource the credentials belong to
        #[arg(short = 'u', long)]
        uri: String,

        /// Description
        #[arg(short = 'd', long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing (controlled by RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let catalog: Arc<dyn Catalog> = match SqliteCatalog::open(Path::new(&config.storage_path)) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Register {
            login,
            password,
            master_password,
        } => {
            let password = resolve_secret(password, "Enter password: ");
            let master = resolve_secret(master_password, "Enter master password: ");
            match (password, master) {
                (Ok(password), Ok(master)) => {
                    commands::register::run(&config, catalog, &login, &password, master).await
                }
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        }
        Commands::Auth {
            login,
            password,
            master_password,
        } => {
            let password = resolve_secret(password, "Enter password: ");
            let master = resolve_secret(master_password, "Enter master password: ");
            match (password, master) {
                (Ok(password), Ok(master)) => {
                    commands::auth::run(&config, catalog, &login, &password, master).await
                }
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        }
        Commands::Store { what } => match what {
            StoreCommands::Files { files } => {
                commands::store::files(&config, catalog, files).await
            }
            StoreCommands::Card {
                name,
                number,
                holder,
                expiry,
                cvc,
            } => {
                commands::store::card(
                    &config,
                    catalog,
                    CardRecord {
                        name,
                        number,
                        holder,
                        expiry_date: expiry,
                        security_code: cvc,
                    },
                )
                .await
            }
            StoreCommands::Cred {
                username,
                password,
                uri,
                description,
            } => match resolve_secret(password, "Enter credential password: ") {
                Ok(password) => {
                    commands::store::credentials(
                        &config,
                        catalog,
                        CredentialRecord {
                            username,
                            password,
                            uri,
                            description,
                        },
                    )
                    .await
                }
                Err(e) => Err(e),
            },
        },
        Commands::List => commands::list::run(catalog).await,
        Commands::Delete { ids } => commands::delete::run(&config, catalog, ids).await,
        Commands::Sync => commands::sync::run(&config, catalog).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
