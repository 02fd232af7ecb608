use clap::{Parser, Subcommand};
use cloak_types::KeyRole;
use std::path::PathBuf;

mod commands;

/// Cloak key vault command-line interface.
#[derive(Parser)]
#[command(name = "cloak-wallet-cli")]
#[command(about = "Manage local Cloak accounts and their master keys")]
#[command(version)]
struct Cli {
    /// Vault file path.
    #[arg(long)]
    vault_file: Option<String>,

    /// Address salt as 32-byte hex (defaults to all zeros).
    #[arg(long, env = "CLOAK_ADDRESS_SALT")]
    salt: Option<String>,

    /// Store values unencrypted (no passphrase prompt).
    #[arg(long)]
    plaintext: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new local account and select it.
    Create,

    /// Import an account from its 32-byte secret and select it.
    Import {
        /// Secret as hex. Prompted for when omitted.
        #[arg(long)]
        secret: Option<String>,
    },

    /// List directory entries.
    List,

    /// Select an entry by index, or `none` to clear the selection.
    Select {
        target: SelectArg,
    },

    /// Remove an entry. Local accounts are deleted from the vault.
    Remove {
        index: usize,
    },

    /// Rotate an account's nullifier key.
    Rotate {
        #[arg(long)]
        address: String,

        /// New secret as hex (random when omitted).
        #[arg(long)]
        secret: Option<String>,
    },

    /// Show the latest public key of a role (all generations with --history).
    Pubkey {
        #[arg(long)]
        address: String,

        /// nullifier, incoming-viewing, outgoing-viewing, tagging or signing.
        #[arg(long)]
        role: KeyRole,

        #[arg(long)]
        history: bool,
    },

    /// Resolve a public key hash to its context-siloed secret.
    Resolve {
        #[arg(long)]
        hash: String,

        /// Address of the application the secret is siloed to.
        #[arg(long)]
        context: String,
    },

    /// Show the selected account.
    Current,

    /// Show an account's recorded transactions.
    History {
        #[arg(long)]
        address: String,
    },

    /// Write a password-encrypted backup of one account.
    Export {
        #[arg(long)]
        address: String,

        #[arg(long)]
        out: PathBuf,
    },

    /// Restore an account from a backup file and select it.
    Restore {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug)]
enum SelectArg {
    Index(usize),
    None,
}

impl std::str::FromStr for SelectArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::None);
        }
        s.parse()
            .map(Self::Index)
            .map_err(|_| format!("invalid selection: {} (use an index or 'none')", s))
    }
}

impl SelectArg {
    fn index(self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(i),
            Self::None => None,
        }
    }
}

/// Application context shared across commands.
struct AppContext {
    vault_path: PathBuf,
    salt: [u8; 32],
    encrypted: bool,
}

impl AppContext {
    fn from_cli(cli: &Cli) -> Result<Self, String> {
        let vault_path = if let Some(ref path) = cli.vault_file {
            PathBuf::from(path)
        } else {
            default_vault_dir().join("vault.db")
        };

        let salt = match cli.salt {
            Some(ref s) => commands::hex_to_32(s).map_err(|e| format!("invalid salt: {}", e))?,
            None => [0u8; 32],
        };

        Ok(Self {
            vault_path,
            salt,
            encrypted: !cli.plaintext,
        })
    }
}

fn default_vault_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloak")
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let ctx = match AppContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Create => commands::create_account(&ctx),
        Commands::Import { secret } => commands::import_account(&ctx, secret),
        Commands::List => commands::list_accounts(&ctx),
        Commands::Select { target } => commands::select_account(&ctx, target.index()),
        Commands::Remove { index } => commands::remove_account(&ctx, index),
        Commands::Rotate { address, secret } => commands::rotate_nullifier(&ctx, &address, secret),
        Commands::Pubkey {
            address,
            role,
            history,
        } => commands::show_public_key(&ctx, &address, role, history),
        Commands::Resolve { hash, context } => commands::resolve_hash(&ctx, &hash, &context),
        Commands::Current => commands::show_current(&ctx),
        Commands::History { address } => commands::show_history(&ctx, &address),
        Commands::Export { address, out } => commands::export_account(&ctx, &address, &out),
        Commands::Restore { file } => commands::restore_account(&ctx, &file),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
