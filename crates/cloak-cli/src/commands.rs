//! CLI command implementations.

use crate::AppContext;
use cloak_types::{Address, KeyRole};
use cloak_wallet::{
    AccountDirectory, KdfParams, KeyVault, Provenance, PublicKeyHash, SecretKey, SqliteStore, TxLog,
    VaultConfig, WalletError,
};
use std::path::Path;
use std::sync::Arc;

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

pub fn hex_to_32(s: &str) -> std::result::Result<[u8; 32], Box<dyn std::error::Error>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()).into());
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn prompt_password(prompt: &str) -> std::result::Result<String, Box<dyn std::error::Error>> {
    let pass = rpassword::prompt_password(prompt)?;
    if pass.is_empty() {
        return Err("password cannot be empty".into());
    }
    Ok(pass)
}

fn prompt_password_confirm(prompt: &str) -> std::result::Result<String, Box<dyn std::error::Error>> {
    let pass = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;
    if pass != confirm {
        return Err("passwords do not match".into());
    }
    Ok(pass)
}

fn parse_address(s: &str) -> std::result::Result<Address, Box<dyn std::error::Error>> {
    s.parse::<Address>()
        .map_err(|e| format!("invalid address {}: {}", s, e).into())
}

type Session = (Arc<KeyVault<SqliteStore>>, AccountDirectory<SqliteStore>);

fn open_session(ctx: &AppContext) -> std::result::Result<Session, Box<dyn std::error::Error>> {
    let path = &ctx.vault_path;
    let fresh = !path.exists();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let passphrase = if !ctx.encrypted {
        None
    } else if fresh {
        Some(prompt_password_confirm("New vault passphrase: ")?)
    } else {
        Some(prompt_password("Vault passphrase: ")?)
    };

    let kdf = KdfParams::default();
    let store = SqliteStore::open(path, passphrase.as_deref().map(str::as_bytes), &kdf)
        .map_err(|e| format!("cannot open vault {}: {}", path.display(), e))?;
    log::debug!("opened vault {} (encrypted: {})", path.display(), store.is_encrypted());

    let config = VaultConfig::default().with_salt(ctx.salt).with_kdf(kdf);
    let vault = Arc::new(KeyVault::new(Arc::new(store), config));
    let directory = AccountDirectory::open(Arc::clone(&vault))?;
    Ok((vault, directory))
}

fn print_public_keys(vault: &KeyVault<SqliteStore>, address: &Address) -> Result {
    for role in KeyRole::ALL {
        let pk = vault.get_public_key(address, role)?;
        println!("  {:<18} {}", role.name(), pk);
    }
    Ok(())
}

// ─── Commands ───────────────────────────────────────────────────────────────

pub fn create_account(ctx: &AppContext) -> Result {
    let (vault, mut directory) = open_session(ctx)?;
    let (address, secret) = vault.create_account()?;
    let index = directory.append_local(address)?;

    println!("Account created at index {}: {}", index, address);
    println!();
    println!("IMPORTANT: Write down the account secret and keep it safe!");
    println!("Anyone holding it controls the account.");
    println!();
    println!("  0x{}", secret.to_hex());
    println!();
    print_public_keys(&vault, &address)
}

pub fn import_account(ctx: &AppContext, secret: Option<String>) -> Result {
    let secret_hex = match secret {
        Some(s) => s,
        None => prompt_password("Account secret (hex): ")?,
    };
    let secret = SecretKey::from_hex(&secret_hex)?;

    let (vault, mut directory) = open_session(ctx)?;
    let address = match vault.add_account(&secret) {
        Ok(address) => address,
        Err(WalletError::DuplicateAccount(address)) => {
            println!("Account already in vault.");
            address
        }
        Err(e) => return Err(e.into()),
    };
    let index = directory.append_local(address)?;
    println!("Account imported at index {}: {}", index, address);
    Ok(())
}

pub fn list_accounts(ctx: &AppContext) -> Result {
    let (_, directory) = open_session(ctx)?;
    if directory.is_empty() {
        println!("No accounts. Use 'create' or 'import' first.");
        return Ok(());
    }
    for (index, entry) in directory.entries().iter().enumerate() {
        let marker = if directory.selected() == Some(index) { "*" } else { " " };
        println!("{} {:>3}  {:<8}  {}", marker, index, entry.provenance, entry.address);
    }
    Ok(())
}

pub fn select_account(ctx: &AppContext, index: Option<usize>) -> Result {
    let (_, mut directory) = open_session(ctx)?;
    directory.select(index)?;
    match index {
        Some(i) => println!("Selected {}: {}", i, directory.entries()[i].address),
        None => println!("Selection cleared."),
    }
    Ok(())
}

pub fn remove_account(ctx: &AppContext, index: usize) -> Result {
    let (_, mut directory) = open_session(ctx)?;
    let entry = directory.remove(index)?;
    println!("Removed {} account {}", entry.provenance, entry.address);
    match directory.selected() {
        Some(i) => println!("Selected {}: {}", i, directory.entries()[i].address),
        None => println!("No account selected."),
    }
    Ok(())
}

pub fn rotate_nullifier(ctx: &AppContext, address: &str, secret: Option<String>) -> Result {
    let address = parse_address(address)?;
    let secret = secret.as_deref().map(SecretKey::from_hex).transpose()?;
    let (vault, _) = open_session(ctx)?;
    let pk = vault.rotate_role(&address, KeyRole::Nullifier, secret)?;
    let generations = vault.public_key_history(&address, KeyRole::Nullifier)?.len();
    println!("Nullifier key rotated (generation {}): {}", generations - 1, pk);
    println!("Hash: {}", pk.hash());
    Ok(())
}

pub fn show_public_key(ctx: &AppContext, address: &str, role: KeyRole, history: bool) -> Result {
    let address = parse_address(address)?;
    let (vault, _) = open_session(ctx)?;
    if history {
        for (generation, pk) in vault.public_key_history(&address, role)?.iter().enumerate() {
            println!("{:>3}  {}  hash {}", generation, pk, pk.hash());
        }
    } else {
        let pk = vault.get_public_key(&address, role)?;
        println!("{}", pk);
        println!("hash {}", pk.hash());
    }
    Ok(())
}

pub fn resolve_hash(ctx: &AppContext, hash: &str, context: &str) -> Result {
    let hash: PublicKeyHash = hash.parse().map_err(|e| format!("invalid hash: {}", e))?;
    let context = parse_address(context)?;
    let (vault, _) = open_session(ctx)?;

    let location = vault.locate_public_key_hash(&hash)?;
    let siloed = vault.resolve_secret_by_public_key_hash(&hash, &context)?;
    println!("Account:    {}", location.address);
    println!("Role:       {}", location.role);
    println!("Generation: {}", location.generation);
    println!("Secret:     0x{}", siloed.to_hex());
    Ok(())
}

pub fn show_current(ctx: &AppContext) -> Result {
    let (vault, directory) = open_session(ctx)?;
    match directory.resolve_current() {
        Ok(current) => {
            println!("Account:    {}", current.address);
            println!("Provenance: {}", current.provenance);
            if current.provenance == Provenance::Local {
                println!();
                print_public_keys(&vault, &current.address)?;
            }
            Ok(())
        }
        Err(WalletError::WalletDisconnected(address)) => {
            println!("Account:    {}", address);
            println!("Provenance: external (session not connected)");
            Ok(())
        }
        Err(WalletError::NoAccountSelected) => {
            println!("No account selected.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn show_history(ctx: &AppContext, address: &str) -> Result {
    let address = parse_address(address)?;
    let (vault, _) = open_session(ctx)?;
    let log = TxLog::new(vault);
    let entries = log.entries(&address)?;
    if entries.is_empty() {
        println!("No transactions recorded.");
        return Ok(());
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{:>4}  {}", i, serde_json::to_string(entry)?);
    }
    Ok(())
}

pub fn export_account(ctx: &AppContext, address: &str, out: &Path) -> Result {
    let address = parse_address(address)?;
    if out.exists() {
        return Err(format!("file already exists: {}", out.display()).into());
    }
    let (vault, _) = open_session(ctx)?;
    let password = prompt_password_confirm("Backup password: ")?;
    let blob = vault.export_backup(&address, password.as_bytes())?;
    std::fs::write(out, blob)?;
    println!("Backup of {} written to {}", address, out.display());
    Ok(())
}

pub fn restore_account(ctx: &AppContext, file: &Path) -> Result {
    let blob = std::fs::read(file)?;
    if !cloak_wallet::encryption::is_encrypted_backup(&blob) {
        return Err(format!("not a cloak backup: {}", file.display()).into());
    }
    let password = prompt_password("Backup password: ")?;
    let (vault, mut directory) = open_session(ctx)?;
    let address = vault.import_backup(&blob, password.as_bytes())?;
    let index = directory.append_local(address)?;
    println!("Account restored at index {}: {}", index, address);
    Ok(())
}
