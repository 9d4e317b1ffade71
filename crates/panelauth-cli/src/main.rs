//! panelauth - sign in to an admin-panel backend from the terminal.
//!
//! Keeps the session between invocations: the short-lived tier lives in the
//! runtime directory, remembered sessions in the data directory or the OS
//! keychain.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::DateTime;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use panelauth_core::api::AuthBackend;
use panelauth_core::config::{DurableBackend, APP_NAME};
use panelauth_core::storage::{FileStore, KeyValueStore, KeyringStore};
use panelauth_core::{ApiClient, Config, Credentials, PasswordCipher, SessionManager};

const USAGE: &str = "\
Usage: panelauth <command>

Commands:
  login [--remember] [--days N] [username]   Sign in
  logout                                     Sign out everywhere
  status                                     Show the current session
  token                                      Print a valid access token
  refresh                                    Force a token refresh
  can <permission>...                        Check permissions (all must match)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let (manager, client) = build_manager(&config)?;

    match command.as_str() {
        "login" => login(&mut config, &manager, &client, &args[1..]).await,
        "logout" => {
            manager.init()?;
            manager.logout_remote().await?;
            println!("Logged out");
            Ok(())
        }
        "status" => status(&manager),
        "token" => {
            manager.init()?;
            let token = manager.valid_token().await?;
            println!("{}", token.token);
            Ok(())
        }
        "refresh" => {
            let token = manager.init()?.context("Not logged in")?;
            let fresh = manager.refresh(&token.refresh_token).await?;
            println!("Token refreshed, expires {}", format_expiry(fresh.expires));
            Ok(())
        }
        "can" => {
            let required: Vec<&str> = args[1..].iter().map(String::as_str).collect();
            if required.is_empty() {
                bail!("Usage: panelauth can <permission>...");
            }
            manager.init()?;
            if manager.has_permission(required.as_slice()) {
                println!("yes");
                Ok(())
            } else {
                println!("no");
                std::process::exit(1);
            }
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn build_manager(config: &Config) -> Result<(SessionManager, ApiClient)> {
    let client = ApiClient::new(config.base_url.clone())?;

    let short_lived: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.runtime_dir())?);
    let durable: Arc<dyn KeyValueStore> = match config.durable_backend {
        DurableBackend::File => Arc::new(FileStore::new(config.data_dir()?)?),
        DurableBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
    };

    let mut manager = SessionManager::new(Arc::new(client.clone()), short_lived, durable);
    if let Some(ref key) = config.encrypt_key {
        manager = manager.with_cipher(PasswordCipher::new(key)?);
    }
    manager.set_login_day(config.login_day);
    manager.set_remembered(config.remember);
    Ok((manager, client))
}

async fn login(
    config: &mut Config,
    manager: &SessionManager,
    client: &ApiClient,
    args: &[String],
) -> Result<()> {
    let mut remember = config.remember;
    let mut login_day = None;
    let mut username = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--remember" => remember = true,
            "--days" => {
                let days = iter.next().context("--days needs a value")?;
                login_day = Some(days.parse::<u32>().context("--days must be a number")?);
            }
            name => username = Some(name.to_string()),
        }
    }

    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let mut credentials = Credentials {
        remember,
        login_day,
        ..Credentials::new(username.clone(), password)
    };

    let login_config = client.login_config().await?;
    if login_config.captcha_switch {
        let captcha = client.captcha().await?;
        let path = save_captcha(&captcha.base64)?;
        println!("Captcha image written to {}", path.display());
        credentials.captcha_id = Some(captcha.cid);
        credentials.captcha = Some(prompt("Captcha: ")?);
    }

    let session = manager.login(credentials).await?;
    info!(username = %session.username, "Login succeeded");

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!(
        "Logged in as {} ({})",
        session.display_name(),
        if session.role_name.is_empty() { "no role" } else { session.role_name.as_str() }
    );
    if session.is_remembered {
        println!("Session remembered for {} days", session.login_day);
    }
    Ok(())
}

fn status(manager: &SessionManager) -> Result<()> {
    let Some(token) = manager.init()? else {
        println!("Not logged in");
        return Ok(());
    };

    let session = manager.session();
    println!("User:        {}", session.display_name());
    println!("Role:        {}", session.role_name);
    println!("Remembered:  {}", session.is_remembered);
    if session.is_remembered {
        println!("Login days:  {}", session.login_day);
    }
    println!("Expires:     {}", format_expiry(token.expires));
    println!("Permissions: {}", session.permissions.len());
    Ok(())
}

fn format_expiry(expires: i64) -> String {
    if expires <= 0 {
        return "end of session".to_string();
    }
    DateTime::from_timestamp_millis(expires)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| expires.to_string())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("{} is required", label.trim_end_matches(": "));
    }
    Ok(value)
}

/// Decode a captcha image (optionally a `data:` URL) into the temp directory.
fn save_captcha(encoded: &str) -> Result<PathBuf> {
    let payload = encoded
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded);
    let bytes = STANDARD
        .decode(payload.trim())
        .context("Captcha image is not valid base64")?;

    let path = std::env::temp_dir().join(format!("{}-captcha.png", APP_NAME));
    std::fs::write(&path, bytes)?;
    Ok(path)
}
