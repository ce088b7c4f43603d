// RidiSync - RIDI Books Library Export
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ridi_core::api::{self, AuthClient, OAuthCredentials, UserDevice};
use ridi_core::book::{BookAsset, BookService};
use ridi_core::crypto::recover_vault_credentials;
use ridi_core::file::{ExportService, ExportStatus};
use ridi_core::storage::{default_config_path, ConfigStore, UserData};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ridi")]
#[command(about = "RidiSync CLI - export books from a local RIDI library", long_about = None)]
struct Cli {
    /// Account config file (default: ~/.ridi_auth.json)
    #[arg(long, global = true, env = "RIDI_CONFIG")]
    config: Option<PathBuf>,

    /// Log progress details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered accounts
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// List downloaded books of the active account
    Books {
        /// Only books whose title contains this text
        #[arg(short, long)]
        name: Option<String>,
        /// Only the book with this id
        #[arg(short, long)]
        id: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Decrypt books into a directory
    Export {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Only books whose title contains this text
        #[arg(short, long)]
        name: Option<String>,
        /// Only the book with this id
        #[arg(short, long)]
        id: Option<String>,
        /// Export every book
        #[arg(short, long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Register this machine's device
    Login {
        /// Skip automatic login from the installed RIDI app
        #[arg(long)]
        manual: bool,
    },
    /// Remove the active account
    Logout,
    /// Make the n-th registered account active (see `auth list`)
    Switch { number: usize },
    /// Show registered accounts
    List {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("Cannot locate the config file")?,
    };
    let mut store = ConfigStore::load(config_path);

    match cli.command {
        Commands::Auth { command } => match command {
            AuthCommands::Login { manual } => login(&mut store, manual).await,
            AuthCommands::Logout => logout(&mut store),
            AuthCommands::Switch { number } => switch(&mut store, number),
            AuthCommands::List { json } => list_accounts(&store, json),
        },
        Commands::Books { name, id, json } => list_books(&store, name, id, json).await,
        Commands::Export {
            output,
            name,
            id,
            all,
        } => {
            if !all && name.is_none() && id.is_none() {
                bail!("Specify --all, --name or --id");
            }
            export(&store, output, name, id).await
        }
    }
}

async fn login(store: &mut ConfigStore, manual: bool) -> Result<()> {
    if !manual {
        let client = AuthClient::new().context("Failed to create HTTP client")?;
        let vault = recover_vault_credentials();
        let oauth = OAuthCredentials::from_env();

        if let Some(found) = client.auto_login(vault.as_ref(), oauth.as_ref()).await {
            register(store, &found.device)?;
            println!("Logged in automatically as {}", found.username);
            return Ok(());
        }
        println!("Automatic login unavailable, falling back to manual login.");
    }

    let url = api::login_url()?;
    println!("Open this URL in a browser:\n  {}", url);
    println!();
    println!("1. Log in to RIDI Books.");
    println!("2. You will be redirected to a page showing JSON text (device list).");
    println!("3. Copy ALL of it, paste it below and press Enter.");

    let input = prompt("\nPaste JSON > ")?;
    if input.is_empty() {
        bail!("No data entered");
    }

    let devices = api::parse_device_list(&input)?;
    if devices.is_empty() {
        bail!("No devices found in the provided JSON");
    }

    println!("\nSelect the device you are using for this machine:");
    println!("{:<4} {:<20} {:<40} {:<10}", "No.", "Device Name", "Device ID", "Code");
    println!("{}", "-".repeat(80));
    for (i, device) in devices.iter().enumerate() {
        println!(
            "{:<4} {:<20} {:<40} {:<10}",
            i + 1,
            device.device_nick.as_deref().unwrap_or("Unknown"),
            device.device_id,
            device.device_code
        );
    }

    let device = loop {
        let line = prompt("\nEnter number: ")?;
        match line.parse::<usize>() {
            Ok(n) if (1..=devices.len()).contains(&n) => break &devices[n - 1],
            Ok(_) => println!("Invalid selection."),
            Err(_) => println!("Please enter a number."),
        }
    };

    register(store, device)
}

fn register(store: &mut ConfigStore, device: &UserDevice) -> Result<()> {
    let user_idx = device.user_idx.to_string();
    store
        .add_user(&user_idx, &device.device_id, device.device_nick.as_deref())
        .context("Failed to save account")?;
    println!("Added user {} (Device: {})", user_idx, device.device_id);
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn logout(store: &mut ConfigStore) -> Result<()> {
    let Some(active) = store.active_user().map(|u| u.id.clone()) else {
        println!("No active user.");
        return Ok(());
    };
    if store.remove_user(&active)? {
        println!("User removed.");
    }
    Ok(())
}

fn switch(store: &mut ConfigStore, number: usize) -> Result<()> {
    let target = number
        .checked_sub(1)
        .and_then(|i| store.list_users().get(i))
        .cloned()
        .with_context(|| format!("No account number {}", number))?;

    store.switch_user(&target.id)?;
    println!("Switched to user {}", target.user_idx);
    Ok(())
}

fn list_accounts(store: &ConfigStore, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(store.data())?);
        return Ok(());
    }

    let users = store.list_users();
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    let active = store.active_user().map(|u| u.id.as_str());
    println!("Registered Users:");
    for (i, user) in users.iter().enumerate() {
        let marker = if Some(user.id.as_str()) == active { "*" } else { " " };
        println!(
            "{} {}. [{}] User: {}, Device: {}",
            marker,
            i + 1,
            user.id,
            user.user_idx,
            user.device_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn active_user(store: &ConfigStore) -> Result<UserData> {
    store
        .active_user()
        .cloned()
        .context("No active user. Run `ridi auth login` first")
}

async fn select_books(
    service: &BookService,
    user: &UserData,
    name: Option<&str>,
    id: Option<&str>,
) -> Result<Vec<BookAsset>> {
    let books = service.available_books(&user.user_idx)?;
    let books = service.filter_by_id(books, id)?;
    Ok(service.filter_by_name(books, &user.device_id, name).await)
}

async fn list_books(
    store: &ConfigStore,
    name: Option<String>,
    id: Option<String>,
    json: bool,
) -> Result<()> {
    let user = active_user(store)?;
    let service = BookService::new();
    let books = select_books(&service, &user, name.as_deref(), id.as_deref()).await?;

    let summaries = service
        .books_with_metadata(&books, &user.device_id, |current, total, _| {
            if !json {
                eprint!("\rReading metadata {}/{}", current, total);
            }
        })
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    eprintln!();
    println!("{:<12} {:<5} Title", "ID", "Type");
    println!("{}", "-".repeat(60));
    for book in &summaries {
        println!("{:<12} {:<5} {}", book.id, book.format.extension(), book.title);
    }
    Ok(())
}

async fn export(
    store: &ConfigStore,
    output: PathBuf,
    name: Option<String>,
    id: Option<String>,
) -> Result<()> {
    let user = active_user(store)?;
    let service = BookService::new();
    let books = select_books(&service, &user, name.as_deref(), id.as_deref()).await?;
    if books.is_empty() {
        bail!("No books matched");
    }

    println!("Found {} books. Exporting to {}", books.len(), output.display());
    let exporter = ExportService::new(output.clone());
    let summary = exporter
        .export_books(&books, &user.device_id, |progress| match &progress.status {
            ExportStatus::Processing => println!("  {} ...", progress.file_name),
            ExportStatus::Success(path) => println!("  -> {}", path.display()),
            ExportStatus::Failed(reason) => println!("  failed: {}", reason),
        })
        .await;

    println!("\nExported {}/{} books.", summary.success, summary.total);
    for failure in &summary.failures {
        println!("  {}: {}", failure.id, failure.reason);
    }
    if !summary.all_succeeded() {
        bail!("{} books failed", summary.failures.len());
    }
    Ok(())
}
