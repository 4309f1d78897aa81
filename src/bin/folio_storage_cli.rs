//! Folio Storage CLI: command-line client for the storage API
//!
//! Usage:
//!   folio-storage-cli ls [path]                 List a folder
//!   folio-storage-cli tree [path]               Show a folder tree
//!   folio-storage-cli put <local> [remote-dir]  Upload a file or directory
//!   folio-storage-cli get <remote> [local]      Download a file
//!   folio-storage-cli cat <remote>              Print a text file
//!   folio-storage-cli write <remote>            Save stdin as a text file
//!
//! Remote paths are written `/folder/sub/name`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use folio_storage::config::load_config;
use folio_storage::folder_upload::collect_local_dir;
use folio_storage::tree_ops::EntryType;
use folio_storage::upload::UploadFile;
use folio_storage::{DirectoryEntry, ProviderError, RemotePath, StorageClient};

#[derive(Parser)]
#[command(
    name = "folio-storage-cli",
    about = "Folio Storage CLI: browse and transfer files on a storage server",
    version,
    long_about = "Settings are read from the user config directory (folio-storage/config.json)\nand can be overridden with FOLIO_STORAGE_URL and FOLIO_STORAGE_TOKEN."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// API base URL (overrides config and environment)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a remote folder
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a remote folder tree
    Tree {
        #[arg(default_value = "/")]
        path: String,
        /// Maximum depth to descend
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Create a folder
    Mkdir { path: String },
    /// Create an empty file
    Touch { path: String },
    /// Upload a local file or directory into a remote folder
    Put {
        local: PathBuf,
        #[arg(default_value = "/")]
        remote_dir: String,
    },
    /// Download a remote file
    Get {
        remote: String,
        /// Local destination (default: the remote file name)
        local: Option<PathBuf>,
    },
    /// Print a remote text file
    Cat { remote: String },
    /// Replace a remote text file with the content of stdin
    Write { remote: String },
    /// Move a file or folder into another folder
    Mv { remote: String, dest_dir: String },
    /// Rename a file or folder
    Rename { remote: String, new_name: String },
    /// Delete a file or folder
    Rm { remote: String },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Split `/a/b/name` into the parent folder and the final name.
fn split_remote(remote: &str) -> Result<(RemotePath, String)> {
    let path = RemotePath::parse_body_path(remote);
    match path.split_last() {
        Some((parent, name)) => Ok((parent, name.to_string())),
        None => bail!("'{}' does not name an entry", remote),
    }
}

/// Resolve a remote path to its parent, name and entry type.
async fn resolve(client: &StorageClient, remote: &str) -> Result<(RemotePath, String, EntryType)> {
    let (parent, name) = split_remote(remote)?;
    let entry = client.lookup(&parent, &name).await?;
    let entry_type = if entry.is_folder() {
        EntryType::Folder
    } else {
        EntryType::File
    };
    Ok((parent, name, entry_type))
}

fn progress_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}

fn print_listing(entries: &[DirectoryEntry]) {
    for entry in entries {
        match entry {
            DirectoryEntry::Folder { name } => println!("{:>12}  {:<6}  {}/", "-", "folder", name),
            DirectoryEntry::File { name, size, kind, .. } => {
                println!("{:>12}  {:<6}  {}", size, kind.as_str(), name)
            }
        }
    }
}

async fn put(client: &StorageClient, local: &Path, remote_dir: &str, cancel: &CancellationToken) -> Result<()> {
    let dest = RemotePath::parse_body_path(remote_dir);
    let metadata = tokio::fs::metadata(local)
        .await
        .with_context(|| format!("Cannot read {}", local.display()))?;

    if metadata.is_dir() {
        let files = collect_local_dir(local).await?;
        let total: u64 = files.iter().map(|f| f.file.size).sum();
        let pb = progress_bar(total, &format!("{} files", files.len()));
        let progress = |chunk: u64, _: u64, _: u64| pb.inc(chunk);
        let report = client
            .upload_folder(&dest, &files, Some(&progress), Some(cancel))
            .await;
        pb.finish_and_clear();
        let report = report?;
        println!(
            "Uploaded {} files ({} bytes), {} folders created",
            report.files_uploaded, report.bytes_uploaded, report.folders_created
        );
    } else {
        let file = UploadFile::from_path(local).await?;
        let pb = progress_bar(file.size, &file.name);
        let progress = |_: u64, uploaded: u64, _: u64| pb.set_position(uploaded);
        let report = client.upload_file(&file, &dest, Some(&progress), Some(cancel)).await;
        pb.finish_and_clear();
        let report = report?;
        println!(
            "Uploaded {} ({} bytes in {} chunks)",
            dest.to_body_path(Some(&file.name)),
            report.bytes_uploaded,
            report.total_chunks
        );
    }
    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let mut config = load_config();
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    let client = StorageClient::from_config(config)?;

    match cli.command {
        Commands::Ls { path } => {
            let entries = client.list_directory(&RemotePath::parse_body_path(&path)).await?;
            print_listing(&entries);
        }
        Commands::Tree { path, depth } => {
            let root = RemotePath::parse_body_path(&path);
            let arena = client.walk(&root, depth).await?;
            println!("{}", root);
            for node in arena.iter_depth_first() {
                let indent = "  ".repeat(node.depth + 1);
                let suffix = if node.entry.is_folder() { "/" } else { "" };
                println!("{}{}{}", indent, node.entry.name(), suffix);
            }
            println!("{} entries, {} bytes", arena.len(), arena.total_size());
        }
        Commands::Mkdir { path } => {
            let (parent, name) = split_remote(&path)?;
            client.create_folder(&parent, &name).await?;
        }
        Commands::Touch { path } => {
            let (parent, name) = split_remote(&path)?;
            client.create_empty_file(&parent, &name).await?;
        }
        Commands::Put { local, remote_dir } => put(&client, &local, &remote_dir, &cancel).await?,
        Commands::Get { remote, local } => {
            let (parent, name) = split_remote(&remote)?;
            let local = local.unwrap_or_else(|| PathBuf::from(&name));
            let bytes = client.download(&parent, &name, &local).await?;
            println!("Downloaded {} bytes to {}", bytes, local.display());
        }
        Commands::Cat { remote } => {
            let (parent, name) = split_remote(&remote)?;
            print!("{}", client.text_content(&parent, &name).await?);
        }
        Commands::Write { remote } => {
            let (parent, name) = split_remote(&remote)?;
            let mut content = String::new();
            tokio::io::stdin()
                .read_to_string(&mut content)
                .await
                .context("Failed to read stdin")?;
            client.save_text(&parent, &name, &content, Some(&cancel)).await?;
        }
        Commands::Mv { remote, dest_dir } => {
            let (parent, name, entry_type) = resolve(&client, &remote).await?;
            client
                .move_entry(entry_type, &parent, &name, &RemotePath::parse_body_path(&dest_dir))
                .await?;
        }
        Commands::Rename { remote, new_name } => {
            let (parent, name, entry_type) = resolve(&client, &remote).await?;
            client.rename(entry_type, &parent, &name, &new_name).await?;
        }
        Commands::Rm { remote } => {
            let (parent, name, entry_type) = resolve(&client, &remote).await?;
            client.delete(entry_type, &parent, &name).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        if e.downcast_ref::<ProviderError>().is_some_and(ProviderError::is_cancelled) {
            eprintln!("Cancelled.");
            std::process::exit(130);
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
