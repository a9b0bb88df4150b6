//! CLI commands and output formatting.

use clap::Subcommand;
use dialoguer::{Confirm, MultiSelect};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::catalog::view::{Filter, SortKey};
use crate::catalog::{CatalogItem, ItemKind};
use crate::config::Settings;
use crate::downloads;
use crate::error::{LibraryError, Result};
use crate::library::{Library, LibraryCommand, format_bytes};
use crate::services::{DepotInfo, Services};
use crate::storage::ShelfStorage;
use crate::workflow::{InstallOutcome, InstallPrompts, InstallState, Installer};

/// Library subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List lua files, GreenLuma games and installed Steam games
    List {
        /// Which items to show (all, lua, greenluma, steam)
        #[arg(short, long, value_name = "FILTER", default_value = "all")]
        filter: Filter,

        /// Match against name, App ID and description
        #[arg(short, long, value_name = "QUERY")]
        search: Option<String>,

        /// Sort order (name, size, installed, updated)
        #[arg(long, value_name = "KEY", default_value = "name")]
        sort: SortKey,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install a downloaded archive named <APPID>.zip
    Install {
        /// Path to the archive
        archive: PathBuf,

        /// Skip confirmation prompts and take every depot that fits
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Uninstall one or more items
    Uninstall {
        /// App IDs to uninstall
        #[arg(required = true)]
        app_ids: Vec<String>,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Comment out setManifestid lines in every lua file
    PatchAll,

    /// Enable a disabled lua file
    Enable {
        app_id: String,
    },

    /// Disable a lua file without deleting it
    Disable {
        app_id: String,
    },

    /// Permanently delete a lua file
    Delete {
        app_id: String,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Copy .lua files, or the lua files inside .zip archives, into Steam
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List archives in the downloads folder
    Downloads {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the GreenLuma AppList slots
    Applist {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute a command with freshly loaded settings.
pub async fn execute(command: Command, settings: Settings, storage: ShelfStorage) -> Result<()> {
    if let Command::Downloads { json } = command {
        return handle_downloads(&settings, json);
    }

    let services = Services::from_settings(&settings, &storage)?;
    match command {
        Command::List {
            filter,
            search,
            sort,
            json,
        } => {
            let mut library = Library::new(services, storage, settings);
            handle_list(&mut library, filter, search, sort, json).await?;
        }
        Command::Install { archive, yes } => {
            handle_install(&services, &storage, &settings, &archive, yes).await?;
        }
        Command::Uninstall { app_ids, yes } => {
            let mut library = Library::new(services, storage, settings);
            handle_uninstall(&mut library, app_ids, yes).await?;
        }
        Command::PatchAll => {
            let mut library = Library::new(services, storage, settings);
            run(&mut library, LibraryCommand::PatchAll).await?;
        }
        Command::Enable { app_id } => {
            let mut library = Library::new(services, storage, settings);
            run(&mut library, LibraryCommand::Enable { app_id }).await?;
        }
        Command::Disable { app_id } => {
            let mut library = Library::new(services, storage, settings);
            run(&mut library, LibraryCommand::Disable { app_id }).await?;
        }
        Command::Delete { app_id, yes } => {
            if !yes && is_tty() {
                let prompt = format!(
                    "Permanently delete the .lua file for App ID {app_id}? This cannot be undone!"
                );
                if !confirm(&prompt)? {
                    eprintln!("Delete cancelled");
                    return Ok(());
                }
            }
            let mut library = Library::new(services, storage, settings);
            run(&mut library, LibraryCommand::DeleteLua { app_id }).await?;
        }
        Command::Import { paths } => {
            let mut library = Library::new(services, storage, settings);
            run(&mut library, LibraryCommand::Import { paths }).await?;
        }
        Command::Applist { json } => {
            handle_applist(&services, &storage, json).await?;
        }
        Command::Downloads { .. } => {}
    }

    Ok(())
}

async fn run(library: &mut Library, command: LibraryCommand) -> Result<()> {
    let outcome = library.dispatch(command).await?;
    eprintln!("{}", outcome.message);
    Ok(())
}

async fn handle_list(
    library: &mut Library,
    filter: Filter,
    search: Option<String>,
    sort: SortKey,
    json: bool,
) -> Result<()> {
    library.refresh().await?;
    library.set_filter(filter);
    library.set_search(search.unwrap_or_default());
    library.set_sort(sort);

    let items = library.visible_items();
    if json {
        let json_str = format_json(&items)?;
        println!("{json_str}");
        return Ok(());
    }

    let headers = &["APPID", "NAME", "TYPE", "SIZE", "STATUS", "UPDATED"];
    let rows: Vec<Vec<String>> = items.iter().map(|item| list_row(item)).collect();
    format_table(headers, rows);
    eprintln!();
    eprintln!("{}", library.statistics_summary());
    eprintln!("{}", library.status());
    Ok(())
}

fn list_row(item: &CatalogItem) -> Vec<String> {
    let status = match (item.kind, item.enabled) {
        (ItemKind::Lua, false) => "disabled",
        (ItemKind::Lua, true) => "enabled",
        _ => "installed",
    };
    vec![
        item.app_id.clone(),
        item.name.clone(),
        item.kind.label().to_string(),
        if item.size_bytes > 0 {
            format_bytes(item.size_bytes)
        } else {
            "-".to_string()
        },
        status.to_string(),
        item.last_updated
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]
}

async fn handle_install(
    services: &Services,
    storage: &ShelfStorage,
    settings: &Settings,
    archive: &Path,
    yes: bool,
) -> Result<()> {
    if !archive.is_file() {
        return Err(LibraryError::io(
            archive,
            std::io::Error::new(std::io::ErrorKind::NotFound, "archive not found"),
        ));
    }
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !yes && is_tty() {
        let prompt = format!("Install {file_name} ({} mode)?", settings.mode);
        if !confirm(&prompt)? {
            eprintln!("Installation cancelled");
            return Ok(());
        }
    }

    let installer = Installer::new();
    let spinner = state_spinner();
    let mut states = installer.subscribe();
    let watcher_spinner = spinner.clone();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            watcher_spinner.set_message(state.message());
            if !state.is_active() && state != InstallState::Idle {
                break;
            }
        }
    });

    let prompts = TerminalPrompts {
        assume_yes: yes,
        interactive: is_tty(),
        spinner: spinner.clone(),
    };
    let result = installer
        .install(services, storage, settings, archive, &prompts)
        .await;
    watcher.abort();
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(note) = install_failure_note(&e) {
                eprintln!("{note}");
            }
            return Err(e);
        }
    };
    match outcome {
        InstallOutcome::Installed(summary) => {
            eprintln!("{file_name} has been installed successfully!");
            eprintln!("  App: {} ({})", summary.name, summary.app_id);
            if !summary.depots.is_empty() {
                eprintln!("  Depots: {}", summary.depots.join(", "));
            }
            eprintln!(
                "  Extracted: {} lua file(s), {} manifest(s)",
                summary.extracted.lua_files.len(),
                summary.extracted.manifests.len()
            );
            if summary.keys_merged > 0 {
                eprintln!("  Depot keys updated: {}", summary.keys_merged);
            }
            if summary.archive_deleted {
                eprintln!("  Deleted {}", archive.display());
            }
            eprintln!();
            eprintln!("Restart Steam for changes to take effect.");
        }
        InstallOutcome::Cancelled { reason } => {
            eprintln!("Installation cancelled: {reason}");
        }
    }
    Ok(())
}

async fn handle_uninstall(library: &mut Library, app_ids: Vec<String>, yes: bool) -> Result<()> {
    library.refresh().await?;
    let mut failed = 0;
    for app_id in app_ids {
        let Some(item) = library.catalog().find(&app_id).cloned() else {
            eprintln!("Nothing installed for App ID {app_id}");
            failed += 1;
            continue;
        };
        if !yes && is_tty() && !confirm(&uninstall_prompt(&item))? {
            eprintln!("Skipped {}", item.name);
            continue;
        }
        match library.dispatch(LibraryCommand::Uninstall { app_id }).await {
            Ok(outcome) => eprintln!("{}", outcome.message),
            Err(e) => {
                eprintln!("Failed to uninstall {}: {e}", item.name);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        warn!("{} uninstall(s) failed", failed);
    }
    Ok(())
}

/// Reassurance printed when an install was refused before touching the disk.
fn install_failure_note(error: &LibraryError) -> Option<&'static str> {
    error
        .is_validation()
        .then_some("Nothing was written; the AppList and Steam folders are unchanged.")
}

fn uninstall_prompt(item: &CatalogItem) -> String {
    let detail = match item.kind {
        ItemKind::Lua => "This will remove the lua file from your system.",
        ItemKind::GreenLuma => {
            "This will remove the AppList entries of the app and its depots, \
its app manifest, its depot keys and its .lua file."
        }
        ItemKind::SteamGame => "This will delete the game files and remove it from Steam.",
    };
    format!("Uninstall {}? {detail}", item.name)
}

fn handle_downloads(settings: &Settings, json: bool) -> Result<()> {
    let listing = downloads::list_archives(settings.downloads_path.as_deref())?;
    if json {
        println!("{}", format_json(&listing)?);
        return Ok(());
    }
    let headers = &["FILE", "SIZE", "CREATED"];
    let rows: Vec<Vec<String>> = listing
        .archives
        .iter()
        .map(|a| {
            vec![
                a.file_name.clone(),
                format_bytes(a.size_bytes),
                a.created
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    format_table(headers, rows);
    eprintln!("{}", listing.status);
    Ok(())
}

async fn handle_applist(services: &Services, storage: &ShelfStorage, json: bool) -> Result<()> {
    let entries = services.applist.entries()?;
    if json {
        println!("{}", format_json(&entries)?);
        return Ok(());
    }

    let ledger = storage.load_ledger().unwrap_or_default();
    let names = services.names.app_names().await.ok();
    let headers = &["SLOT", "APPID", "NAME"];
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            let name = match ledger.owner_of_depot(&entry.app_id) {
                Some(owner) if owner.app_id != entry.app_id => {
                    format!("depot of {}", owner.name)
                }
                _ => names
                    .as_ref()
                    .and_then(|n| n.lookup(&entry.app_id))
                    .unwrap_or("-")
                    .to_string(),
            };
            vec![
                entry
                    .index
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                entry.app_id.clone(),
                name,
            ]
        })
        .collect();
    format_table(headers, rows);
    eprintln!(
        "{}/{} slots used ({})",
        services.applist.current_count(),
        services.applist.capacity(),
        services.applist.dir().display()
    );
    Ok(())
}

/// Terminal answers for the install workflow.
///
/// Non-interactive runs take every depot that fits and keep the archive.
struct TerminalPrompts {
    assume_yes: bool,
    interactive: bool,
    spinner: ProgressBar,
}

impl TerminalPrompts {
    fn asks(&self) -> bool {
        self.interactive && !self.assume_yes
    }
}

impl InstallPrompts for TerminalPrompts {
    fn capacity_warning(&self, max: usize, current: usize, capacity: usize) {
        self.spinner.suspend(|| {
            eprintln!(
                "AppList has limited space. You can only select up to {max} depots (currently {current}/{capacity} files)."
            );
        });
    }

    fn select_depots(&self, depots: &[DepotInfo], max: usize) -> Vec<String> {
        if !self.asks() {
            return depots.iter().take(max).map(|d| d.depot_id.clone()).collect();
        }

        let labels: Vec<String> = depots
            .iter()
            .map(|d| {
                if d.size_bytes > 0 {
                    format!("{} - {} ({})", d.depot_id, d.name, format_bytes(d.size_bytes))
                } else {
                    format!("{} - {}", d.depot_id, d.name)
                }
            })
            .collect();
        let defaults: Vec<bool> = (0..depots.len()).map(|i| i < max).collect();
        let picked = self.spinner.suspend(|| {
            MultiSelect::new()
                .with_prompt(format!("Select depots to install (up to {max})"))
                .items(&labels)
                .defaults(&defaults)
                .interact()
        });
        match picked {
            Ok(indices) => {
                if indices.len() > max {
                    warn!("{} depot(s) selected, keeping the first {}", indices.len(), max);
                }
                indices
                    .into_iter()
                    .take(max)
                    .filter_map(|i| depots.get(i).map(|d| d.depot_id.clone()))
                    .collect()
            }
            Err(e) => {
                warn!("Depot selection failed: {}", e);
                Vec::new()
            }
        }
    }

    fn confirm_delete_archive(&self, archive: &Path) -> bool {
        if !self.asks() {
            return false;
        }
        let prompt = format!("Delete the downloaded archive {}?", archive.display());
        self.spinner
            .suspend(|| confirm(&prompt))
            .unwrap_or_else(|e| {
                warn!("Prompt failed, keeping archive: {}", e);
                false
            })
    }
}

fn state_spinner() -> ProgressBar {
    if !is_tty() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(InstallState::Validating.message());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Check if stdout is a TTY.
fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Prompt user for confirmation.
fn confirm(prompt: &str) -> Result<bool> {
    let result = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    Ok(result)
}

/// Format and print a table to stdout.
fn format_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        eprintln!("No items found");
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_line.join("  ").trim_end());

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", separator.join("  "));

    for row in rows {
        let formatted_row: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect();
        println!("{}", formatted_row.join("  ").trim_end());
    }
}

/// Format data as JSON.
fn format_json<T: serde::Serialize>(data: &T) -> Result<String> {
    let json = serde_json::to_string_pretty(data)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn depots() -> Vec<DepotInfo> {
        ["571", "572", "573"]
            .iter()
            .map(|id| DepotInfo {
                depot_id: id.to_string(),
                name: format!("Depot {id}"),
                size_bytes: 0,
            })
            .collect()
    }

    #[test]
    fn test_parse_list_arguments() {
        let Ok(cli) = TestCli::try_parse_from([
            "appshelf", "list", "--filter", "steam", "--sort", "size", "--json",
        ]) else {
            panic!("list arguments should parse");
        };
        let Command::List {
            filter, sort, json, ..
        } = cli.command
        else {
            panic!("expected list");
        };
        assert_eq!(filter, Filter::SteamGames);
        assert_eq!(sort, SortKey::Size);
        assert!(json);

        assert!(TestCli::try_parse_from(["appshelf", "list", "--sort", "newest"]).is_err());
        assert!(TestCli::try_parse_from(["appshelf", "uninstall"]).is_err());
    }

    #[test]
    fn test_non_interactive_prompts_take_what_fits() {
        let prompts = TerminalPrompts {
            assume_yes: true,
            interactive: true,
            spinner: ProgressBar::hidden(),
        };
        assert_eq!(prompts.select_depots(&depots(), 2), vec!["571", "572"]);
        assert!(!prompts.confirm_delete_archive(Path::new("570.zip")));
    }

    #[test]
    fn test_install_failure_note_only_for_refusals() {
        assert!(install_failure_note(&LibraryError::Busy).is_some());
        assert!(
            install_failure_note(&LibraryError::DuplicateIdentifier {
                app_id: "570".to_string()
            })
            .is_some()
        );
        assert!(install_failure_note(&LibraryError::SteamPathMissing).is_none());
    }

    #[test]
    fn test_uninstall_prompt_by_kind() {
        let mut item = CatalogItem::new("570", ItemKind::GreenLuma);
        item.name = "Dota 2".to_string();
        assert!(uninstall_prompt(&item).contains("AppList entries"));
        item.kind = ItemKind::SteamGame;
        assert!(uninstall_prompt(&item).contains("game files"));
    }

    #[test]
    fn test_list_row() {
        let mut item = CatalogItem::new("570", ItemKind::Lua);
        item.name = "Dota 2".to_string();
        item.enabled = false;
        item.size_bytes = 2048;
        assert_eq!(
            list_row(&item),
            vec!["570", "Dota 2", "Lua", "2 KB", "disabled", "-"]
        );
    }

    #[test]
    fn test_format_json() {
        #[derive(serde::Serialize)]
        struct TestData {
            name: String,
            value: i32,
        }

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        if let Ok(json) = format_json(&data) {
            assert!(json.contains("\"name\""));
            assert!(json.contains("42"));
        } else {
            panic!("Should serialize to JSON");
        }
    }

    #[test]
    fn test_format_table() {
        let headers = &["APPID", "NAME"];
        let rows = vec![
            vec!["570".to_string(), "Dota 2".to_string()],
            vec!["730".to_string(), "Counter-Strike 2".to_string()],
        ];
        format_table(headers, rows);
        format_table(headers, Vec::new());
    }
}
