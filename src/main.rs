// SPDX-FileCopyrightText: 2026 Dotweave Contributors
// SPDX-License-Identifier: MIT

use dotweave::{
    external,
    link::{link_one, BatchError, TransactionError},
    manifest::TrackedFile,
    path::{default_config_dir, expand_target},
    store::Store,
};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{fs, path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  dotweave [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Init => run_init(),
            Command::Add(opts) => run_add(opts),
            Command::Remove(opts) => run_remove(opts),
            Command::Link(opts) => run_link(opts),
            Command::Status => run_status(),
            Command::Backup => run_backup(),
            Command::Edit(opts) => run_edit(opts),
            Command::Category(opts) => run_category(opts),
            Command::Var(opts) => run_var(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create the dotweave layout and starter templates.
    #[command(override_usage = "dotweave init")]
    Init,

    /// Start tracking a file or directory.
    #[command(override_usage = "dotweave add [options] <path>")]
    Add(AddOptions),

    /// Stop tracking a file.
    #[command(override_usage = "dotweave remove [options] <name>")]
    Remove(RemoveOptions),

    /// Link tracked files into place.
    #[command(override_usage = "dotweave link [<name>...]\n  dotweave link --all")]
    Link(LinkOptions),

    /// Show tracked files and whether they are linked.
    #[command(override_usage = "dotweave status")]
    Status,

    /// Snapshot every tracked target into the backups directory.
    #[command(override_usage = "dotweave backup")]
    Backup,

    /// Open a tracked file's source in the configured editor.
    #[command(override_usage = "dotweave edit <name>")]
    Edit(EditOptions),

    /// Manage categories.
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage global template variables.
    #[command(subcommand)]
    Var(VarCommand),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Path of the file or directory to track.
    #[arg(required = true, value_name = "path")]
    pub path: String,

    /// Tracked name, defaults to the file name.
    #[arg(short, long, value_name = "name")]
    pub name: Option<String>,

    /// Category, defaults to a guess from the file name.
    #[arg(short, long, value_name = "category")]
    pub category: Option<String>,

    /// Mark as a template regardless of content sniffing.
    #[arg(short, long)]
    pub template: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// Name of the tracked file to drop.
    #[arg(required = true, value_name = "name")]
    pub name: String,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LinkOptions {
    /// Names of tracked files to link.
    #[arg(group = "selection", value_name = "name")]
    pub names: Vec<String>,

    /// Link every tracked file.
    #[arg(short, long, group = "selection")]
    pub all: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct EditOptions {
    /// Name of the tracked file whose source to open.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Debug, Clone, Subcommand)]
enum CategoryCommand {
    /// Declare a new category.
    #[command(override_usage = "dotweave category add <name>")]
    Add {
        #[arg(required = true, value_name = "name")]
        name: String,
    },

    /// Drop a category no tracked file uses.
    #[command(override_usage = "dotweave category remove <name>")]
    Remove {
        #[arg(required = true, value_name = "name")]
        name: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum VarCommand {
    /// Set a global template variable.
    #[command(override_usage = "dotweave var set <key> <value>")]
    Set {
        #[arg(required = true, value_name = "key")]
        key: String,

        #[arg(required = true, value_name = "value")]
        value: String,
    },

    /// Unset a global template variable.
    #[command(override_usage = "dotweave var unset <key>")]
    Unset {
        #[arg(required = true, value_name = "key")]
        key: String,
    },
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn open_store() -> Result<Store> {
    Ok(Store::open(default_config_dir()?))
}

fn run_init() -> Result<()> {
    let store = open_store()?;
    store.init()?;

    let manifest = store.load()?;
    store.save(&manifest)?;

    println!("initialized dotweave at {}", store.manifest_path().display());
    Ok(())
}

fn run_add(opts: AddOptions) -> Result<()> {
    let store = open_store()?;
    let mut manifest = store.load()?;

    let target = expand_target(&opts.path)?;
    if !dotweave::fsutil::entry_exists(&target) {
        bail!("nothing exists at {}", target.display());
    }

    let name = match opts.name {
        Some(name) => name,
        None => target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("cannot derive a name from {}", target.display()))?,
    };
    let category = opts
        .category
        .unwrap_or_else(|| guess_category(&name).to_string());
    let template = opts.template || (target.is_file() && sniff_template(&target));

    let source = if target.is_dir() {
        PathBuf::from(&category).join(&name)
    } else {
        PathBuf::from(&category).join(name.trim_start_matches('.'))
    };

    manifest.add_file(TrackedFile {
        name: name.clone(),
        source,
        target,
        category,
        template,
        ..Default::default()
    })?;
    store.save(&manifest)?;

    println!("now tracking {name}, run `dotweave link {name}` to place it");
    Ok(())
}

/// Filename rules for picking a category automatically.
fn guess_category(name: &str) -> &'static str {
    if name.contains("zsh") || name.contains("bash") || name.contains("fish") || name == ".profile"
    {
        "shell"
    } else if name.contains("git") {
        "git"
    } else if name.contains("vim") || name.contains("nvim") || name.contains("emacs") {
        "editor"
    } else if name.contains("tmux") || name.contains("screen") {
        "terminal"
    } else {
        "misc"
    }
}

/// Heuristic check whether a file already contains template markup.
fn sniff_template(path: &std::path::Path) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return false;
    };
    let content = content.to_lowercase();
    ["{{", "$user", "$email", "$editor"]
        .iter()
        .any(|marker| content.contains(marker))
}

fn run_remove(opts: RemoveOptions) -> Result<()> {
    let store = open_store()?;
    let mut manifest = store.load()?;

    if manifest.file(&opts.name).is_none() {
        bail!("no tracked file named {}", opts.name);
    }

    if !opts.yes {
        let question = format!("stop tracking {}?", opts.name);
        match external::confirm(&question, false)? {
            Some(true) => {}
            _ => {
                println!("kept {}", opts.name);
                return Ok(());
            }
        }
    }

    let dropped = manifest.remove_file(&opts.name)?;
    store.save(&manifest)?;

    println!(
        "stopped tracking {}, its source stays at {}",
        dropped.name,
        manifest.resolve_source(&dropped).display()
    );
    Ok(())
}

fn run_link(opts: LinkOptions) -> Result<()> {
    let store = open_store()?;
    let manifest = store.load()?;
    let template_dirs = store.template_dirs(&manifest);

    let selected: Vec<&TrackedFile> = if opts.all || opts.names.is_empty() {
        manifest.files().iter().collect()
    } else {
        opts.names
            .iter()
            .map(|name| {
                manifest
                    .file(name)
                    .ok_or_else(|| anyhow!("no tracked file named {name}"))
            })
            .collect::<Result<_>>()?
    };
    if selected.is_empty() {
        println!("nothing tracked yet, use `dotweave add` first");
        return Ok(());
    }

    let style = ProgressStyle::with_template("{msg:<30} [{wide_bar:.yellow/blue}] {pos}/{len}")?
        .progress_chars("-Cco.");
    let bar = ProgressBar::new(selected.len() as u64).with_style(style);

    let mut completed = Vec::new();
    let mut failures: Vec<(String, TransactionError)> = Vec::new();
    for file in selected {
        bar.set_message(file.name.clone());
        match link_one(&manifest, file, &template_dirs) {
            Ok(summary) => completed.push(summary),
            Err(err) => failures.push((file.name.clone(), err)),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    for summary in &completed {
        println!("{}", summary.message);
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BatchError {
            completed,
            failures,
        }
        .into())
    }
}

fn run_status() -> Result<()> {
    let store = open_store()?;
    let manifest = store.load()?;

    if manifest.files().is_empty() {
        println!("nothing tracked yet");
        return Ok(());
    }

    println!("dotfiles root: {}", manifest.dotfiles_dir.display());
    for file in manifest.files() {
        let state = if file.is_linked {
            "linked"
        } else if file.has_conflict {
            "conflict"
        } else {
            "unlinked"
        };
        let kind = if file.template { " (template)" } else { "" };
        println!(
            "  {state:<8} {:<20} -> {}{kind}",
            file.name,
            file.target.display()
        );
    }
    Ok(())
}

fn run_backup() -> Result<()> {
    let store = open_store()?;
    let manifest = store.load()?;

    let (snapshot, copied) = store.backup_all(&manifest)?;
    println!("snapshot of {copied} target(s) at {}", snapshot.display());
    Ok(())
}

fn run_edit(opts: EditOptions) -> Result<()> {
    let store = open_store()?;
    let manifest = store.load()?;

    let file = manifest
        .file(&opts.name)
        .ok_or_else(|| anyhow!("no tracked file named {}", opts.name))?;
    let source = manifest.resolve_source(file);
    if !dotweave::fsutil::entry_exists(&source) {
        bail!(
            "{} has no source yet, run `dotweave link {}` first",
            opts.name,
            opts.name
        );
    }

    let path = if source.is_dir() {
        let mut entries: Vec<String> = fs::read_dir(&source)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        if entries.is_empty() {
            bail!("{} is an empty directory", source.display());
        }
        match external::select("which file?", entries)? {
            Some(choice) => source.join(choice),
            None => return Ok(()),
        }
    } else {
        source
    };

    external::edit_file(&manifest.editor, path)?;
    Ok(())
}

fn run_category(opts: CategoryCommand) -> Result<()> {
    let store = open_store()?;
    let mut manifest = store.load()?;

    match opts {
        CategoryCommand::Add { name } => {
            manifest.add_category(&name)?;
            println!("added category {name}");
        }
        CategoryCommand::Remove { name } => {
            manifest.remove_category(&name)?;
            println!("removed category {name}");
        }
    }

    store.save(&manifest)?;
    Ok(())
}

fn run_var(opts: VarCommand) -> Result<()> {
    let store = open_store()?;
    let mut manifest = store.load()?;

    match opts {
        VarCommand::Set { key, value } => {
            manifest.set_variable(&key, value)?;
            println!("set {key}");
        }
        VarCommand::Unset { key } => {
            manifest.remove_variable(&key)?;
            println!("unset {key}");
        }
    }

    store.save(&manifest)?;
    Ok(())
}
