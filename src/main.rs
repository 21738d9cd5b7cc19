use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use textgraft::diff::diff_summary;
use textgraft::editor::{Editor, InsertPosition};
use textgraft::index::{FileIndex, Indexer};
use textgraft::patchset::{ApplyOptions, FileOutcome, PatchSet};
use textgraft::resolve::{Resolver, Target};
use textgraft::safety::RootGuard;
use textgraft::vcs::{GitConfig, GitRepo};

#[derive(Parser)]
#[command(name = "textgraft")]
#[command(about = "Structural text patching with atomic multi-file transactions", long_about = None)]
#[command(version)]
struct Cli {
    /// Root directory for indexing and path confinement
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index files and list their nodes
    Index {
        /// Specific files (defaults to every known file type under the root)
        paths: Vec<PathBuf>,

        /// Emit the node records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a selector and show the target
    Resolve {
        /// Selector: <id>, <name>, path:line, path:start-end, or path:kind:name
        selector: String,
    },

    /// Replace a target's extent with new text
    Replace {
        selector: String,

        #[command(flatten)]
        text: TextSource,

        #[command(flatten)]
        write: WriteFlags,
    },

    /// Insert text relative to a target
    Insert {
        selector: String,

        /// Where to insert relative to a node target
        #[arg(long, value_enum, default_value_t = PositionArg::After)]
        position: PositionArg,

        #[command(flatten)]
        text: TextSource,

        #[command(flatten)]
        write: WriteFlags,
    },

    /// Delete a target's extent
    Delete {
        selector: String,

        #[command(flatten)]
        write: WriteFlags,
    },

    /// Apply a multi-file mutation list as one transaction
    Patch {
        /// Mutation list file
        file: PathBuf,

        /// Mutation list format
        #[arg(long, value_enum, default_value_t = PatchFormat::Simple)]
        format: PatchFormat,

        #[command(flatten)]
        write: WriteFlags,

        /// Commit the changed files after a successful apply
        #[arg(long)]
        commit: bool,

        /// Push after committing
        #[arg(long, requires = "commit")]
        push: bool,

        /// Commit message
        #[arg(long, short, default_value = "Apply textgraft patch")]
        message: String,

        /// Allow committing from a dirty working tree
        #[arg(long)]
        allow_dirty: bool,
    },
}

#[derive(clap::Args)]
struct TextSource {
    /// Literal replacement/insertion text
    #[arg(long, conflicts_with = "text_file")]
    text: Option<String>,

    /// Read the text from a file
    #[arg(long)]
    text_file: Option<PathBuf>,
}

#[derive(clap::Args)]
struct WriteFlags {
    /// Write the change (default is a dry-run preview)
    #[arg(long)]
    apply: bool,

    /// Keep a .bak sibling of each written file
    #[arg(long)]
    backup: bool,

    /// Override the drift guard
    #[arg(long)]
    force: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum PositionArg {
    Before,
    After,
    InsideStart,
    InsideEnd,
}

impl From<PositionArg> for InsertPosition {
    fn from(arg: PositionArg) -> Self {
        match arg {
            PositionArg::Before => InsertPosition::Before,
            PositionArg::After => InsertPosition::After,
            PositionArg::InsideStart => InsertPosition::InsideStart,
            PositionArg::InsideEnd => InsertPosition::InsideEnd,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum PatchFormat {
    Simple,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.clone();

    match cli.command {
        Commands::Index { paths, json } => cmd_index(&root, &paths, json),
        Commands::Resolve { selector } => cmd_resolve(&root, &selector),
        Commands::Replace {
            selector,
            text,
            write,
        } => {
            let text = load_text(text)?;
            cmd_mutate(&root, &selector, Mutation::Replace(text), &write)
        }
        Commands::Insert {
            selector,
            position,
            text,
            write,
        } => {
            let text = load_text(text)?;
            cmd_mutate(
                &root,
                &selector,
                Mutation::Insert(position.into(), text),
                &write,
            )
        }
        Commands::Delete { selector, write } => {
            cmd_mutate(&root, &selector, Mutation::Delete, &write)
        }
        Commands::Patch {
            file,
            format,
            write,
            commit,
            push,
            message,
            allow_dirty,
        } => cmd_patch(
            &root,
            &file,
            format,
            &write,
            commit,
            push,
            &message,
            allow_dirty,
        ),
    }
}

fn build_indices(root: &Path) -> Result<HashMap<String, FileIndex>> {
    Indexer::new()
        .index_directory(root)
        .with_context(|| format!("failed to index {}", root.display()))
}

fn load_text(source: TextSource) -> Result<String> {
    match (source.text, source.text_file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, None) => anyhow::bail!("provide the text via --text or --text-file"),
        (Some(_), Some(_)) => unreachable!("clap rejects the combination"),
    }
}

fn cmd_index(root: &Path, paths: &[PathBuf], json: bool) -> Result<()> {
    let indexer = Indexer::new();
    let indices = if paths.is_empty() {
        indexer.index_directory(root)?
    } else {
        indexer.index_files(paths)?
    };

    let mut ordered: Vec<&FileIndex> = indices.values().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    if json {
        println!("{}", serde_json::to_string_pretty(&ordered)?);
        return Ok(());
    }

    for index in ordered {
        println!("{}", index.path.bold());
        if index.is_empty() {
            println!("  {}", "(no nodes)".dimmed());
            continue;
        }
        for node in index.nodes() {
            println!(
                "  {}  {:<12} {:<30} {}-{}",
                node.id.to_string().dimmed(),
                node.kind,
                node.name,
                node.start_line,
                node.end_line
            );
        }
    }
    Ok(())
}

fn cmd_resolve(root: &Path, selector: &str) -> Result<()> {
    let indices = build_indices(root)?;
    let resolver = Resolver::new(&indices);

    match resolver.resolve(selector) {
        Ok(Target::Node(node)) => {
            println!(
                "{} {} {} ({}:{}-{})",
                "✓".green(),
                node.kind,
                node.name.bold(),
                node.path,
                node.start_line,
                node.end_line
            );
            println!("  id: {}", node.id);
        }
        Ok(Target::Lines {
            path,
            start_line,
            end_line,
            enclosing,
        }) => {
            println!("{} lines {}:{}-{}", "✓".green(), path, start_line, end_line);
            for node in &enclosing {
                println!("  within {} {}", node.kind, node.name);
            }
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
    Ok(())
}

enum Mutation {
    Replace(String),
    Insert(InsertPosition, String),
    Delete,
}

fn cmd_mutate(root: &Path, selector: &str, mutation: Mutation, write: &WriteFlags) -> Result<()> {
    let guard = RootGuard::new(root)?;
    let indices = build_indices(root)?;
    let resolver = Resolver::new(&indices);

    let target = match resolver.resolve(selector) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    };
    guard.validate_path(target.path())?;

    let index = indices
        .get(target.path())
        .with_context(|| format!("no index for {}", target.path()))?;
    let mut editor = Editor::open(index)?;

    match &mutation {
        Mutation::Replace(text) => editor.replace(&target, text)?,
        Mutation::Insert(position, text) => match &target {
            Target::Node(node) => editor.insert_relative(node, *position, text)?,
            Target::Lines { start_line, .. } => editor.insert_at_line(*start_line, text)?,
        },
        Mutation::Delete => editor.delete(&target)?,
    }

    if !editor.is_modified() {
        println!("{} {}: no change", "⊙".yellow(), target.path());
        return Ok(());
    }

    let diff = editor.diff();
    display_diff(&diff);
    println!();

    if write.apply {
        editor.write(write.force, write.backup)?;
        println!("{} {}: written ({})", "✓".green(), target.path(), diff_summary(&diff));
    } else {
        println!(
            "{} dry run, nothing written ({}); pass --apply to write",
            "⊙".yellow(),
            diff_summary(&diff)
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_patch(
    root: &Path,
    file: &Path,
    format: PatchFormat,
    write: &WriteFlags,
    commit: bool,
    push: bool,
    message: &str,
    allow_dirty: bool,
) -> Result<()> {
    let input = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let parsed = match format {
        PatchFormat::Simple => PatchSet::from_simple(&input)?,
        PatchFormat::Json => PatchSet::from_json(&input)?,
    };

    // Mutation paths are relative to the root, not the process cwd.
    let guard = RootGuard::new(root)?;
    let mut set = PatchSet::new();
    for mutation in parsed.mutations() {
        let mut mutation = mutation.clone();
        let path = Path::new(&mutation.file_path);
        if !path.is_absolute() {
            mutation.file_path = root.join(path).to_string_lossy().into_owned();
        }
        guard.validate_path(&mutation.file_path)?;
        set.add(mutation);
    }

    let previews = match set.preview() {
        Ok(previews) => previews,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    for preview in &previews {
        display_diff(&preview.diff);
    }
    println!();

    if !write.apply {
        println!(
            "{} dry run, nothing written ({} mutations across {} files); pass --apply to write",
            "⊙".yellow(),
            set.mutations().len(),
            set.files().len()
        );
        return Ok(());
    }

    let git_config = GitConfig {
        auto_commit: commit,
        auto_push: push,
        allow_dirty,
        commit_message: message.to_string(),
        dry_run: false,
    };
    let repo = GitRepo::new(root, git_config);
    if commit {
        repo.prepare_for_patch()?;
    }

    let options = ApplyOptions {
        use_backups: write.backup,
        force: write.force,
    };
    let report = set.apply(&options)?;

    for (path, outcome) in &report.files {
        let mark = match outcome {
            FileOutcome::Written => "✓".green(),
            FileOutcome::RolledBack => "✗".red(),
            FileOutcome::Unchanged => "⊙".yellow(),
        };
        println!("{} {}: {}", mark, path, outcome);
    }

    if let Some(error) = &report.error {
        eprintln!("{} {}", "✗".red(), error);
        std::process::exit(1);
    }

    println!("{} transaction committed", "✓".green());

    // Git failure after a committed apply never rolls the writes back;
    // report it and leave the files in place.
    if commit {
        let written = report.written_files();
        if written.is_empty() {
            println!("{} nothing to commit", "⊙".yellow());
        } else {
            match repo.stage_and_commit(&written, message) {
                Ok(hash) => {
                    println!("{} committed {hash}", "✓".green());
                    if push {
                        match repo.push_to_remote("origin", repo.current_branch().as_deref()) {
                            Ok(()) => println!("{} pushed", "✓".green()),
                            Err(e) => eprintln!(
                                "{} push failed (files remain applied): {e}",
                                "⊙".yellow()
                            ),
                        }
                    }
                }
                Err(e) => eprintln!(
                    "{} commit failed (files remain applied): {e}",
                    "⊙".yellow()
                ),
            }
        }
    }

    Ok(())
}

/// Print a unified diff with +/- lines colored.
fn display_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.dimmed());
        } else if line.starts_with('@') {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}
