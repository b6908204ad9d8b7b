use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use xpo_patcher::config::{load_or_default, Config};
use xpo_patcher::index::JsonIndex;
use xpo_patcher::patch::{write_back_file, WriteBackOutcome, WriteStatus};
use xpo_patcher::tree::WorkingTree;
use xpo_patcher::{Diagnostic, DiagnosticKind, ElementKind, Extractor, Session};

#[derive(Parser)]
#[command(name = "xpo-patcher")]
#[command(about = "Round-trip method editing for Dynamics AX XPO exports", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./xpo-patcher.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract elements and methods into the working tree
    Extract {
        /// Export file to read
        input: PathBuf,

        /// Working tree directory (overrides config)
        #[arg(short, long)]
        tree: Option<PathBuf>,

        /// Re-extract elements that already have method files, overwriting them
        #[arg(short, long)]
        force: bool,

        /// Do not update the element index
        #[arg(long)]
        no_index: bool,
    },

    /// Write edited methods back into a copy of the export
    WriteBack {
        /// Export file the working tree was extracted from
        input: PathBuf,

        /// Working tree directory (overrides config)
        #[arg(short, long)]
        tree: Option<PathBuf>,

        /// Output file (defaults to <input stem>_WR.xpo)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dry run - show what would be written without writing it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// List method files edited since extraction
    Status {
        /// Export file the working tree was extracted from
        input: PathBuf,

        /// Working tree directory (overrides config)
        #[arg(short, long)]
        tree: Option<PathBuf>,
    },

    /// Show an indexed element or one of its methods
    Show {
        /// Export file the index was built from
        input: PathBuf,

        /// Element name
        name: String,

        /// Method to print instead of the element outline
        #[arg(short, long)]
        method: Option<String>,

        /// Element kind tag (CLS, TAB, FRM, JOB, ...)
        #[arg(short, long)]
        kind: Option<ElementKind>,

        /// Also write the element into the working tree, replacing its files
        #[arg(long)]
        checkout: bool,
    },

    /// Search indexed element names, kinds and method names
    Search {
        query: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete the whole working tree
    Reset {
        /// Working tree directory (overrides config)
        #[arg(short, long)]
        tree: Option<PathBuf>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let config = load_or_default(cli.config.as_deref(), &env::current_dir()?)?;

    match cli.command {
        Commands::Extract {
            input,
            tree,
            force,
            no_index,
        } => cmd_extract(config, &input, tree, force, no_index),

        Commands::WriteBack {
            input,
            tree,
            output,
            dry_run,
            diff,
        } => cmd_write_back(config, &input, tree, output, dry_run, diff),

        Commands::Status { input, tree } => cmd_status(config, &input, tree),

        Commands::Show {
            input,
            name,
            method,
            kind,
            checkout,
        } => cmd_show(config, input, &name, method.as_deref(), kind, checkout),

        Commands::Search { query, limit } => cmd_search(config, &query, limit),

        Commands::Reset { tree, yes } => cmd_reset(config, tree, yes),
    }
}

fn with_tree(mut config: Config, tree: Option<PathBuf>) -> Config {
    if let Some(dir) = tree {
        config.tree.dir = dir;
    }
    config
}

fn require_input(input: &Path) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Source export not found: {}", input.display());
    }
    Ok(())
}

fn open_tree(config: &Config) -> Result<WorkingTree> {
    Ok(WorkingTree::open(
        &config.tree.dir,
        config.tree_layout(),
        config.fallback_encoding(),
    )?)
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    let marker = match diagnostic.kind {
        DiagnosticKind::MultiMethodJob
        | DiagnosticKind::StructuralWarning
        | DiagnosticKind::LossyEncoding => "⊙".yellow(),
        _ => "✗".red(),
    };
    eprintln!("{} {}", marker, diagnostic);
}

/// Helper: Show unified diff between original and written content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (written)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", sign);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn cmd_extract(
    config: Config,
    input: &Path,
    tree: Option<PathBuf>,
    force: bool,
    no_index: bool,
) -> Result<()> {
    require_input(input)?;
    let config = with_tree(config, tree);
    let tree = WorkingTree::create(
        &config.tree.dir,
        config.tree_layout(),
        config.fallback_encoding(),
    )?;

    println!("Source: {}", input.display());
    println!("Working tree: {}", config.tree.dir.display());
    println!();

    let mut index = if no_index {
        None
    } else {
        Some(JsonIndex::open_or_create(&config.index.path)?)
    };

    let mut extractor = Extractor::new(&tree).skip_existing(!force);
    if let Some(index) = index.as_mut() {
        extractor = extractor.with_index(index);
    }
    let report = extractor.run_file(input, config.fallback_encoding())?;

    if let Some(encoding) = report.encoding {
        println!("Encoding: {}", encoding);
    }
    for element in &report.extracted {
        println!(
            "{} {} {}: {} methods",
            "✓".green(),
            element.kind,
            element.name,
            element.methods.len()
        );
    }
    for name in &report.skipped {
        println!("{} {}: Already extracted", "⊙".yellow(), name);
    }
    for diagnostic in &report.diagnostics {
        print_diagnostic(diagnostic);
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} parsed", format!("{}", report.parsed()).green());
    println!(
        "  {} methods written",
        format!("{}", report.methods_written).green()
    );
    println!("  {} skipped", format!("{}", report.skipped.len()).yellow());
    println!("  {} unparseable", format!("{}", report.unparseable()).red());

    if report.unparseable() > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_write_back(
    config: Config,
    input: &Path,
    tree: Option<PathBuf>,
    output: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    require_input(input)?;
    let config = with_tree(config, tree);
    let tree = open_tree(&config)?;

    let mut options = config.write_options();
    options.output = output;
    options.dry_run = dry_run;

    println!("Source: {}", input.display());
    println!("Working tree: {}", config.tree.dir.display());
    if dry_run {
        println!("{}", "  [DRY RUN - nothing will be written]".cyan());
    }
    println!();

    let report = write_back_file(input, &tree, &options)?;

    let written = match &report.outcome {
        WriteBackOutcome::NoChanges { diagnostics } => {
            for diagnostic in diagnostics {
                print_diagnostic(diagnostic);
            }
            if diagnostics.is_empty() {
                println!(
                    "{} No method files changed since {} was extracted",
                    "⊘".cyan(),
                    input.display()
                );
                return Ok(());
            }
            println!(
                "{} No edited method could be written back; {} not written",
                "✗".red(),
                report.output.display()
            );
            std::process::exit(1);
        }
        WriteBackOutcome::Written(written) => written,
    };

    for updated in &written.updated {
        println!(
            "{} {}.{}: Updated ({:+} bytes)",
            "✓".green(),
            updated.element,
            updated.method,
            updated.delta
        );
    }
    for (element, method) in &written.unchanged {
        println!("{} {}.{}: Already up to date", "⊙".yellow(), element, method);
    }
    for diagnostic in &written.diagnostics {
        print_diagnostic(diagnostic);
    }

    if show_diff && written.buffer != report.original {
        display_diff(&report.output, &report.original, &written.buffer);
    }

    let failed = written
        .diagnostics
        .iter()
        .filter(|d| {
            !matches!(
                d.kind,
                DiagnosticKind::StructuralWarning | DiagnosticKind::LossyEncoding
            )
        })
        .count();

    println!();
    if report.written {
        println!("Output: {} ({})", report.output.display(), report.encoding);
    } else {
        println!("Output: {} (not written)", report.output.display());
    }
    match written.status {
        WriteStatus::Clean => println!("Structure: {}", "ok".green()),
        WriteStatus::WithWarnings => println!("Structure: {}", "written with warnings".yellow()),
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} updated", format!("{}", written.updated.len()).green());
    println!(
        "  {} already up to date",
        format!("{}", written.unchanged.len()).yellow()
    );
    println!("  {} failed", format!("{}", failed).red());

    if report.has_problems() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(config: Config, input: &Path, tree: Option<PathBuf>) -> Result<()> {
    require_input(input)?;
    let config = with_tree(config, tree);
    let tree = open_tree(&config)?;

    let meta = std::fs::metadata(input)
        .with_context(|| format!("cannot read source export {}", input.display()))?;
    let reference = filetime::FileTime::from_last_modification_time(&meta);

    println!("{}", "Working Tree Status".bold());
    println!("Source: {}", input.display());
    println!("Working tree: {}", config.tree.dir.display());
    println!();

    let mut edited = Vec::new();
    let mut invalid = Vec::new();
    let mut clean = 0;

    for record in tree.records()? {
        if let Err(err) = tree.read_metadata(&record) {
            invalid.push((record.name.clone(), err.to_string()));
            continue;
        }
        let files = tree.edited_methods(&record, reference)?;
        if files.is_empty() {
            clean += 1;
            continue;
        }
        for file in files {
            edited.push(format!("{}.{}", record.name, file.method));
        }
    }

    if !edited.is_empty() {
        println!(
            "{} {} ({} methods)",
            "⊙".yellow(),
            "EDITED".yellow().bold(),
            edited.len()
        );
        for name in &edited {
            println!("  - {}", name);
        }
        println!();
    }

    if !invalid.is_empty() {
        println!(
            "{} {} ({} elements)",
            "✗".red(),
            "INVALID".red().bold(),
            invalid.len()
        );
        for (name, reason) in &invalid {
            println!("  - {} ({})", name, reason.dimmed());
        }
        println!();
    }

    println!(
        "{} {} ({} elements)",
        "✓".green(),
        "UNCHANGED".green().bold(),
        clean
    );

    Ok(())
}

fn cmd_show(
    config: Config,
    input: PathBuf,
    name: &str,
    method: Option<&str>,
    kind: Option<ElementKind>,
    checkout: bool,
) -> Result<()> {
    let session = Session::new(config).with_source(input);

    if let Some(method) = method {
        let body = session.get_method(name, method, kind)?;
        println!("{}", body);
        return Ok(());
    }

    let element = if checkout {
        let (element, saved) = session.checkout_element(name, kind)?;
        eprintln!(
            "{} {}: {} method files written to {}",
            "✓".green(),
            element.name,
            saved.written,
            session.config().tree.dir.display()
        );
        element
    } else {
        session.get_element(name, kind)?
    };

    println!("{} {}", element.kind.to_string().bold(), element.name.bold());
    println!(
        "{}",
        format!(
            "bytes {}..{}",
            element.byte_range.start, element.byte_range.end
        )
        .dimmed()
    );
    if let Some(parent) = element.extends() {
        println!("extends {}", parent);
    }
    if let Some(body) = element.declaration_body() {
        let members = body.lines().count().saturating_sub(2);
        println!("declaration: {} lines", members);
    }
    println!();
    for (method, body) in &element.methods {
        println!("  {} ({} lines)", method, body.lines().count());
    }

    Ok(())
}

fn cmd_search(config: Config, query: &str, limit: usize) -> Result<()> {
    let session = Session::new(config);
    let hits = session.search(query, limit)?;

    if hits.is_empty() {
        println!("{} No matches for '{}'", "⊘".cyan(), query);
        return Ok(());
    }

    for hit in hits {
        println!(
            "{:<4} {:<40} {}",
            hit.record.kind.to_string().cyan(),
            hit.record.name,
            format!("{:?}, {} methods", hit.quality, hit.record.methods.len()).dimmed()
        );
    }

    Ok(())
}

fn cmd_reset(config: Config, tree: Option<PathBuf>, yes: bool) -> Result<()> {
    let config = with_tree(config, tree);
    let tree = open_tree(&config)?;

    if !yes {
        print!(
            "Delete everything under {}? [y/N] ",
            config.tree.dir.display()
        );
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    tree.reset()?;
    println!(
        "{} Working tree {} reset",
        "✓".green(),
        config.tree.dir.display()
    );

    Ok(())
}
