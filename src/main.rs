use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

mod cachedir;
mod cancel;
mod delete;
mod engine;
mod filter;
mod grouper;
mod hashing;
mod index;
mod link;
mod logging;
mod matcher;
mod normalize;
mod scan;
mod store;
mod util;

#[derive(Parser, Debug)]
#[command(name = "neardupes")]
#[command(
    version,
    about = "Duplicate file detection by name similarity and size, with optional hash verification and safe removal"
)]
struct Cli {
    /// One or more root directories to scan
    directories: Vec<PathBuf>,

    /// Only index files with these extensions (leading dot optional)
    #[arg(short = 'e', long = "extensions", num_args = 1..)]
    extensions: Vec<String>,

    /// Skip files with these extensions
    #[arg(long = "no-extension", num_args = 1..)]
    no_extension: Vec<String>,

    /// Only index files whose name contains one of these keywords
    #[arg(short = 'k', long = "keywords", num_args = 1..)]
    keywords: Vec<String>,

    /// Skip files whose name contains one of these keywords
    #[arg(long = "no-keyword", num_args = 1..)]
    no_keyword: Vec<String>,

    /// Skip these directories entirely (no descent)
    #[arg(long = "exclude-dir", num_args = 1..)]
    exclude_dirs: Vec<PathBuf>,

    /// Name similarity threshold (0.0-1.0)
    #[arg(short = 't', long, default_value_t = 0.9)]
    threshold: f64,

    /// Size window around each candidate as a fraction of its size.
    ///
    /// 0 means only exactly-equal sizes are duplicate candidates, which
    /// matches byte-identical duplicates.
    #[arg(long, default_value_t = 0.0)]
    size_tolerance: f64,

    /// Require identical content hashes before reporting a group
    #[arg(short = 'c', long)]
    hash_check: bool,

    /// Leave a link to the kept file where a duplicate was removed
    #[arg(short = 'l', long)]
    link: bool,

    /// Delete redundant copies after grouping
    #[arg(short = 'd', long)]
    delete: bool,

    /// Do not ask per group; keep the first member of each group
    #[arg(short = 'y', long)]
    yes: bool,

    /// Also write the duplicate groups to this file as JSON
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Cache name (no slashes) or path to a cache directory.
    ///
    /// If it contains no path separators, it is treated as a name and placed
    /// under the default neardupes data directory (platform-specific).
    #[arg(long, default_value = "default")]
    cache: String,

    /// Increase logging verbosity (use together with RUST_LOG for fine control).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    if cli.directories.is_empty() {
        return Err(anyhow!("at least one directory to scan is required"));
    }
    if !(0.0..=1.0).contains(&cli.threshold) {
        return Err(anyhow!("threshold must be within 0.0-1.0"));
    }

    let cache_dir = cachedir::resolve_cache_dir(&cli.cache)
        .with_context(|| format!("Failed to resolve --cache {}", cli.cache))?;
    let store = store::open(&cache_dir)
        .with_context(|| format!("Failed to open cache in {}", cache_dir.display()))?;

    let token = cancel::StopToken::new();
    cancel::install_ctrlc(&token);

    let opts = grouper::GroupOptions {
        threshold: cli.threshold,
        size_tolerance: cli.size_tolerance,
        hash_check: cli.hash_check,
    };
    let mut dedup = engine::Deduper::open(store, token.clone(), opts);

    let filter = filter::ScanFilter::new(
        &cli.extensions,
        &cli.keywords,
        &cli.no_extension,
        &cli.no_keyword,
        &cli.exclude_dirs,
    )?;

    let roots = cli
        .directories
        .iter()
        .map(|d| normalize::normalize_path(d))
        .collect::<std::io::Result<Vec<_>>>()
        .context("Failed to resolve scan roots")?;

    tracing::info!(
        cache_dir = %cache_dir.display(),
        count = roots.len(),
        threshold = cli.threshold,
        hash_check = cli.hash_check,
        "scan starting"
    );
    dedup.scan(&roots, &filter)?;

    tracing::info!(indexed = dedup.index().len(), "analyzing duplicates");
    dedup.find_duplicates()?;

    if let Some(out) = &cli.output {
        dedup.export(out)?;
        tracing::info!(file = %out.display(), "duplicate groups exported");
    }

    print_groups(dedup.groups(), dedup.index());

    if cli.delete {
        let symlinks = link::SymlinkService;
        let link: Option<&dyn link::LinkService> = if cli.link { Some(&symlinks) } else { None };

        let stdin = std::io::stdin();
        let deleted = dedup.delete_duplicates(!cli.yes, link, &mut stdin.lock())?;
        println!("Deleted {} duplicate files.", deleted.len());
    }

    Ok(())
}

fn print_groups(groups: &[grouper::DuplicateGroup], index: &index::FileIndex) {
    if groups.is_empty() {
        println!("No duplicate groups found.");
        return;
    }
    for g in groups {
        let size = g
            .paths
            .first()
            .and_then(|p| index.get(p))
            .map(|r| r.size)
            .unwrap_or(0);
        println!("{} {}", g.id, util::format_size(size));
        for path in &g.paths {
            println!("  {}", path);
        }
        println!();
    }
}
