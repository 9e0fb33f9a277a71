//! Main entry point for the lpack CLI application.
//!
//! This binary provides a command-line interface for listing, testing and
//! extracting LayerPack archives from both local filesystem and remote HTTP
//! URLs, and for resolving entries across layered packs.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lpack::cli::is_http_url;
use lpack::pack::{CONTENT_TYPE, output_path};
use lpack::{
    ArchiveReader, Cli, HttpRangeReader, OpenOptions, PackExtractor, PackStack, ReadAt,
};

/// Application entry point.
///
/// Parses command-line arguments, sets up logging, opens the pack and
/// dispatches to the handler for the selected mode.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.is_http_url() {
        // Keep a typed handle so transfer statistics can be reported
        let reader = Arc::new(HttpRangeReader::new(cli.file.clone()).await?);
        let transferred_before = reader.transferred_bytes();

        let pack = ArchiveReader::open_with(reader.clone(), cli.open_options())
            .await
            .with_context(|| format!("cannot open pack {}", cli.file))?;
        process_pack(pack.into_dyn(), &cli).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let pack = open_location(&cli.file, cli.open_options()).await?;
        process_pack(pack, &cli).await?;
    }

    Ok(())
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` takes precedence; otherwise warnings are shown, or only errors
/// with `-qq`.
fn init_tracing(cli: &Cli) {
    let default = if cli.is_very_quiet() { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Open a pack from a path or URL, erasing the source type.
async fn open_location(location: &str, options: OpenOptions) -> Result<ArchiveReader<dyn ReadAt>> {
    let pack = if is_http_url(location) {
        ArchiveReader::open_url_with(location, options)
            .await
            .map(ArchiveReader::into_dyn)
    } else {
        ArchiveReader::open_path_with(location, options)
            .await
            .map(ArchiveReader::into_dyn)
    };
    pack.with_context(|| format!("cannot open pack {location}"))
}

/// Process a pack based on CLI options.
///
/// Modes, in order of precedence:
/// - Resolve mode (`--resolve`): look an entry up across layered packs
/// - Test mode (`-t`): verify every entry
/// - List mode (`-l` or `-v`): display pack contents
/// - Extract mode: extract entries matching the specified filters
async fn process_pack(pack: ArchiveReader<dyn ReadAt>, cli: &Cli) -> Result<()> {
    if let Some(ref name) = cli.resolve {
        return resolve_entry(pack, cli, name).await;
    }

    if cli.test {
        return test_pack(&pack, cli).await;
    }

    // List mode: display pack contents and exit
    if cli.list || cli.verbose {
        list_entries(&pack, cli.verbose);
        return Ok(());
    }

    // Apply filters to determine which entries to extract:
    // 1. If specific entries are requested, only include matching ones
    // 2. Exclude entries matching the exclusion patterns
    let to_extract: Vec<&str> = pack
        .list()
        .into_iter()
        .filter(|name| {
            if !cli.files.is_empty() {
                let matches = cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, name)
                    } else {
                        // No wildcards: exact match on full name or base name
                        *name == f.as_str() || base_name(name) == f.as_str()
                    }
                });
                if !matches {
                    return false;
                }
            }

            !cli.exclude
                .iter()
                .any(|x| name.contains(x.as_str()) || glob_match(x, name))
        })
        .collect();

    if to_extract.is_empty() && !cli.files.is_empty() {
        bail!("none of the requested entries were found in {}", cli.file);
    }

    let extractor = PackExtractor::new(&pack);
    let multiple_entries = cli.pipe && to_extract.len() > 1;
    for name in to_extract {
        extract_entry(&extractor, name, cli, multiple_entries).await?;
    }

    Ok(())
}

/// List entries in the pack.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just entry names, one per line
/// - Verbose format (`-v`): Pack metadata followed by a table of sizes,
///   compression ratio, codec and checksum
fn list_entries(pack: &ArchiveReader<dyn ReadAt>, verbose: bool) {
    if !verbose {
        for name in pack.list() {
            println!("{}", name);
        }
        return;
    }

    let meta = pack.metadata();
    println!("Pack:     {} (format v{})", meta.name, meta.version);
    println!("Author:   {}", meta.author.as_deref().unwrap_or("(none)"));
    if let Some(ref release) = meta.pack_version {
        println!("Release:  {}", release);
    }
    println!("Kind:     {}", meta.kind.as_str());
    println!("Priority: {}", meta.priority);
    if let Some(ref lang) = meta.lang {
        println!("Lang:     {}", lang);
    }
    if let Some(ref website) = meta.website {
        println!("Website:  {}", website);
    }
    if let Some(ref r) = meta.custom_ref {
        println!("Ref:      {}", r);
    }
    println!("MIME:     {}", CONTENT_TYPE);
    println!();

    println!(
        "{:>10}  {:>10}  {:>5}  {:<7}  {:<8}  Name",
        "Length", "Size", "Cmpr", "Method", "Check"
    );
    println!("{}", "-".repeat(70));

    let mut total_logical = 0u64;
    let mut total_stored = 0u64;

    for entry in pack.entries() {
        let check = entry
            .checksum
            .as_ref()
            .map(|c| c.algorithm())
            .unwrap_or("-");
        let method = if entry.is_encrypted() {
            format!("{}+enc", entry.codec().as_str())
        } else {
            entry.codec().as_str().to_string()
        };

        println!(
            "{:>10}  {:>10}  {}  {:<7}  {:<8}  {}",
            entry.original_size,
            entry.size,
            ratio(entry.size, entry.original_size),
            method,
            check,
            entry.name
        );

        total_logical += entry.original_size;
        total_stored += entry.size;
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>17}  {} entries",
        total_logical,
        total_stored,
        ratio(total_stored, total_logical),
        "",
        pack.len()
    );
}

/// Compression ratio as percentage saved.
fn ratio(stored: u64, logical: u64) -> String {
    if logical > 0 && stored <= logical {
        format!("{:>4}%", 100 - (stored * 100 / logical))
    } else {
        "  0%".to_string()
    }
}

/// Verify every entry and the archive checksum, unzip `-t` style.
async fn test_pack(pack: &ArchiveReader<dyn ReadAt>, cli: &Cli) -> Result<()> {
    let mut failures = 0usize;

    for name in pack.list() {
        match pack.verify_entry(name).await {
            Ok(()) => {
                if !cli.is_quiet() {
                    println!("    testing: {:<50} OK", name);
                }
            }
            Err(e) => {
                failures += 1;
                println!("    testing: {:<50} FAILED ({})", name, e);
            }
        }
    }

    if let Err(e) = pack.verify_archive().await {
        failures += 1;
        println!("    archive checksum: FAILED ({})", e);
    }

    if failures > 0 {
        bail!("{} problem(s) detected in {}", failures, cli.file);
    }
    if !cli.is_very_quiet() {
        println!("No errors detected in {}", cli.file);
    }
    Ok(())
}

/// Resolve an entry across FILE, every `--layer` pack and the packs found in
/// `--layer-dir`.
///
/// Prints the layers that contain the entry, highest priority first. In pipe
/// mode the winning layer's bytes are written to stdout.
async fn resolve_entry(base: ArchiveReader<dyn ReadAt>, cli: &Cli, name: &str) -> Result<()> {
    let mut stack = PackStack::new();
    stack.push(base);
    for location in &cli.layers {
        let layer = open_location(location, cli.open_options()).await?;
        stack.push(layer);
    }
    if let Some(ref dir) = cli.layer_dir {
        let added = stack
            .push_dir(Path::new(dir), &cli.open_options())
            .await
            .with_context(|| format!("cannot read pack directory {dir}"))?;
        if !cli.is_quiet() {
            eprintln!("Loaded {} pack(s) from {}", added, dir);
        }
    }

    let layers = stack.layers_for(name);
    if layers.is_empty() {
        bail!("entry '{}' not found in any of {} pack(s)", name, stack.len());
    }

    if cli.pipe {
        let data = stack.resolve(name).await?;
        use tokio::io::AsyncWriteExt;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&data).await?;
        stdout.flush().await?;
        return Ok(());
    }

    println!("Entry '{}' found in:", name);
    for meta in layers {
        println!(" - {} (priority: {})", meta.name, meta.priority);
    }
    let data = stack.resolve(name).await?;
    println!("Resolved content size: {}", format_size(data.len() as u64));

    Ok(())
}

/// Extract a single entry from the pack.
///
/// Handles various extraction options:
/// - Pipe mode (`-p`): Write to stdout instead of file
/// - Custom output directory (`-d`): Extract to specified directory
/// - Junk paths (`-j`): Ignore directory structure in the entry name
/// - Overwrite control (`-n`, `-o`): Handle existing files
async fn extract_entry(
    extractor: &PackExtractor<'_, dyn ReadAt>,
    name: &str,
    cli: &Cli,
    show_name: bool,
) -> Result<()> {
    // Pipe mode: write entry contents directly to stdout
    if cli.pipe {
        if show_name {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("--- {} ---\n", name).as_bytes())
                .await?;
        }
        extractor.extract_to_stdout(name).await?;
        return Ok(());
    }

    let root = Path::new(cli.extract_dir.as_deref().unwrap_or("."));
    let output = output_path(root, name, cli.junk_paths)?;

    // Handle existing files based on overwrite options
    if output.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", name);
    }

    extractor
        .extract_to_file(name, &output)
        .await
        .with_context(|| format!("cannot extract {}", name))?;

    Ok(())
}

fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.txt", "readme.txt"));
/// assert!(glob_match("file?.dat", "file1.dat"));
/// assert!(!glob_match("*.txt", "readme.md"));
/// ```
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star: skip it, or let it swallow one more character
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
