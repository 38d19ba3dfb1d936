use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use folio_core::acquire::{Acquirer, ArchiveRequest, HttpLoader};
use folio_core::book::Book;
use folio_core::cache::{ContentCache, DirCache};
use folio_core::cancel::CancelToken;
use folio_core::config::{
    acquire_options_from_config, config_path, load_config, read_options_from_config,
    render_options_from_config, AppConfig,
};
use folio_core::detect::detect;
use folio_core::document;
use folio_core::extract::ExtractedPages;
use folio_core::markup;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Fetch reading archives, import FB2 and HTML, render rich documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an FB2 (or zipped FB2) file and show its sections
    ImportBook {
        /// Input file
        #[arg(required = true)]
        input: String,

        /// Print the content of one section
        #[arg(long)]
        section: Option<usize>,

        /// Print the content of every section in order
        #[arg(long, conflicts_with = "section")]
        text: bool,
    },

    /// Import an HTML fragment into a rich document (printed as JSON)
    ImportHtml {
        /// Input file, or - for stdin
        #[arg(required = true)]
        input: String,
    },

    /// Render a rich document (JSON) to HTML
    Render {
        /// Input file, or - for stdin
        #[arg(required = true)]
        input: String,

        /// Skip images
        #[arg(long)]
        no_images: bool,
    },

    /// Acquire an archive through the cache, validating its size
    Fetch {
        /// Remote path or URL
        #[arg(required = true)]
        path: String,

        /// Expected size in bytes
        #[arg(long, required = true)]
        size: u64,

        /// Name recorded for the cache entry
        #[arg(long)]
        name: Option<String>,

        /// Base URL for relative paths
        #[arg(long)]
        base_url: Option<String>,

        /// Treat the archive as a zip of page images
        #[arg(long)]
        pages: bool,

        /// Cache directory (overrides config)
        #[arg(long)]
        cache_dir: Option<String>,

        /// Also write the validated archive here
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Inspect the archive cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Cache directory (overrides config)
        #[arg(long, global = true)]
        cache_dir: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached archives and their names
    List,
    /// Evict one archive
    Remove {
        /// Remote path the archive was cached under
        path: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("folio=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::ImportBook { input, section, text } => run_import_book(input, *section, *text, cli.json),
        Commands::ImportHtml { input } => run_import_html(input),
        Commands::Render { input, no_images } => run_render(input, *no_images),
        Commands::Fetch { path, size, name, base_url, pages, cache_dir, output } => run_fetch(
            FetchArgs {
                path,
                size: *size,
                name: name.as_deref(),
                base_url: base_url.as_deref(),
                pages: *pages,
                cache_dir: cache_dir.as_deref(),
                output: output.as_deref(),
            },
            cli.json,
        ),
        Commands::Cache { action, cache_dir } => run_cache(action, cache_dir.as_deref(), cli.json),
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Read a file, or stdin for `-`.
fn read_input(input: &str) -> Result<Vec<u8>, std::io::Error> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(input)
    }
}

fn run_import_book(input: &str, section: Option<usize>, text: bool, json: bool) -> CliResult {
    let path = Path::new(input);
    let data = std::fs::read(path)?;
    if let Ok(detected) = detect(&data, path.file_name().and_then(|f| f.to_str())) {
        tracing::debug!("detected {} ({:.2})", detected.format, detected.confidence);
    }

    let cfg = load_config();
    let mut book = folio_core::import_book_with(&data, &read_options_from_config(&cfg))?;

    if let Some(n) = section {
        let s = book
            .sections
            .get(n)
            .ok_or_else(|| format!("Section {} out of range (book has {})", n, book.sections.len()))?;
        println!("{}", s.content());
    } else if text {
        println!("{}", book.chapter_text());
    } else {
        print_book(&book, json)?;
    }

    book.destroy();
    Ok(())
}

fn print_book(book: &Book, json: bool) -> CliResult {
    if json {
        let info = serde_json::json!({
            "metadata": book.metadata,
            "sections": book.sections,
            "cover": book.cover().is_some(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Title: {}", book.metadata.title);
    if !book.metadata.author.is_empty() {
        let authors: Vec<&str> = book.metadata.author.iter().map(|a| a.name()).collect();
        println!("Authors: {}", authors.join(", "));
    }
    if !book.metadata.language.is_empty() {
        println!("Language: {}", book.metadata.language);
    }
    println!("Sections: {}", book.sections.len());
    for s in &book.sections {
        println!("  [{}] {:?}, {} bytes, {} ids", s.id, s.kind, s.size, s.ids.len());
    }
    Ok(())
}

fn run_import_html(input: &str) -> CliResult {
    let data = read_input(input)?;
    let html = String::from_utf8_lossy(&data);
    let nodes = folio_core::import_rich_document(&html);
    println!("{}", document::to_json(&nodes)?);
    Ok(())
}

fn run_render(input: &str, no_images: bool) -> CliResult {
    let data = read_input(input)?;
    let nodes = document::from_json(&String::from_utf8_lossy(&data))?;
    let mut opts = render_options_from_config(&load_config());
    opts.suppress_images |= no_images;
    let out = folio_core::render_rich_document(&nodes, &opts);
    println!("{}", markup::to_html(&out));
    Ok(())
}

struct FetchArgs<'a> {
    path: &'a str,
    size: u64,
    name: Option<&'a str>,
    base_url: Option<&'a str>,
    pages: bool,
    cache_dir: Option<&'a str>,
    output: Option<&'a str>,
}

fn cache_dir(override_dir: Option<&str>, cfg: &AppConfig) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    override_dir
        .map(PathBuf::from)
        .or_else(|| acquire_options_from_config(cfg).cache_dir)
        .or_else(DirCache::default_dir)
        .ok_or_else(|| "Could not determine cache directory".into())
}

fn run_fetch(args: FetchArgs<'_>, json: bool) -> CliResult {
    let dir = cache_dir(args.cache_dir, &load_config())?;

    let mut request = ArchiveRequest::new(args.path, args.size);
    if let Some(name) = args.name {
        request = request.with_save_name(name);
    }

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(fetch(args, request, &dir, json))
}

async fn fetch(args: FetchArgs<'_>, request: ArchiveRequest, dir: &Path, json: bool) -> CliResult {
    let cfg = load_config();
    let opts = acquire_options_from_config(&cfg);
    let read_opts = read_options_from_config(&cfg);

    let mut loader = HttpLoader::new(&opts.user_agent)?;
    if let Some(base) = args.base_url {
        loader = loader.with_base_url(base);
    }
    let cache = DirCache::open(dir).await?;
    let acquirer = Acquirer::new(loader, cache).with_max_attempts(opts.max_attempts);
    let cancel = CancelToken::new();

    let bar = if json {
        indicatif::ProgressBar::hidden()
    } else {
        indicatif::ProgressBar::new(args.size)
    };
    let progress = {
        let bar = bar.clone();
        move |loaded: u64, total: Option<u64>| {
            if let Some(total) = total {
                bar.set_length(total);
            }
            bar.set_position(loaded);
        }
    };

    if let Some(out) = args.output {
        let mut blob = None;
        acquirer
            .acquire(&request, Some(&progress), |data| blob = Some(data), || {}, &cancel)
            .await;
        bar.finish_and_clear();
        let blob = blob.ok_or_else(|| format!("Could not load {}", request.remote_path))?;
        std::fs::File::create(out)?.write_all(&blob)?;
        if !json {
            println!("Wrote: {}", out);
        }
        return Ok(());
    }

    if args.pages {
        let mut result: Option<ExtractedPages> = None;
        acquirer
            .acquire_pages(&request, &opts.security, Some(&progress), |p| result = Some(p), || {}, &cancel)
            .await;
        bar.finish_and_clear();
        let mut pages = result.ok_or_else(|| format!("Could not load {}", request.remote_path))?;
        if json {
            let list: Vec<_> = pages
                .images
                .iter()
                .map(|p| serde_json::json!({ "name": p.name, "width": p.width, "height": p.height }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        } else {
            for p in &pages.images {
                println!("{} {}x{}", p.name, p.width, p.height);
            }
        }
        pages.destroy();
    } else {
        let mut result: Option<Book> = None;
        acquirer
            .acquire_book(&request, &read_opts, Some(&progress), |b| result = Some(b), || {}, &cancel)
            .await;
        bar.finish_and_clear();
        let mut book = result.ok_or_else(|| format!("Could not load {}", request.remote_path))?;
        print_book(&book, json)?;
        book.destroy();
    }
    Ok(())
}

fn run_cache(action: &CacheAction, override_dir: Option<&str>, json: bool) -> CliResult {
    let cfg = load_config();
    let dir = cache_dir(override_dir, &cfg)?;
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(manage_cache(action, &dir, json))
}

async fn manage_cache(action: &CacheAction, dir: &Path, json: bool) -> CliResult {
    let cache = DirCache::open(dir).await?;
    match action {
        CacheAction::List => {
            let entries = cache.entries().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (path, name) in &entries {
                    println!("{}\t{}", path, name);
                }
            }
        }
        CacheAction::Remove { path } => {
            let removed = cache.remove(path).await?;
            if !json {
                if removed {
                    println!("Removed {}", path);
                } else {
                    println!("Not cached: {}", path);
                }
            }
        }
    }
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let default_cfg = AppConfig::default();
            let toml = toml::to_string_pretty(&default_cfg)?;
            std::fs::write(&path, toml)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg: AppConfig = if path.exists() {
                let s = std::fs::read_to_string(&path)?;
                toml::from_str(&s).unwrap_or_else(|_| AppConfig::default())
            } else {
                AppConfig::default()
            };

            set_config_key(&mut cfg, key, value)?;

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml = toml::to_string_pretty(&cfg)?;
            std::fs::write(&path, toml)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", key, value).into())
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["acquire", sub] => match *sub {
            "max_attempts" => cfg.acquire.max_attempts = parse_value(key, value)?,
            "cache_dir" => cfg.acquire.cache_dir = Some(value.to_string()),
            "user_agent" => cfg.acquire.user_agent = Some(value.to_string()),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["render", "suppress_images"] => cfg.render.suppress_images = parse_value(key, value)?,
        ["security", sub] => match *sub {
            "max_entry_size_mb" => cfg.security.max_entry_size_mb = Some(parse_value(key, value)?),
            "max_compression_ratio" => cfg.security.max_compression_ratio = Some(parse_value(key, value)?),
            "max_entries" => cfg.security.max_entries = Some(parse_value(key, value)?),
            "max_nesting_depth" => cfg.security.max_nesting_depth = Some(parse_value(key, value)?),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}
