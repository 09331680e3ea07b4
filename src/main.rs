use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};

use altoview::Error;
use altoview::library::{PageIndex, resolve_log_path, select_newspaper_dir};
use altoview::panic_handler;
use altoview::render::{
    CategorySet, OutputFormat, PagePair, PageService, RenderRequest, SourceRevision,
};
use altoview::settings::{self, Settings};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Inspect ALTO layout metadata as outlines over scanned newspaper pages",
    long_about = None
)]
struct Cli {
    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Unpacked library root, overriding `library_root`
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Newspaper directory under the root (default: the first one)
    #[arg(long, global = true)]
    paper: Option<String>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Base directory and page count
    Info,
    /// Page indices and ids
    List,
    /// Overlay boxes for one page as JSON
    Page {
        index: usize,
        #[arg(long)]
        zoom: Option<u32>,
        /// Categories: all, none, or a comma list of composedBlock,illustration,textLine,string
        #[arg(long, default_value = "all")]
        show: CategorySet,
    },
    /// Render one annotated page
    Render {
        index: usize,
        #[arg(long)]
        zoom: Option<u32>,
        #[arg(long, default_value = "all")]
        show: CategorySet,
        #[arg(long, default_value = "png")]
        format: OutputFormat,
        #[arg(long)]
        out: PathBuf,
    },
    /// Render every page into a directory
    Export {
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long)]
        zoom: Option<u32>,
        #[arg(long, default_value = "all")]
        show: CategorySet,
        #[arg(long, default_value = "png")]
        format: OutputFormat,
    },
    /// Inspect one text block: JSON, or the PNG close-up with --out
    Block {
        index: usize,
        block: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    panic_handler::initialize_panic_handler();

    info!("Starting altoview");
    let result = run(cli);
    if let Err(e) = &result {
        error!("{e:#}");
    }
    info!("Shutting down altoview");
    result
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let file = resolve_log_path().and_then(|path| {
        File::create(&path).with_context(|| format!("Failed to create log file {path:?}"))
    });
    match file {
        Ok(file) => {
            if let Err(e) = WriteLogger::init(level, Config::default(), file) {
                eprintln!("Logging disabled: {e}");
            }
        }
        Err(e) => eprintln!("Logging disabled: {e:#}"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = settings::load_settings(cli.config.as_deref());
    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| settings.library_root.clone());
    let base_dir = select_newspaper_dir(&root, cli.paper.as_deref())?;
    let index = PageIndex::discover(&base_dir, &settings.index_options())?;
    info!("Loaded {} pages from {base_dir:?}", index.len());

    let service = PageService::new(settings.service_config());

    match cli.command {
        Command::Info => print_json(&serde_json::json!({
            "base_dir": index.base_dir(),
            "total_pages": index.len(),
        })),
        Command::List => {
            for (i, pair) in index.iter().enumerate() {
                println!("{i}\t{}", pair.page_id());
            }
            Ok(())
        }
        Command::Page { index: i, zoom, show } => {
            let zoom = settings.check_zoom(zoom)?;
            let overlay = service.overlay(page(&index, i)?, zoom, show)?;
            print_json(&overlay)
        }
        Command::Render {
            index: i,
            zoom,
            show,
            format,
            out,
        } => {
            let request = request_for(&settings, page(&index, i)?, zoom, show, format)?;
            let bytes = service.render(&request)?;
            write_file(&out, &bytes)?;
            println!("{}", out.display());
            Ok(())
        }
        Command::Export {
            out_dir,
            zoom,
            show,
            format,
        } => export(&service, &settings, &index, &out_dir, zoom, show, format),
        Command::Block {
            index: i,
            block,
            out,
        } => {
            let pair = page(&index, i)?;
            match out {
                Some(out) => {
                    let (_, png) = service.block_image(pair, block)?;
                    write_file(&out, &png)?;
                    println!("{}", out.display());
                    Ok(())
                }
                None => print_json(&service.block_view(pair, block)?),
            }
        }
    }
}

fn page(index: &PageIndex, i: usize) -> Result<&PagePair> {
    index.get(i).ok_or_else(|| Error::PageNotFound(i).into())
}

fn request_for(
    settings: &Settings,
    pair: &PagePair,
    zoom: Option<u32>,
    show: CategorySet,
    format: OutputFormat,
) -> Result<RenderRequest> {
    let zoom = settings.check_zoom(zoom)?;
    let revision = SourceRevision::probe(pair)?;
    Ok(RenderRequest::new(pair.clone(), zoom)
        .with_visibility(show)
        .with_format(settings.output_format(format))
        .with_revision(revision))
}

fn export(
    service: &PageService,
    settings: &Settings,
    index: &PageIndex,
    out_dir: &Path,
    zoom: Option<u32>,
    show: CategorySet,
    format: OutputFormat,
) -> Result<()> {
    settings.check_zoom(zoom)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {out_dir:?}"))?;

    let pairs: Vec<&PagePair> = index.iter().collect();
    let failures: Vec<String> = pairs
        .par_iter()
        .filter_map(|pair| {
            let exported = request_for(settings, pair, zoom, show, format).and_then(|request| {
                let bytes = service.render(&request)?;
                let path = out_dir.join(format!(
                    "{}.{}",
                    pair.page_id(),
                    request.format.extension()
                ));
                write_file(&path, &bytes)
            });
            exported.err().map(|e| {
                warn!("Export of {} failed: {e:#}", pair.page_id());
                format!("{}: {e:#}", pair.page_id())
            })
        })
        .collect();

    let stats = service.cache_stats();
    info!(
        "Export finished: {} pages, {} failed, {} renders cached ({} bytes)",
        pairs.len(),
        failures.len(),
        stats.entries,
        stats.bytes
    );
    println!(
        "Exported {} of {} pages to {}",
        pairs.len() - failures.len(),
        pairs.len(),
        out_dir.display()
    );
    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("{failure}");
        }
        bail!("{} pages failed to export", failures.len());
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {path:?}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
