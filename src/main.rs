//! `gallery-images` command-line front end
//!
//! Loads the catalog, applies the gallery filter given on the command line
//! and runs one export. Artifacts are written to the output directory.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gallery_image_pipeline::application::{
    ArchiveExportUseCase, GallerySession, GalleryView, MissingReportUseCase, ReportOutcome,
};
use gallery_image_pipeline::domain::constants::progress::INITIAL_MESSAGE;
use gallery_image_pipeline::infrastructure::{
    AppConfig, CatalogSource, ConfigManager, HttpClient, SourcedIdentifierMap, convert_csv_file,
    init_logging_with_config,
};
use gallery_image_pipeline::pipeline::{ProgressSink, ProgressUpdate, TracingProgress};

#[derive(Parser)]
#[command(name = "gallery-images")]
#[command(
    about = "Export product images as ZIP archives and report missing catalog images",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog location, file path or http(s) URL
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// SKU to ASIN map location, file path or http(s) URL
    #[arg(long, global = true)]
    identifiers: Option<String>,

    /// Directory artifacts are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(flatten)]
    view: ViewArgs,
}

/// Gallery filter deciding which products are displayed
#[derive(Args, Debug, Default)]
struct ViewArgs {
    /// Case-insensitive text matched against SKU and title
    #[arg(long, global = true)]
    search: Option<String>,

    #[arg(long, global = true)]
    category: Option<String>,

    #[arg(long, global = true)]
    listing_type: Option<String>,
}

impl ViewArgs {
    fn to_view(&self) -> GalleryView {
        let mut view = GalleryView::default();
        if let Some(search) = &self.search {
            view = view.with_search(search.as_str());
        }
        if let Some(category) = &self.category {
            view = view.with_category(category.as_str());
        }
        if let Some(listing_type) = &self.listing_type {
            view = view.with_listing_type(listing_type.as_str());
        }
        view
    }
}

#[derive(Subcommand)]
enum Command {
    /// Download every reachable image of one product into `{asin}_images.zip`
    Archive {
        #[arg(long)]
        sku: String,

        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Check every catalog image and write `missing_images_report.csv`
    Report {
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Convert a catalog spreadsheet export into `products.json`
    ImportCsv {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "products.json")]
        output: PathBuf,
    },
    /// Write the default configuration file if none exists and print its path
    InitConfig {
        /// Overwrite an existing file with the defaults
        #[arg(long)]
        force: bool,
    },
}

fn config_manager(path: Option<PathBuf>) -> Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(catalog) = &cli.catalog {
        config.sources.catalog.clone_from(catalog);
    }
    if let Some(identifiers) = &cli.identifiers {
        config.sources.identifier_map.clone_from(identifiers);
    }
    if let Some(output_dir) = &cli.output_dir {
        config.sources.output_dir.clone_from(output_dir);
    }
}

/// Prints every progress line, and also logs it when the console log is off
struct CliProgress<W: Write> {
    out: Mutex<W>,
    console_logging: bool,
}

impl CliProgress<io::Stderr> {
    fn stderr(console_logging: bool) -> Self {
        Self::new(io::stderr(), console_logging)
    }
}

impl<W: Write> CliProgress<W> {
    const fn new(out: W, console_logging: bool) -> Self {
        Self { out: Mutex::new(out), console_logging }
    }
}

impl<W: Write> ProgressSink for CliProgress<W> {
    fn on_progress(&self, update: &ProgressUpdate) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", update.message());
        }
        if !self.console_logging {
            TracingProgress.on_progress(update);
        }
    }
}

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, cancelling in-flight requests");
            token.cancel();
        }
    });
}

async fn load_session(
    config: &AppConfig,
    http: &Arc<HttpClient>,
    token: &CancellationToken,
    view: GalleryView,
) -> Result<GallerySession> {
    let catalog = CatalogSource::parse(&config.sources.catalog)?
        .load_products(http, token)
        .await
        .context("Failed to load product catalog")?;
    let identifiers = SourcedIdentifierMap::new(
        CatalogSource::parse(&config.sources.identifier_map)?,
        Arc::clone(http),
        token.clone(),
    );

    let session = GallerySession::new(catalog, Arc::new(identifiers)).with_view(view);
    report_view(&session);
    Ok(session)
}

/// Logs how many products the filter shows and flags values no product carries
fn report_view(session: &GallerySession) {
    let view = session.view();
    if let Some(category) = view.category.as_deref() {
        if !session.categories().iter().any(|known| known.eq_ignore_ascii_case(category)) {
            warn!("⚠️  No product has category {:?}", category);
        }
    }
    if let Some(listing_type) = view.listing_type.as_deref() {
        if !session.listing_types().iter().any(|known| known.eq_ignore_ascii_case(listing_type)) {
            warn!("⚠️  No product has listing type {:?}", listing_type);
        }
    }
    info!(
        "🖼️ Gallery shows {} of {} products",
        session.rendered_products().len(),
        session.catalog().len()
    );
}

async fn run(cli: Cli) -> Result<()> {
    let manager = config_manager(cli.config.clone())?;

    if let Command::InitConfig { force } = cli.command {
        if force {
            manager.reset_to_defaults().await?;
        } else if !manager.init_config().await? {
            eprintln!("Configuration already exists, leaving it unchanged");
        }
        println!("{}", manager.config_path().display());
        return Ok(());
    }

    let mut config = manager.load_config().await?;
    apply_overrides(&mut config, &cli);
    init_logging_with_config(&config.logging)?;

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());
    let progress = CliProgress::stderr(config.logging.console_output);

    match &cli.command {
        Command::InitConfig { .. } => {}
        Command::ImportCsv { input, output } => {
            let count = convert_csv_file(input, output).await?;
            println!("Wrote {} products to {}", count, output.display());
        }
        Command::Archive { sku, concurrency } => {
            let http = Arc::new(HttpClient::new(config.http.clone())?);
            let session = load_session(&config, &http, &token, cli.view.to_view()).await?;

            let mut use_case = ArchiveExportUseCase::new(Arc::clone(&http), config.pipeline.clone());
            if let Some(concurrency) = *concurrency {
                use_case = use_case.with_concurrency(concurrency);
            }

            eprintln!("{INITIAL_MESSAGE}");
            let artifact = use_case.execute(&session, sku, &token, &progress).await?;
            let path = artifact.write_to(&config.sources.output_dir).await?;
            info!(
                "✅ Archive written: {} ({} of {} images)",
                path.display(),
                artifact.summary.succeeded,
                artifact.summary.attempted
            );
            println!("{}", path.display());
        }
        Command::Report { concurrency } => {
            let http = Arc::new(HttpClient::new(config.http.clone())?);
            let session = load_session(&config, &http, &token, cli.view.to_view()).await?;

            let mut use_case = MissingReportUseCase::new(Arc::clone(&http), config.pipeline.clone());
            if let Some(concurrency) = *concurrency {
                use_case = use_case.with_concurrency(concurrency);
            }

            match use_case.execute(&session, &token, &progress).await? {
                ReportOutcome::NothingMissing { summary } => {
                    println!("All {} images are reachable, nothing missing", summary.attempted);
                }
                ReportOutcome::Report(artifact) => {
                    let path = artifact.write_to(&config.sources.output_dir).await?;
                    info!(
                        "✅ Report written: {} ({} products, {} images missing)",
                        path.display(),
                        artifact.product_count,
                        artifact.missing_image_count
                    );
                    println!("{}", path.display());
                }
            }
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("❌ {error:#}");
            ExitCode::FAILURE
        }
    }
}
