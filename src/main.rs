use anyhow::Context;
use clap::{Parser, Subcommand};
use portal_engine::{Diagnostics, StepEvent};
use portal_scrape::config::{CityplanProfile, LocatorDef, Params, PdonlineProfile, Profile};
use portal_scrape::{workflow, Session};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "portal-scrape")]
#[command(about = "Read planning controls and download application documents from council portals")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Site profile to use instead of the built-in one
    #[arg(long, global = true, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Run in headless mode (overrides profile)
    #[arg(long, global = true)]
    headless: bool,

    /// Directory for failure snapshots and the height map capture
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    diagnostics: PathBuf,

    /// Set a profile parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", global = true, value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Validate the profile without launching a browser
    #[arg(long, global = true)]
    check: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Look up a property on the Gold Coast City Plan map
    Property {
        /// Address or lot/plan to search for
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Download a document for a development application from PD Online
    Document {
        /// Application number, e.g. MIN/2024/216
        application: String,

        /// Output directory
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Exact document name to download
        #[arg(long, value_name = "NAME")]
        document: Option<String>,
    },
}

fn load_profile<P: Profile>(path: Option<&Path>, params: &Params) -> anyhow::Result<P> {
    let profile = match path {
        Some(path) => P::load(path, params)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => P::builtin(params)?,
    };
    Ok(profile)
}

fn print_locator(label: &str, def: &LocatorDef) {
    println!("  {}:", label);
    for candidate in &def.candidates {
        println!("    - {}", candidate);
    }
    if let Some(ref fallback) = def.fallback {
        println!("    - {} (fallback)", fallback);
    }
}

fn print_site<P: Profile>(profile: &P) {
    let site = profile.site();
    println!("Profile valid: {}", site.name);
    println!("  URL: {}", site.url);
    println!(
        "  Timeouts: locate {}ms, ready {}ms, settle {}ms",
        site.timeouts.locate_ms, site.timeouts.ready_ms, site.timeouts.settle_ms
    );
    for (name, def) in &site.params {
        let req = if def.required { " (required)" } else { "" };
        let desc = def.description.as_deref().unwrap_or("");
        println!("  Param {}{}: {}", name, req, desc);
    }
}

async fn run_property(cli: &Cli, query: &str, params: &Params) -> anyhow::Result<bool> {
    let mut profile: CityplanProfile = load_profile(cli.profile.as_deref(), params)?;

    if cli.check {
        print_site(&profile);
        print_locator("Search input", &profile.search.input);
        print_locator("Side panel", &profile.panel.locator);
        println!("  Panel rules: {}", profile.rules.len());
        println!("  Overlay end anchors: {}", profile.overlays.ends.join(", "));
        return Ok(true);
    }

    if cli.headless {
        profile.site_mut().browser.headless = true;
    }

    println!("Looking up: {}", query);
    let session = Session::launch(&profile.site.browser).await?;
    let outcome = workflow::cityplan::run(
        session.driver(),
        &profile,
        query,
        Diagnostics::new(&cli.diagnostics),
    )
    .await;
    if let Err(e) = session.close().await {
        warn!("closing browser: {}", e);
    }

    let run = outcome?;
    log_steps(&run.events);
    let record = run.value;
    println!();
    println!("{}", record);
    Ok(true)
}

fn log_steps(events: &[StepEvent]) {
    for event in events {
        debug!(
            "step '{}' {:?} in {}ms",
            event.step,
            event.outcome,
            event.elapsed.as_millis()
        );
    }
}

async fn run_document(cli: &Cli, application: &str, params: &Params) -> anyhow::Result<bool> {
    let mut profile: PdonlineProfile = load_profile(cli.profile.as_deref(), params)?;

    if cli.check {
        print_site(&profile);
        print_locator("Application input", &profile.search.input);
        print_locator("Document rows", &profile.documents.rows);
        println!("  Document: {}", profile.documents.marker);
        println!(
            "  Saves to: {}",
            workflow::pdonline::output_path(&profile, application)?.display()
        );
        return Ok(true);
    }

    if cli.headless {
        profile.site_mut().browser.headless = true;
    }

    println!("Application: {}", application);
    let session = Session::launch(&profile.site.browser).await?;
    let outcome = workflow::pdonline::run(
        session.driver(),
        &profile,
        application,
        Diagnostics::new(&cli.diagnostics),
    )
    .await;
    if let Err(e) = session.close().await {
        warn!("closing browser: {}", e);
    }

    let run = outcome?;
    log_steps(&run.events);
    let result = run.value;
    println!();
    if result.success() {
        println!("✓ Downloaded");
    } else {
        println!("✗ Failed");
    }
    println!("{}", result);
    Ok(result.success())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // RUST_LOG, when set, refines the -v/-q level.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut params = Params::from_args(&cli.params)?;

    let ok = match &cli.command {
        Command::Property { query } => {
            let query = query.join(" ");
            run_property(&cli, &query, &params).await?
        }
        Command::Document {
            application,
            out,
            document,
        } => {
            if let Some(dir) = out {
                params = params.set("out_dir", dir.display().to_string());
            }
            if let Some(name) = document {
                params = params.set("document", name.as_str());
            }
            run_document(&cli, application, &params).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
