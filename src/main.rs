// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_recon::config::DEFAULT_CONFIG_PATH;
use parking_recon::pipeline::APP_LABEL;
use parking_recon::report::{write_csv, write_xlsx};
use parking_recon::{
    classify_workbook, AppConfig, ComplexRegistry, Credentials, Pipeline, PipelineInputs,
    ReconciliationReport, Session, SheetClassification,
};

/// Environment variable read before prompting for the password
const PASSWORD_ENV: &str = "PARKING_RECON_PASSWORD";

#[derive(Parser)]
#[command(name = "parking-recon", version, about = "Reconcile parking fees: APP vs SISCO")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List which APP sheets are authorized for processing
    Check {
        /// APP workbook (one sheet per complex)
        #[arg(long)]
        app: PathBuf,

        /// Login user (defaults to the configured one)
        #[arg(long)]
        user: Option<String>,
    },

    /// Run the full reconciliation and write the report
    Reconcile {
        /// APP workbook (one sheet per complex)
        #[arg(long)]
        app: PathBuf,

        /// Rate workbook ("Cobros")
        #[arg(long)]
        rates: PathBuf,

        /// SISCO workbook
        #[arg(long)]
        sisco: PathBuf,

        /// Report spreadsheet to write
        #[arg(long, default_value = "reconciliacion.xlsx")]
        output: PathBuf,

        /// Also write the report as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Login user (defaults to the configured one)
        #[arg(long)]
        user: Option<String>,

        /// Open the report viewer when done
        #[arg(long)]
        view: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Command::Check { app, user } => run_check(&config, &app, user),
        Command::Reconcile {
            app,
            rates,
            sisco,
            output,
            csv,
            user,
            view,
        } => {
            let inputs = PipelineInputs::from_paths(&app, &rates, &sisco)
                .context("Failed to read input workbooks")?;
            let report = run_reconcile(&config, &inputs, user)?;

            println!("\n💾 Writing report...");
            write_xlsx(&report, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("✓ Report written to {}", output.display());

            if let Some(csv_path) = csv {
                let file = std::fs::File::create(&csv_path)
                    .with_context(|| format!("Failed to create {}", csv_path.display()))?;
                write_csv(&report, file)?;
                println!("✓ CSV written to {}", csv_path.display());
            }

            if view {
                run_viewer(report)?;
            }
            Ok(())
        }
    }
}

/// Prompt for credentials and open a session
fn login(config: &AppConfig, user: Option<String>) -> Result<Session> {
    println!("🔐 Login");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let username = match user {
        Some(u) => u,
        None if !config.login.username.is_empty() => config.login.username.clone(),
        None => {
            print!("User: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(p) => p,
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?,
    };

    let registry = ComplexRegistry::load(&config.authorization.list_path)?;
    let session = Session::login(&config.login, &Credentials::new(username, password), registry)?;
    println!(
        "✓ Logged in as {} ({} authorized complexes)",
        session.username(),
        session.registry().len()
    );
    Ok(session)
}

fn print_classification(classification: &SheetClassification) {
    println!("\n📋 Sheets in the {} workbook", APP_LABEL);
    println!("✅ Authorized ({}):", classification.authorized.len());
    for name in &classification.authorized {
        println!("   • {}", name);
    }
    println!("⛔ Not authorized ({}):", classification.unauthorized.len());
    for name in &classification.unauthorized {
        println!("   • {}", name);
    }
}

fn run_check(config: &AppConfig, app: &Path, user: Option<String>) -> Result<()> {
    let session = login(config, user)?;

    let bytes = std::fs::read(app).with_context(|| format!("Failed to read {}", app.display()))?;
    let classification = classify_workbook(APP_LABEL, &bytes, session.registry())?;
    print_classification(&classification);

    if !classification.has_authorized() {
        eprintln!("\n❌ No authorized sheets: a reconciliation would stop here.");
    }
    Ok(())
}

fn run_reconcile(
    config: &AppConfig,
    inputs: &PipelineInputs,
    user: Option<String>,
) -> Result<ReconciliationReport> {
    let session = login(config, user)?;

    println!("\n⚖️  Reconciling APP vs SISCO...");
    let outcome = Pipeline::new(config.pipeline.clone()).run(&session, inputs)?;
    print_classification(&outcome.classification);

    let report = outcome.report;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    if report.is_balanced() {
        println!("🎉 APP and SISCO agree on every unit");
    } else {
        println!("⚠️  {} row(s) with differences", report.discrepancies().len());
    }

    Ok(report)
}

#[cfg(feature = "tui")]
fn run_viewer(report: ReconciliationReport) -> Result<()> {
    println!("\n🖥️  Starting report viewer... (Press 'q' to quit)\n");

    let mut app = ui::App::new(report);
    ui::run_ui(&mut app)?;

    println!("\n✅ Viewer closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_viewer(_report: ReconciliationReport) -> Result<()> {
    eprintln!("❌ Report viewer not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    Ok(())
}
