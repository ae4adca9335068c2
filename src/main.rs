// Carbon Audit - command line entry point
//
// Every command opens the record store named by --db (or the config file),
// runs one engine operation and prints the result.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use carbon_audit::{
    dashboard::resolve_window, import_emissions_csv, submit_emission, AppConfig, Company,
    DashboardSnapshot, EmissionSubmission, PlatformStats, RatingEngine, RecordStore, SqliteStore,
    SubScores, TransactionKind,
};

/// Emissions tracking, carbon credit ledger and SAC ratings for MSMEs.
#[derive(Parser, Debug)]
#[command(name = "carbon-audit", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "CARBON_AUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the config file
    #[arg(long, global = true, env = "CARBON_AUDIT_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and schema.
    Init,
    /// Register and list companies.
    Company {
        #[command(subcommand)]
        action: CompanyCommand,
    },
    /// Record emission measurements.
    Emission {
        #[command(subcommand)]
        action: EmissionCommand,
    },
    /// Carbon credit purchases, sales and offsets.
    Credit {
        #[command(subcommand)]
        action: CreditCommand,
    },
    /// SAC rating assessments.
    Rating {
        #[command(subcommand)]
        action: RatingCommand,
    },
    /// Print the full dashboard snapshot as JSON.
    Report(WindowArgs),
    /// Totals across every registered company.
    Stats,
    /// Open the terminal dashboard.
    Dashboard(WindowArgs),
}

#[derive(Subcommand, Debug)]
enum CompanyCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        industry: String,
        #[arg(long)]
        location: String,
        #[arg(long, default_value = "")]
        registration_number: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum EmissionCommand {
    Add {
        company: String,
        #[arg(long)]
        date: NaiveDate,
        /// CO2, NOx, SOx, PM, CH4 or Other
        #[arg(long)]
        pollutant: String,
        #[arg(long)]
        amount: f64,
        /// t or kg
        #[arg(long, default_value = "t")]
        unit: String,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Bulk import from CSV (date,pollutant,amount,unit,source,notes).
    Import { company: String, file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum CreditCommand {
    /// Record a pending transaction.
    Record {
        company: String,
        /// purchase, sale or offset
        #[arg(long)]
        kind: TransactionKind,
        #[arg(long)]
        credits: f64,
        /// Defaults to the configured market price
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Settle { transaction: String },
    Cancel { transaction: String },
    Balance { company: String },
    History { company: String },
}

#[derive(Subcommand, Debug)]
enum RatingCommand {
    Assess {
        company: String,
        #[arg(long)]
        knowledge: f64,
        #[arg(long)]
        compliance: f64,
        #[arg(long)]
        reduction: f64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    Show { company: String },
}

#[derive(clap::Args, Debug)]
struct WindowArgs {
    company: String,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let mut store = open_store(&config.database_path)?;

    match cli.command {
        Commands::Init => {
            println!("✓ Database ready at {}", config.database_path.display());
        }
        Commands::Company { action } => run_company(&mut store, action)?,
        Commands::Emission { action } => run_emission(&mut store, action)?,
        Commands::Credit { action } => run_credit(&mut store, &config, action)?,
        Commands::Rating { action } => run_rating(&mut store, &config, action)?,
        Commands::Report(args) => {
            let snapshot = build_snapshot(&store, &config, &args)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Stats => {
            let stats = PlatformStats::build(&store, &config)?;
            println!("Registered MSMEs:      {}", stats.registered_companies);
            println!("Tons CO₂ tracked:      {:.2}", stats.co2_tracked);
            println!("All pollutants:        {:.2} t", stats.emissions_tracked);
            println!(
                "Carbon credits traded: {:.2} ({:.2} {})",
                stats.credits_traded.credits, stats.credits_traded.value, stats.currency
            );
        }
        Commands::Dashboard(args) => run_dashboard(&store, &config, &args)?,
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("opening database {}", path.display()))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn run_company(store: &mut SqliteStore, action: CompanyCommand) -> Result<()> {
    match action {
        CompanyCommand::Add {
            name,
            industry,
            location,
            registration_number,
            email,
            phone,
        } => {
            let mut company = Company::new(&name, &industry, &location);
            company.registration_number = registration_number;
            company.contact_email = email;
            company.contact_phone = phone;

            let stored = store.insert_company(&company)?;
            println!("✓ Registered {} ({})", stored.name, stored.id);
        }
        CompanyCommand::List => {
            let companies = store.list_companies()?;
            if companies.is_empty() {
                println!("No companies registered yet.");
            }
            for company in companies {
                println!(
                    "{}  {:<32} {:<20} {}",
                    company.id, company.name, company.industry, company.location
                );
            }
        }
    }

    Ok(())
}

fn run_emission(store: &mut SqliteStore, action: EmissionCommand) -> Result<()> {
    match action {
        EmissionCommand::Add {
            company,
            date,
            pollutant,
            amount,
            unit,
            source,
            notes,
        } => {
            let submission = EmissionSubmission {
                date,
                pollutant,
                amount,
                unit,
                source,
                notes,
            };
            let record = submit_emission(store, &company, &submission)?;
            println!(
                "✓ Recorded {} {} {} on {} ({})",
                record.amount, record.unit, record.pollutant, record.measurement_date, record.id
            );
        }
        EmissionCommand::Import { company, file } => {
            let report = import_emissions_csv(store, &company, &file)
                .with_context(|| format!("importing {}", file.display()))?;

            println!("✓ {}", report.summary());
            for row in &report.rejected {
                eprintln!("  line {}: {}", row.line, row.reason);
            }
        }
    }

    Ok(())
}

fn run_credit(store: &mut SqliteStore, config: &AppConfig, action: CreditCommand) -> Result<()> {
    let ledger = config.ledger();

    match action {
        CreditCommand::Record {
            company,
            kind,
            credits,
            price,
            date,
        } => {
            let price = price.unwrap_or(ledger.market().price_per_credit);
            let tx = ledger.record_transaction(
                store,
                &company,
                kind,
                credits,
                price,
                date.unwrap_or_else(today),
            )?;
            println!(
                "✓ Pending {} of {} credits, total {:.2} {} ({})",
                tx.kind,
                tx.credits,
                tx.total_amount,
                ledger.market().currency,
                tx.id
            );
        }
        CreditCommand::Settle { transaction } => {
            let tx = ledger.settle(store, &transaction)?;
            println!("✓ Transaction {} {}", tx.id, tx.status);
        }
        CreditCommand::Cancel { transaction } => {
            let tx = ledger.cancel(store, &transaction)?;
            println!("✓ Transaction {} {}", tx.id, tx.status);
        }
        CreditCommand::Balance { company } => {
            let summary = ledger.summary(store, &company)?;
            println!("Balance:       {:.2} credits", summary.balance);
            println!("Pending:       {:+.2} credits", summary.pending_credits);
            println!(
                "Market price:  {:.2} {} / credit ({} available)",
                summary.market_price, summary.currency, summary.available_credits
            );
        }
        CreditCommand::History { company } => {
            for tx in ledger.history(store, &company)? {
                println!(
                    "{}  {:<8} {:>10.2} @ {:>10.2} = {:>12.2}  {:<9} {}",
                    tx.transaction_date,
                    tx.kind,
                    tx.credits,
                    tx.price_per_credit,
                    tx.total_amount,
                    tx.status,
                    tx.id
                );
            }
        }
    }

    Ok(())
}

fn run_rating(store: &mut SqliteStore, config: &AppConfig, action: RatingCommand) -> Result<()> {
    match action {
        RatingCommand::Assess {
            company,
            knowledge,
            compliance,
            reduction,
            date,
            notes,
        } => {
            let engine = config.rating_engine()?;
            let scores = SubScores {
                knowledge,
                compliance,
                reduction,
            };
            let assessment =
                engine.assess(store, &company, scores, date.unwrap_or_else(today), notes)?;
            println!(
                "✓ SAC rating {} ({:.2}/100) recorded on {}",
                assessment.grade, assessment.overall_score, assessment.assessment_date
            );
        }
        RatingCommand::Show { company } => match RatingEngine::summary(store, &company)? {
            Some(summary) => {
                println!("Grade:       {} ({:.2}/100)", summary.grade, summary.overall);
                println!(
                    "Sub-scores:  knowledge {:.0}, compliance {:.0}, reduction {:.0}",
                    summary.sub_scores.knowledge,
                    summary.sub_scores.compliance,
                    summary.sub_scores.reduction
                );
                if let Some(p) = summary.percentile {
                    println!("Peers:       {} (rank {} of {})", p.label(), p.rank, p.peer_count);
                }
                println!("Trend:       {}", summary.trend.as_str());
                if let Some(change) = summary.compliance_change {
                    println!("Compliance:  {:+.0} pts since last assessment", change);
                }
                println!("Assessed on: {}", summary.assessment_date);
            }
            None => println!("No assessment recorded for {}", company),
        },
    }

    Ok(())
}

fn build_snapshot(
    store: &SqliteStore,
    config: &AppConfig,
    args: &WindowArgs,
) -> Result<DashboardSnapshot> {
    let window = resolve_window(args.from, args.to, today())?;
    Ok(DashboardSnapshot::build(store, config, &args.company, &window)?)
}

#[cfg(feature = "tui")]
fn run_dashboard(store: &SqliteStore, config: &AppConfig, args: &WindowArgs) -> Result<()> {
    let snapshot = build_snapshot(store, config, args)?;
    let transactions = store.list_transactions(&args.company)?;

    let mut app = carbon_audit::ui::App::new(snapshot, transactions);
    carbon_audit::ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_dashboard(_store: &SqliteStore, _config: &AppConfig, _args: &WindowArgs) -> Result<()> {
    anyhow::bail!(
        "terminal dashboard not available in this build; rebuild with --features tui \
         or use `carbon-audit report` for a JSON snapshot"
    )
}
