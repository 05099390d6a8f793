use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use famfin::cli::report::ReportOptions;
use famfin::core::aggregate::SortKey;
use famfin::core::ledger::TransactionDraft;
use famfin::core::log::init_logging;
use famfin::core::{Month, TransactionType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct DraftArgs {
    /// expense or income
    #[arg(long = "type")]
    kind: TransactionType,
    #[arg(long)]
    category: String,
    #[arg(long)]
    amount: f64,
    /// Currency code, defaults to the base currency
    #[arg(long)]
    currency: Option<String>,
    /// YYYY-MM-DD, defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    description: Option<String>,
}

impl DraftArgs {
    fn into_draft(self) -> TransactionDraft {
        TransactionDraft {
            kind: self.kind,
            category: self.category,
            amount: Some(self.amount),
            currency: self.currency.unwrap_or_default(),
            date: Some(
                self.date
                    .unwrap_or_else(|| chrono::Local::now().date_naive()),
            ),
            description: self.description,
        }
    }
}

#[derive(Args)]
struct ReportArgs {
    /// Restrict to a month (YYYY-MM); repeatable
    #[arg(long = "month")]
    months: Vec<Month>,
    /// Restrict to a category; repeatable
    #[arg(long = "category")]
    categories: Vec<String>,
    /// Case-insensitive description search
    #[arg(long)]
    search: Option<String>,
    /// Display currency, defaults to the configured one
    #[arg(long)]
    currency: Option<String>,
    /// date, amount or category
    #[arg(long)]
    sort: Option<SortKey>,
    /// Sort descending
    #[arg(long, requires = "sort")]
    desc: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Load this many months before the live window
    #[arg(long, default_value_t = 0, conflicts_with = "all")]
    backfill: usize,
    /// Load the full history
    #[arg(long)]
    all: bool,
    /// Keep running and redraw on every change
    #[arg(long)]
    watch: bool,
}

impl From<ReportArgs> for ReportOptions {
    fn from(args: ReportArgs) -> Self {
        ReportOptions {
            months: args.months,
            categories: args.categories,
            search: args.search,
            currency: args.currency,
            sort: args.sort,
            descending: args.desc,
            page: args.page,
            backfill_months: args.backfill,
            all: args.all,
            watch: args.watch,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show today's exchange rates
    Rates,
    /// Display totals, category breakdown, trend and transactions
    Report(ReportArgs),
    /// Record a transaction
    Add(DraftArgs),
    /// Replace a transaction, recomputing its rate from today's table
    Edit {
        id: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
    /// Delete a transaction
    Delete { id: String },
    /// Import a JSON array of transactions
    Import { path: PathBuf },
    /// Delete every transaction
    Wipe {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
    /// Post configured recurring items into a month
    PostRecurring {
        /// Target month (YYYY-MM), defaults to the current month
        #[arg(long)]
        month: Option<Month>,
    },
    /// List categories in picker order
    Categories { kind: TransactionType },
    /// Rewrite legacy timestamp dates as calendar dates
    MigrateDates,
}

impl From<Commands> for famfin::AppCommand {
    fn from(cmd: Commands) -> famfin::AppCommand {
        match cmd {
            Commands::Rates => famfin::AppCommand::Rates,
            Commands::Report(args) => famfin::AppCommand::Report(args.into()),
            Commands::Add(args) => famfin::AppCommand::Add(args.into_draft()),
            Commands::Edit { id, draft } => famfin::AppCommand::Edit {
                id,
                draft: draft.into_draft(),
            },
            Commands::Delete { id } => famfin::AppCommand::Delete { id },
            Commands::Import { path } => famfin::AppCommand::Import { path },
            Commands::Wipe { .. } => famfin::AppCommand::Wipe,
            Commands::PostRecurring { month } => famfin::AppCommand::PostRecurring { month },
            Commands::Categories { kind } => famfin::AppCommand::Categories { kind },
            Commands::MigrateDates => famfin::AppCommand::MigrateDates,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => famfin::cli::setup::setup_at_path(path),
            None => famfin::cli::setup::setup(),
        },
        Some(Commands::Wipe { yes: false }) => {
            Err(anyhow::anyhow!("Refusing to wipe without --yes"))
        }
        Some(cmd) => famfin::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
