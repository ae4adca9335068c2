// Carbon Audit - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod error;
pub mod models;
pub mod store;
pub mod db;
pub mod aggregator;     // Emissions Aggregator
pub mod ledger;         // Carbon Credit Ledger
pub mod rating;         // SAC Rating Engine
pub mod config;
pub mod ingest;         // Form + CSV emission ingestion
pub mod dashboard;      // View models shared by CLI, TUI and API

#[cfg(feature = "tui")]
pub mod ui;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{CarbonError, Result};
pub use models::{
    Company, CreditTransaction, DateRange, EmissionRecord, EmissionSubmission, MassUnit,
    PollutantKind, RatingAssessment, SubScores, TransactionKind, TransactionStatus,
};
pub use store::RecordStore;
pub use db::{setup_database, Event, SqliteStore};
pub use aggregator::{
    pollutant_totals, DistributionSlice, EmissionsAggregator, EmissionsSummary, Granularity, Period,
    PeriodBucket, PollutantTotal, TrendPoint,
};
pub use ledger::{
    balance_as_of, balance_change_percent, balance_of, trade_volume, CarbonLedger, LedgerSummary,
    MarketConfig, TradeVolume,
};
pub use rating::{
    compliance_change, GradeBand, GradeScale, Percentile, Rating, RatingConfig, RatingEngine,
    RatingSummary, RatingTrend, RatingWeights,
};
pub use config::{AppConfig, ServerConfig};
pub use ingest::{import_emissions_csv, import_emissions_reader, submit_emission, ImportReport, RejectedRow};
pub use dashboard::{DashboardSnapshot, OverviewStats, PlatformStats, View};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
