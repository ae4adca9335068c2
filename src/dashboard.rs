// 🖥️ Dashboard view models - read-only projections for the CLI, TUI and API
//
// Nothing here computes domain numbers of its own: every figure comes out of
// the aggregator, the ledger or the rating engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregator::{pollutant_totals, EmissionsSummary};
use crate::config::AppConfig;
use crate::error::Result;
use crate::ledger::{trade_volume, LedgerSummary, TradeVolume};
use crate::models::{Company, DateRange, PollutantKind};
use crate::rating::{RatingEngine, RatingSummary};
use crate::store::RecordStore;

// ============================================================================
// VIEW SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    #[default]
    Overview,
    Emissions,
    Credits,
    SacRating,
}

impl View {
    pub const ALL: [View; 4] = [View::Overview, View::Emissions, View::Credits, View::SacRating];

    pub fn next(&self) -> Self {
        match self {
            View::Overview => View::Emissions,
            View::Emissions => View::Credits,
            View::Credits => View::SacRating,
            View::SacRating => View::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            View::Overview => View::SacRating,
            View::Emissions => View::Overview,
            View::Credits => View::Emissions,
            View::SacRating => View::Credits,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            View::Overview => "Overview",
            View::Emissions => "Emissions",
            View::Credits => "Carbon Credits",
            View::SacRating => "SAC Rating",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            View::Overview => "overview",
            View::Emissions => "emissions",
            View::Credits => "credits",
            View::SacRating => "sac-rating",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        View::ALL.into_iter().find(|v| v.slug() == slug)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Months shown when the caller gives no start date.
pub const DEFAULT_WINDOW_MONTHS: u32 = 6;

/// Reporting window from optional bounds: `to` defaults to `today`, `from`
/// to the start of the trailing DEFAULT_WINDOW_MONTHS.
pub fn resolve_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<DateRange> {
    let end = to.unwrap_or(today);
    match from {
        Some(start) => DateRange::new(start, end),
        None => DateRange::trailing_months(end, DEFAULT_WINDOW_MONTHS),
    }
}

/// Headline cards on the overview tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_emissions: f64,
    pub emissions_change_percent: Option<f64>,
    pub credit_balance: f64,
    /// Balance movement across the window.
    pub credit_change_percent: Option<f64>,
    pub grade: Option<String>,
    pub compliance_score: Option<f64>,
    /// Compliance points since the previous assessment.
    pub compliance_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub company: Company,
    pub overview: OverviewStats,
    pub emissions: EmissionsSummary,
    pub ledger: LedgerSummary,
    pub rating: Option<RatingSummary>,
}

impl DashboardSnapshot {
    /// Gather everything the four tabs show for one company and window.
    pub fn build<S: RecordStore + ?Sized>(
        store: &S,
        config: &AppConfig,
        company_id: &str,
        window: &DateRange,
    ) -> Result<Self> {
        let company = store.get_company(company_id)?;

        let emissions = config.aggregator().summarize(store, company_id, window)?;
        let ledger_engine = config.ledger();
        let ledger = ledger_engine.summary(store, company_id)?;
        let credit_change_percent = ledger_engine.balance_change(store, company_id, window)?;
        let rating = RatingEngine::summary(store, company_id)?;

        let overview = OverviewStats {
            total_emissions: emissions.total,
            emissions_change_percent: emissions.period_change_percent(),
            credit_balance: ledger.balance,
            credit_change_percent,
            grade: rating.as_ref().map(|r| r.grade.clone()),
            compliance_score: rating.as_ref().map(|r| r.sub_scores.compliance),
            compliance_change: rating.as_ref().and_then(|r| r.compliance_change),
        };

        tracing::debug!(company_id, total = emissions.total, "built dashboard snapshot");

        Ok(DashboardSnapshot {
            company,
            overview,
            emissions,
            ledger,
            rating,
        })
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

/// Landing-page totals across every registered company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub registered_companies: usize,
    /// Tonnes of CO2 recorded, all time.
    pub co2_tracked: f64,
    /// Tonnes of every pollutant recorded, all time.
    pub emissions_tracked: f64,
    pub credits_traded: TradeVolume,
    pub currency: String,
}

impl PlatformStats {
    pub fn build<S: RecordStore + ?Sized>(store: &S, config: &AppConfig) -> Result<Self> {
        let companies = store.list_companies()?;
        let all_time = DateRange::all_time()?;

        let mut records = Vec::new();
        let mut transactions = Vec::new();
        for company in &companies {
            records.extend(store.list_emissions(&company.id, &all_time)?);
            transactions.extend(store.list_transactions(&company.id)?);
        }

        let totals = pollutant_totals(&records);
        let co2_tracked = totals
            .iter()
            .find(|t| t.pollutant == PollutantKind::Co2)
            .map(|t| t.total)
            .unwrap_or(0.0);

        tracing::debug!(companies = companies.len(), records = records.len(), "built platform stats");

        Ok(PlatformStats {
            registered_companies: companies.len(),
            co2_tracked,
            emissions_tracked: totals.iter().map(|t| t.total).sum(),
            credits_traded: trade_volume(&transactions),
            currency: config.ledger().market().currency.clone(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::error::CarbonError;
    use crate::ingest::submit_emission;
    use crate::models::{EmissionSubmission, SubScores, TransactionKind};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn emission(day: NaiveDate, amount: f64) -> EmissionSubmission {
        EmissionSubmission {
            date: day,
            pollutant: "CO2".to_string(),
            amount,
            unit: "t".to_string(),
            source: "Boiler 1".to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_view_cycles() {
        let mut view = View::default();
        for _ in 0..View::ALL.len() {
            assert_eq!(view.next().previous(), view);
            view = view.next();
        }
        assert_eq!(view, View::Overview);

        assert_eq!(View::Overview.previous(), View::SacRating);
        assert_eq!(View::SacRating.title(), "SAC Rating");
        assert_eq!(View::from_slug("sac-rating"), Some(View::SacRating));
        assert_eq!(View::from_slug("settings"), None);
    }

    #[test]
    fn test_resolve_window() {
        let today = date(2025, 6, 15);

        let default = resolve_window(None, None, today).unwrap();
        assert_eq!(default.start, date(2025, 1, 1));
        assert_eq!(default.end, today);

        let explicit = resolve_window(Some(date(2025, 3, 1)), Some(date(2025, 3, 31)), today).unwrap();
        assert_eq!(explicit.start, date(2025, 3, 1));
        assert_eq!(explicit.end, date(2025, 3, 31));

        assert!(matches!(
            resolve_window(Some(date(2025, 7, 1)), None, today),
            Err(CarbonError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_snapshot_without_rating() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let company = Company::new("Acme Industries Ltd.", "Textiles", "Indore");
        store.insert_company(&company).unwrap();

        let window = DateRange::new(date(2025, 1, 1), date(2025, 3, 31)).unwrap();
        let snapshot =
            DashboardSnapshot::build(&store, &AppConfig::default(), &company.id, &window).unwrap();

        assert_eq!(snapshot.overview.total_emissions, 0.0);
        assert_eq!(snapshot.overview.emissions_change_percent, None);
        assert_eq!(snapshot.overview.grade, None);
        assert_eq!(snapshot.overview.credit_change_percent, None);
        assert_eq!(snapshot.overview.compliance_change, None);
        assert!(snapshot.rating.is_none());
        assert_eq!(snapshot.emissions.buckets.len(), 3);
        assert_eq!(snapshot.ledger.market_price, 2500.0);
    }

    #[test]
    fn test_snapshot_collects_engine_outputs() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let company = Company::new("Acme Industries Ltd.", "Textiles", "Indore");
        store.insert_company(&company).unwrap();
        let config = AppConfig::default();

        submit_emission(&mut store, &company.id, &emission(date(2025, 5, 4), 100.0)).unwrap();
        submit_emission(&mut store, &company.id, &emission(date(2025, 6, 4), 92.0)).unwrap();

        let ledger = config.ledger();
        for (credits, day) in [(200.0, date(2025, 4, 20)), (45.0, date(2025, 6, 1))] {
            let tx = ledger
                .record_transaction(&mut store, &company.id, TransactionKind::Purchase, credits, 2500.0, day)
                .unwrap();
            ledger.settle(&mut store, &tx.id).unwrap();
        }

        let rating = config.rating_engine().unwrap();
        for (compliance, day) in [(85.0, date(2025, 3, 31)), (90.0, date(2025, 6, 15))] {
            rating
                .assess(
                    &mut store,
                    &company.id,
                    SubScores { knowledge: 85.0, compliance, reduction: 80.0 },
                    day,
                    None,
                )
                .unwrap();
        }

        let window = DateRange::new(date(2025, 5, 1), date(2025, 6, 30)).unwrap();
        let snapshot = DashboardSnapshot::build(&store, &config, &company.id, &window).unwrap();

        assert_eq!(snapshot.overview.total_emissions, 192.0);
        assert!((snapshot.overview.emissions_change_percent.unwrap() - -8.0).abs() < 1e-9);
        assert_eq!(snapshot.overview.credit_balance, 245.0);
        assert_eq!(snapshot.overview.credit_change_percent, Some(22.5));
        assert_eq!(snapshot.overview.grade.as_deref(), Some("B+"));
        assert_eq!(snapshot.overview.compliance_score, Some(90.0));
        assert_eq!(snapshot.overview.compliance_change, Some(5.0));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["overview"]["totalEmissions"], 192.0);
        assert_eq!(json["ledger"]["balance"], 245.0);
        assert_eq!(json["overview"]["complianceChange"], 5.0);
    }

    #[test]
    fn test_platform_stats_span_every_company() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let config = AppConfig::default();

        let empty = PlatformStats::build(&store, &config).unwrap();
        assert_eq!(empty.registered_companies, 0);
        assert_eq!(empty.co2_tracked, 0.0);
        assert_eq!(empty.credits_traded, TradeVolume::default());

        let acme = Company::new("Acme Industries Ltd.", "Textiles", "Indore");
        let malwa = Company::new("Malwa Polymers", "Plastics", "Bhopal");
        store.insert_company(&acme).unwrap();
        store.insert_company(&malwa).unwrap();

        submit_emission(&mut store, &acme.id, &emission(date(2021, 2, 1), 120.0)).unwrap();
        submit_emission(&mut store, &malwa.id, &emission(date(2025, 5, 4), 80.0)).unwrap();
        let mut sox = emission(date(2025, 5, 5), 4.0);
        sox.pollutant = "SOx".to_string();
        submit_emission(&mut store, &malwa.id, &sox).unwrap();

        let ledger = config.ledger();
        let sold = ledger
            .record_transaction(&mut store, &acme.id, TransactionKind::Sale, 10.0, 2500.0, date(2025, 5, 1))
            .unwrap();
        ledger.settle(&mut store, &sold.id).unwrap();
        let bought = ledger
            .record_transaction(&mut store, &malwa.id, TransactionKind::Purchase, 10.0, 2500.0, date(2025, 5, 1))
            .unwrap();
        ledger.settle(&mut store, &bought.id).unwrap();
        // Pending trades have not happened yet
        ledger
            .record_transaction(&mut store, &malwa.id, TransactionKind::Purchase, 99.0, 2500.0, date(2025, 5, 2))
            .unwrap();

        let stats = PlatformStats::build(&store, &config).unwrap();
        assert_eq!(stats.registered_companies, 2);
        assert_eq!(stats.co2_tracked, 200.0);
        assert_eq!(stats.emissions_tracked, 204.0);
        assert_eq!(stats.credits_traded, TradeVolume { credits: 20.0, value: 50000.0 });
        assert_eq!(stats.currency, "INR");

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["registeredCompanies"], 2);
        assert_eq!(json["creditsTraded"]["value"], 50000.0);
    }

    #[test]
    fn test_snapshot_unknown_company() {
        let store = SqliteStore::open_in_memory().unwrap();
        let window = DateRange::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();

        assert!(matches!(
            DashboardSnapshot::build(&store, &AppConfig::default(), "ghost", &window),
            Err(CarbonError::NotFound { .. })
        ));
    }
}
