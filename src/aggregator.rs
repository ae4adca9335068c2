// 📊 Emissions Aggregator - raw measurements → per-period, per-pollutant totals
//
// Reduction only: sum within each (period, pollutant) cell, no interpolation,
// no smoothing. Every period in the window gets a bucket and every bucket
// carries every pollutant kind, so trend charts never have gaps.
// All totals are reported in tonnes.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Result;
use crate::models::{DateRange, EmissionRecord, PollutantKind};
use crate::store::RecordStore;

// ============================================================================
// PERIODS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "month" => Ok(Granularity::Monthly),
            "quarterly" | "quarter" => Ok(Granularity::Quarterly),
            "yearly" | "year" | "annual" => Ok(Granularity::Yearly),
            other => Err(format!("unknown granularity: {}", other)),
        }
    }
}

/// A calendar-aligned bucket, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Granularity {
    /// Span of months covered by one period.
    fn months(&self) -> u32 {
        match self {
            Granularity::Monthly => 1,
            Granularity::Quarterly => 3,
            Granularity::Yearly => 12,
        }
    }

    /// The period that contains `date`.
    pub fn period_containing(&self, date: NaiveDate) -> Option<Period> {
        let span = self.months();
        let first_month = (date.month0() / span) * span + 1;
        let start = NaiveDate::from_ymd_opt(date.year(), first_month, 1)?;

        let (next_year, next_month) = if first_month + span > 12 {
            (date.year() + 1, first_month + span - 12)
        } else {
            (date.year(), first_month + span)
        };
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;

        let label = match self {
            Granularity::Monthly => start.format("%Y-%m").to_string(),
            Granularity::Quarterly => format!("{}-Q{}", start.year(), date.month0() / 3 + 1),
            Granularity::Yearly => start.year().to_string(),
        };

        Some(Period { label, start, end })
    }

    /// Every period overlapping the window, in order.
    pub fn periods(&self, window: &DateRange) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut cursor = Some(window.start);

        while let Some(date) = cursor.filter(|d| *d <= window.end) {
            match self.period_containing(date) {
                Some(period) => {
                    cursor = period.end.succ_opt();
                    periods.push(period);
                }
                None => break,
            }
        }

        periods
    }
}

// ============================================================================
// SUMMARY TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantTotal {
    pub pollutant: PollutantKind,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBucket {
    pub period: Period,
    /// One entry per pollutant kind, in `PollutantKind::ALL` order.
    pub totals: Vec<PollutantTotal>,
    pub total: f64,
}

impl PeriodBucket {
    fn empty(period: Period) -> Self {
        PeriodBucket {
            period,
            totals: PollutantKind::ALL
                .iter()
                .map(|&pollutant| PollutantTotal {
                    pollutant,
                    total: 0.0,
                })
                .collect(),
            total: 0.0,
        }
    }

    fn add(&mut self, pollutant: PollutantKind, tonnes: f64) {
        if let Some(cell) = self.totals.iter_mut().find(|t| t.pollutant == pollutant) {
            cell.total += tonnes;
        }
        self.total += tonnes;
    }

    pub fn get(&self, pollutant: PollutantKind) -> f64 {
        self.totals
            .iter()
            .find(|t| t.pollutant == pollutant)
            .map(|t| t.total)
            .unwrap_or(0.0)
    }
}

/// One row of the trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub pollutant: PollutantKind,
    pub total: f64,
}

/// One slice of the distribution chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSlice {
    pub pollutant: PollutantKind,
    pub total: f64,
    /// Fraction of the window's grand total, 0.0 when nothing was emitted.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsSummary {
    pub window: DateRange,
    pub granularity: Granularity,
    pub buckets: Vec<PeriodBucket>,
    pub distribution: Vec<DistributionSlice>,
    pub total: f64,
}

impl EmissionsSummary {
    pub fn trend_points(&self) -> Vec<TrendPoint> {
        self.buckets
            .iter()
            .flat_map(|bucket| {
                bucket.totals.iter().map(move |cell| TrendPoint {
                    period: bucket.period.label.clone(),
                    pollutant: cell.pollutant,
                    total: cell.total,
                })
            })
            .collect()
    }

    pub fn total_for(&self, pollutant: PollutantKind) -> f64 {
        self.distribution
            .iter()
            .find(|slice| slice.pollutant == pollutant)
            .map(|slice| slice.total)
            .unwrap_or(0.0)
    }

    /// Percent change of the last bucket against the one before it.
    /// None when there is no previous bucket or it is empty.
    pub fn period_change_percent(&self) -> Option<f64> {
        let [.., previous, last] = self.buckets.as_slice() else {
            return None;
        };

        if previous.total == 0.0 {
            return None;
        }

        Some((last.total - previous.total) / previous.total * 100.0)
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct EmissionsAggregator {
    pub granularity: Granularity,
}

impl EmissionsAggregator {
    pub fn new() -> Self {
        EmissionsAggregator {
            granularity: Granularity::Monthly,
        }
    }

    pub fn with_granularity(granularity: Granularity) -> Self {
        EmissionsAggregator { granularity }
    }

    /// Fetch one company's records for the window and reduce them.
    pub fn summarize<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        company_id: &str,
        window: &DateRange,
    ) -> Result<EmissionsSummary> {
        // Surface NotFound instead of an all-zero summary
        store.get_company(company_id)?;

        let records = store.list_emissions(company_id, window)?;
        tracing::debug!(
            company_id,
            records = records.len(),
            granularity = ?self.granularity,
            "aggregating emissions"
        );

        Ok(self.aggregate(&records, window))
    }

    /// Pure reduction of `records` into buckets. Records outside the window
    /// are ignored.
    pub fn aggregate(&self, records: &[EmissionRecord], window: &DateRange) -> EmissionsSummary {
        let mut buckets: Vec<PeriodBucket> = self
            .granularity
            .periods(window)
            .into_iter()
            .map(PeriodBucket::empty)
            .collect();

        for record in records
            .iter()
            .filter(|r| window.contains(r.measurement_date))
        {
            let idx = buckets.partition_point(|b| b.period.end < record.measurement_date);
            if let Some(bucket) = buckets.get_mut(idx) {
                bucket.add(record.pollutant, record.amount_in_tonnes());
            }
        }

        let total: f64 = buckets.iter().map(|b| b.total).sum();

        let distribution = PollutantKind::ALL
            .iter()
            .map(|&pollutant| {
                let pollutant_total: f64 = buckets.iter().map(|b| b.get(pollutant)).sum();
                DistributionSlice {
                    pollutant,
                    total: pollutant_total,
                    share: if total > 0.0 {
                        pollutant_total / total
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        EmissionsSummary {
            window: *window,
            granularity: self.granularity,
            buckets,
            distribution,
            total,
        }
    }
}

impl Default for EmissionsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Tonnes per pollutant over every record given, with no period bucketing.
/// One entry per kind, in `PollutantKind::ALL` order.
pub fn pollutant_totals(records: &[EmissionRecord]) -> Vec<PollutantTotal> {
    PollutantKind::ALL
        .iter()
        .map(|&pollutant| PollutantTotal {
            pollutant,
            total: records
                .iter()
                .filter(|r| r.pollutant == pollutant)
                .map(|r| r.amount_in_tonnes())
                .sum(),
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
