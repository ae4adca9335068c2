// 🏭 Domain Model - companies, emissions, credit transactions, assessments
//
// Records are values: an emission is never mutated after ingestion, an
// assessment is never overwritten. The only mutable field in the model is
// CreditTransaction::status, and it only moves out of Pending.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{CarbonError, Result};

// ============================================================================
// COMPANY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub industry: String,
    pub location: String,
    #[serde(default)]
    pub registration_number: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: String,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn new(name: &str, industry: &str, location: &str) -> Self {
        Company {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            industry: industry.to_string(),
            location: location.to_string(),
            registration_number: String::new(),
            contact_email: String::new(),
            contact_phone: String::new(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// POLLUTANTS & UNITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PollutantKind {
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "NOx")]
    Nox,
    #[serde(rename = "SOx")]
    Sox,
    #[serde(rename = "PM")]
    Pm,
    #[serde(rename = "CH4")]
    Ch4,
    Other,
}

impl PollutantKind {
    /// Every tracked kind, in reporting order.
    pub const ALL: [PollutantKind; 6] = [
        PollutantKind::Co2,
        PollutantKind::Nox,
        PollutantKind::Sox,
        PollutantKind::Pm,
        PollutantKind::Ch4,
        PollutantKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PollutantKind::Co2 => "CO2",
            PollutantKind::Nox => "NOx",
            PollutantKind::Sox => "SOx",
            PollutantKind::Pm => "PM",
            PollutantKind::Ch4 => "CH4",
            PollutantKind::Other => "Other",
        }
    }
}

impl fmt::Display for PollutantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PollutantKind {
    type Err = CarbonError;

    fn from_str(s: &str) -> Result<Self> {
        // The entry form labels carbon dioxide with a subscript two
        let normalized = s.trim().replace('₂', "2").replace('₄', "4").to_lowercase();

        match normalized.as_str() {
            "co2" => Ok(PollutantKind::Co2),
            "nox" => Ok(PollutantKind::Nox),
            "sox" => Ok(PollutantKind::Sox),
            "pm" => Ok(PollutantKind::Pm),
            "ch4" => Ok(PollutantKind::Ch4),
            "other" => Ok(PollutantKind::Other),
            _ => Err(CarbonError::UnknownPollutant(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MassUnit {
    #[serde(rename = "t")]
    Tonnes,
    #[serde(rename = "kg")]
    Kilograms,
}

impl MassUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MassUnit::Tonnes => "t",
            MassUnit::Kilograms => "kg",
        }
    }

    pub fn to_tonnes(&self, amount: f64) -> f64 {
        match self {
            MassUnit::Tonnes => amount,
            MassUnit::Kilograms => amount / 1000.0,
        }
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MassUnit {
    type Err = CarbonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "t" | "ton" | "tons" | "tonne" | "tonnes" => Ok(MassUnit::Tonnes),
            "kg" | "kgs" | "kilogram" | "kilograms" => Ok(MassUnit::Kilograms),
            _ => Err(CarbonError::UnknownUnit(s.to_string())),
        }
    }
}

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(CarbonError::InvalidDateRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date with a four-digit year, for platform-wide totals.
    pub fn all_time() -> Result<Self> {
        match (NaiveDate::from_ymd_opt(1, 1, 1), NaiveDate::from_ymd_opt(9999, 12, 31)) {
            (Some(start), Some(end)) => DateRange::new(start, end),
            _ => Err(CarbonError::out_of_range("date range", "calendar bounds unavailable")),
        }
    }

    /// `months` whole calendar months ending with the month of `end`:
    /// trailing_months(2025-06-15, 6) is 2025-01-01..=2025-06-15.
    pub fn trailing_months(end: NaiveDate, months: u32) -> Result<Self> {
        if months == 0 {
            return Err(CarbonError::out_of_range("months", "must be at least 1"));
        }

        let start = end
            .with_day(1)
            .and_then(|first| first.checked_sub_months(Months::new(months - 1)))
            .ok_or_else(|| {
                CarbonError::out_of_range("months", format!("{} months before {} is out of range", months, end))
            })?;

        DateRange::new(start, end)
    }
}

// ============================================================================
// EMISSIONS
// ============================================================================

/// Raw emission input as it arrives from a form, CSV row, or API body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionSubmission {
    pub date: NaiveDate,
    pub pollutant: String,
    pub amount: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_unit() -> String {
    "t".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub id: String,
    pub company_id: String,
    pub pollutant: PollutantKind,
    pub amount: f64,
    pub unit: MassUnit,
    pub measurement_date: NaiveDate,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Natural key of the row this record was imported from ("<file>:<line>").
    /// Only bulk imports carry one; it is folded into the idempotency hash.
    #[serde(skip)]
    pub import_key: Option<String>,
}

impl EmissionRecord {
    /// Validate a submission into a record. Unknown pollutants and units are
    /// rejected here, so the aggregator never sees them.
    pub fn from_submission(company_id: &str, submission: &EmissionSubmission) -> Result<Self> {
        let pollutant: PollutantKind = submission.pollutant.parse()?;
        // An empty unit cell means tonnes, same as a missing unit column
        let unit = match submission.unit.trim() {
            "" => MassUnit::Tonnes,
            raw => raw.parse()?,
        };

        if !submission.amount.is_finite() || submission.amount < 0.0 {
            return Err(CarbonError::InvalidAmount(submission.amount));
        }

        Ok(EmissionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            pollutant,
            amount: submission.amount,
            unit,
            measurement_date: submission.date,
            source: submission.source.trim().to_string(),
            notes: submission
                .notes
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: Utc::now(),
            import_key: None,
        })
    }

    pub fn with_import_key(mut self, key: impl Into<String>) -> Self {
        self.import_key = Some(key.into());
        self
    }

    pub fn amount_in_tonnes(&self) -> f64 {
        self.unit.to_tonnes(self.amount)
    }

    /// Hash stored under the UNIQUE idempotency column.
    ///
    /// An imported row hashes its import key together with its content, so
    /// re-importing the same file is skipped while two rows that happen to
    /// carry the same reading both count. A record without an import key is
    /// a fresh submission and hashes its own id, so it never collides.
    pub fn idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.import_key {
            Some(key) => hasher.update(format!(
                "{}|{}|{}|{}|{}|{}|{}|{}",
                self.company_id,
                key,
                self.pollutant,
                self.amount,
                self.unit,
                self.measurement_date,
                self.source,
                self.notes.as_deref().unwrap_or("")
            )),
            None => hasher.update(format!("{}|{}", self.company_id, self.id)),
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// CARBON CREDITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Purchase,
    Sale,
    Offset,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Sale => "sale",
            TransactionKind::Offset => "offset",
        }
    }

    /// Direction this kind moves the credit balance once completed.
    pub fn sign(&self) -> f64 {
        match self {
            TransactionKind::Purchase | TransactionKind::Offset => 1.0,
            TransactionKind::Sale => -1.0,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "purchase" | "buy" => Ok(TransactionKind::Purchase),
            "sale" | "sell" => Ok(TransactionKind::Sale),
            "offset" => Ok(TransactionKind::Offset),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// pending -> {completed, cancelled}; nothing leaves a terminal state.
    pub fn transition_to(self, target: TransactionStatus) -> Result<TransactionStatus> {
        match (self, target) {
            (TransactionStatus::Pending, TransactionStatus::Completed)
            | (TransactionStatus::Pending, TransactionStatus::Cancelled) => Ok(target),
            (from, to) => Err(CarbonError::InvalidStateTransition { from, to }),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub company_id: String,
    pub credits: f64,
    pub kind: TransactionKind,
    pub price_per_credit: f64,
    pub total_amount: f64,
    pub transaction_date: NaiveDate,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Signed effect on the balance, zero unless completed.
    pub fn balance_effect(&self) -> f64 {
        if self.status == TransactionStatus::Completed {
            self.kind.sign() * self.credits
        } else {
            0.0
        }
    }
}

// ============================================================================
// SAC RATING ASSESSMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub knowledge: f64,
    pub compliance: f64,
    pub reduction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingAssessment {
    pub id: String,
    pub company_id: String,
    pub knowledge_score: f64,
    pub compliance_score: f64,
    pub reduction_score: f64,
    pub overall_score: f64,
    pub grade: String,
    pub assessment_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RatingAssessment {
    pub fn sub_scores(&self) -> SubScores {
        SubScores {
            knowledge: self.knowledge_score,
            compliance: self.compliance_score,
            reduction: self.reduction_score,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
