// 💱 Carbon Credit Ledger - purchases, sales, offsets and the running balance
//
// balance = Σ completed purchases + Σ completed offsets - Σ completed sales
//
// Transactions start Pending and move once, to Completed or Cancelled.
// Pending and cancelled transactions never touch the balance.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CarbonError, Result};
use crate::models::{CreditTransaction, DateRange, TransactionKind, TransactionStatus};
use crate::store::RecordStore;

// ============================================================================
// MARKET CONFIGURATION
// ============================================================================

/// Marketplace figures shown next to the balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub price_per_credit: f64,
    pub available_credits: f64,
    pub currency: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            price_per_credit: 2500.0,
            available_credits: 1250.0,
            currency: "INR".to_string(),
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.price_per_credit.is_finite() || self.price_per_credit < 0.0 {
            return Err(CarbonError::InvalidPrice(self.price_per_credit));
        }
        if !self.available_credits.is_finite() || self.available_credits < 0.0 {
            return Err(CarbonError::out_of_range(
                "market.available_credits",
                format!("{} must be zero or greater", self.available_credits),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub balance: f64,
    pub market_price: f64,
    pub available_credits: f64,
    pub currency: String,
    /// Credits still waiting on settlement, signed like the balance.
    pub pending_credits: f64,
}

/// Completed purchases and sales, the credits that actually changed hands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeVolume {
    pub credits: f64,
    pub value: f64,
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct CarbonLedger {
    market: MarketConfig,
}

impl CarbonLedger {
    pub fn new(market: MarketConfig) -> Self {
        CarbonLedger { market }
    }

    pub fn market(&self) -> &MarketConfig {
        &self.market
    }

    /// Create a pending transaction with `total = quantity × price_per_credit`.
    pub fn record_transaction<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        company_id: &str,
        kind: TransactionKind,
        quantity: f64,
        price_per_credit: f64,
        transaction_date: NaiveDate,
    ) -> Result<CreditTransaction> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(CarbonError::InvalidQuantity(quantity));
        }
        if !price_per_credit.is_finite() || price_per_credit < 0.0 {
            return Err(CarbonError::InvalidPrice(price_per_credit));
        }

        let transaction = CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            credits: quantity,
            kind,
            price_per_credit,
            total_amount: quantity * price_per_credit,
            transaction_date,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        };

        let stored = store.insert_transaction(&transaction)?;
        tracing::info!(
            company_id,
            transaction_id = %stored.id,
            kind = %stored.kind,
            credits = stored.credits,
            total = stored.total_amount,
            "recorded credit transaction"
        );

        Ok(stored)
    }

    /// pending → completed
    pub fn settle<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        transaction_id: &str,
    ) -> Result<CreditTransaction> {
        self.transition(store, transaction_id, TransactionStatus::Completed)
    }

    /// pending → cancelled
    pub fn cancel<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        transaction_id: &str,
    ) -> Result<CreditTransaction> {
        self.transition(store, transaction_id, TransactionStatus::Cancelled)
    }

    fn transition<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        transaction_id: &str,
        target: TransactionStatus,
    ) -> Result<CreditTransaction> {
        let current = store.get_transaction(transaction_id)?;

        if let Err(e) = current.status.transition_to(target) {
            tracing::warn!(
                transaction_id,
                from = %current.status,
                to = %target,
                "rejected credit transaction transition"
            );
            return Err(e);
        }

        // The store re-checks the status under its write lock
        let updated = store.update_transaction_status(transaction_id, current.status, target)?;
        tracing::info!(
            transaction_id,
            company_id = %updated.company_id,
            status = %updated.status,
            "credit transaction {}",
            target
        );

        Ok(updated)
    }

    pub fn balance<S: RecordStore + ?Sized>(&self, store: &S, company_id: &str) -> Result<f64> {
        store.get_company(company_id)?;
        Ok(balance_of(&store.list_transactions(company_id)?))
    }

    /// All transactions for a company, newest first.
    pub fn history<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        company_id: &str,
    ) -> Result<Vec<CreditTransaction>> {
        store.get_company(company_id)?;
        store.list_transactions(company_id)
    }

    /// Balance movement across `window`; see `balance_change_percent`.
    pub fn balance_change<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        company_id: &str,
        window: &DateRange,
    ) -> Result<Option<f64>> {
        let transactions = self.history(store, company_id)?;
        Ok(balance_change_percent(&transactions, window))
    }

    pub fn summary<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        company_id: &str,
    ) -> Result<LedgerSummary> {
        let transactions = self.history(store, company_id)?;

        let pending_credits = transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .map(|tx| tx.kind.sign() * tx.credits)
            .sum();

        Ok(LedgerSummary {
            balance: balance_of(&transactions),
            market_price: self.market.price_per_credit,
            available_credits: self.market.available_credits,
            currency: self.market.currency.clone(),
            pending_credits,
        })
    }
}

impl Default for CarbonLedger {
    fn default() -> Self {
        Self::new(MarketConfig::default())
    }
}

/// Signed sum of completed transactions.
pub fn balance_of(transactions: &[CreditTransaction]) -> f64 {
    transactions.iter().map(|tx| tx.balance_effect()).sum()
}

/// Balance of completed transactions dated on or before `date`.
pub fn balance_as_of(transactions: &[CreditTransaction], date: NaiveDate) -> f64 {
    transactions
        .iter()
        .filter(|tx| tx.transaction_date <= date)
        .map(|tx| tx.balance_effect())
        .sum()
}

/// Percent change from the opening balance (before `window.start`) to the
/// closing balance (at `window.end`). None when the opening balance is zero.
pub fn balance_change_percent(transactions: &[CreditTransaction], window: &DateRange) -> Option<f64> {
    let opening: f64 = transactions
        .iter()
        .filter(|tx| tx.transaction_date < window.start)
        .map(|tx| tx.balance_effect())
        .sum();
    if opening == 0.0 {
        return None;
    }

    let closing = balance_as_of(transactions, window.end);
    Some((closing - opening) / opening.abs() * 100.0)
}

pub fn trade_volume(transactions: &[CreditTransaction]) -> TradeVolume {
    transactions
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed && tx.kind != TransactionKind::Offset)
        .fold(TradeVolume::default(), |acc, tx| TradeVolume {
            credits: acc.credits + tx.credits,
            value: acc.value + tx.total_amount,
        })
}

// ============================================================================
// TESTS
// ============================================================================
