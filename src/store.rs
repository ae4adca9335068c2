// Record Store - the query/insert surface the engines consume
//
// The aggregator, ledger, and rating engine only talk to this trait. The
// SQLite implementation lives in db.rs; anything else that can honour these
// contracts (serialized writes, compare-and-set status updates) can stand in.

use crate::db::Event;
use crate::error::Result;
use crate::models::{
    Company, CreditTransaction, DateRange, EmissionRecord, RatingAssessment, TransactionStatus,
};

pub trait RecordStore {
    // Companies
    fn insert_company(&mut self, company: &Company) -> Result<Company>;

    /// Fails with `NotFound` when the company does not exist.
    fn get_company(&self, company_id: &str) -> Result<Company>;

    fn list_companies(&self) -> Result<Vec<Company>>;

    // Emissions
    /// Records for one company whose measurement date falls inside `range`,
    /// oldest first.
    fn list_emissions(&self, company_id: &str, range: &DateRange) -> Result<Vec<EmissionRecord>>;

    /// Fails with `NotFound` for an unknown company and `Duplicate` when a
    /// record with the same idempotency hash is already stored (a re-imported
    /// CSV row; see `EmissionRecord::idempotency_hash`).
    fn insert_emission(&mut self, record: &EmissionRecord) -> Result<EmissionRecord>;

    // Credit transactions
    /// All transactions for one company, newest first.
    fn list_transactions(&self, company_id: &str) -> Result<Vec<CreditTransaction>>;

    fn get_transaction(&self, transaction_id: &str) -> Result<CreditTransaction>;

    fn insert_transaction(&mut self, transaction: &CreditTransaction) -> Result<CreditTransaction>;

    /// Compare-and-set: moves the transaction from `from` to `to` only if it is
    /// still in `from`. Fails with `InvalidStateTransition` when another
    /// writer got there first.
    fn update_transaction_status(
        &mut self,
        transaction_id: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<CreditTransaction>;

    // Rating assessments
    /// Assessment history for one company, oldest first.
    fn list_assessments(&self, company_id: &str) -> Result<Vec<RatingAssessment>>;

    /// Every assessment for every company registered in `location`.
    fn list_assessments_in_location(&self, location: &str) -> Result<Vec<RatingAssessment>>;

    fn insert_assessment(&mut self, assessment: &RatingAssessment) -> Result<RatingAssessment>;

    // Audit trail
    fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>>;
}
