use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{CarbonError, Result};
use crate::models::{
    Company, CreditTransaction, DateRange, EmissionRecord, RatingAssessment, TransactionStatus,
};
use crate::store::RecordStore;

/// Actor recorded on audit events written by the store itself.
const STORE_ACTOR: &str = "carbon-audit";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Event for audit trail - every write to the store leaves one behind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Companies
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            industry TEXT NOT NULL,
            location TEXT NOT NULL,
            registration_number TEXT NOT NULL DEFAULT '',
            contact_email TEXT NOT NULL DEFAULT '',
            contact_phone TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Emissions (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS emissions (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            pollutant_type TEXT NOT NULL
                CHECK (pollutant_type IN ('CO2', 'NOx', 'SOx', 'PM', 'CH4', 'Other')),
            amount REAL NOT NULL CHECK (amount >= 0),
            unit TEXT NOT NULL,
            measurement_date TEXT NOT NULL,
            source TEXT NOT NULL,
            notes TEXT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Carbon credit transactions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS carbon_credits (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            credits REAL NOT NULL CHECK (credits > 0),
            transaction_type TEXT NOT NULL
                CHECK (transaction_type IN ('purchase', 'sale', 'offset')),
            price_per_credit REAL NOT NULL CHECK (price_per_credit >= 0),
            total_amount REAL NOT NULL,
            transaction_date TEXT NOT NULL,
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'completed', 'cancelled')),
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // SAC rating assessments (history, never overwritten)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sac_ratings (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            overall_score REAL NOT NULL,
            pollutant_knowledge_score REAL NOT NULL,
            compliance_score REAL NOT NULL,
            reduction_efforts_score REAL NOT NULL,
            rating_grade TEXT NOT NULL,
            assessment_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_emissions_company_date
         ON emissions(company_id, measurement_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_credits_company ON carbon_credits(company_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ratings_company ON sac_ratings(company_id, assessment_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_companies_location ON companies(location)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn parse_date(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    value.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

const COMPANY_COLUMNS: &str = "id, name, industry, location, registration_number,
    contact_email, contact_phone, created_at";

fn company_from_row(row: &Row) -> rusqlite::Result<Company> {
    let created_at: String = row.get(7)?;

    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        industry: row.get(2)?,
        location: row.get(3)?,
        registration_number: row.get(4)?,
        contact_email: row.get(5)?,
        contact_phone: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

const EMISSION_COLUMNS: &str = "id, company_id, pollutant_type, amount, unit,
    measurement_date, source, notes, created_at";

fn emission_from_row(row: &Row) -> rusqlite::Result<EmissionRecord> {
    let pollutant: String = row.get(2)?;
    let unit: String = row.get(4)?;
    let measurement_date: String = row.get(5)?;
    let created_at: String = row.get(8)?;

    Ok(EmissionRecord {
        id: row.get(0)?,
        company_id: row.get(1)?,
        pollutant: parse_column(2, &pollutant)?,
        amount: row.get(3)?,
        unit: parse_column(4, &unit)?,
        measurement_date: parse_date(5, &measurement_date)?,
        source: row.get(6)?,
        notes: row.get(7)?,
        created_at: parse_timestamp(8, &created_at)?,
        import_key: None,
    })
}

const TRANSACTION_COLUMNS: &str = "id, company_id, credits, transaction_type,
    price_per_credit, total_amount, transaction_date, status, created_at";

fn transaction_from_row(row: &Row) -> rusqlite::Result<CreditTransaction> {
    let kind: String = row.get(3)?;
    let transaction_date: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok(CreditTransaction {
        id: row.get(0)?,
        company_id: row.get(1)?,
        credits: row.get(2)?,
        kind: parse_column(3, &kind)?,
        price_per_credit: row.get(4)?,
        total_amount: row.get(5)?,
        transaction_date: parse_date(6, &transaction_date)?,
        status: parse_column(7, &status)?,
        created_at: parse_timestamp(8, &created_at)?,
    })
}

const ASSESSMENT_COLUMNS: &str = "r.id, r.company_id, r.pollutant_knowledge_score,
    r.compliance_score, r.reduction_efforts_score, r.overall_score, r.rating_grade,
    r.assessment_date, r.notes, r.created_at";

fn assessment_from_row(row: &Row) -> rusqlite::Result<RatingAssessment> {
    let assessment_date: String = row.get(7)?;
    let created_at: String = row.get(9)?;

    Ok(RatingAssessment {
        id: row.get(0)?,
        company_id: row.get(1)?,
        knowledge_score: row.get(2)?,
        compliance_score: row.get(3)?,
        reduction_score: row.get(4)?,
        overall_score: row.get(5)?,
        grade: row.get(6)?,
        assessment_date: parse_date(7, &assessment_date)?,
        notes: row.get(8)?,
        created_at: parse_timestamp(9, &created_at)?,
    })
}

fn company_exists(conn: &Connection, company_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM companies WHERE id = ?1",
            [company_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn load_transaction(conn: &Connection, transaction_id: &str) -> Result<CreditTransaction> {
    let sql = format!(
        "SELECT {} FROM carbon_credits WHERE id = ?1",
        TRANSACTION_COLUMNS
    );
    conn.query_row(&sql, [transaction_id], transaction_from_row)
        .optional()?
        .ok_or_else(|| CarbonError::not_found("credit transaction", transaction_id))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Record store backed by a single SQLite connection.
///
/// Every write runs in an IMMEDIATE transaction, which takes the database
/// write lock up front. Concurrent writers for the same company are therefore
/// serialized and a balance read never sees half of a write.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        tracing::debug!(path = %path.display(), "opened record store");
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordStore for SqliteStore {
    fn insert_company(&mut self, company: &Company) -> Result<Company> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO companies (
                id, name, industry, location, registration_number,
                contact_email, contact_phone, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                company.id,
                company.name,
                company.industry,
                company.location,
                company.registration_number,
                company.contact_email,
                company.contact_phone,
                company.created_at.to_rfc3339(),
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "company_registered",
                "company",
                &company.id,
                serde_json::json!({
                    "name": company.name,
                    "industry": company.industry,
                    "location": company.location,
                }),
                STORE_ACTOR,
            ),
        )?;

        tx.commit()?;
        Ok(company.clone())
    }

    fn get_company(&self, company_id: &str) -> Result<Company> {
        let sql = format!("SELECT {} FROM companies WHERE id = ?1", COMPANY_COLUMNS);
        self.conn
            .query_row(&sql, [company_id], company_from_row)
            .optional()?
            .ok_or_else(|| CarbonError::not_found("company", company_id))
    }

    fn list_companies(&self) -> Result<Vec<Company>> {
        let sql = format!("SELECT {} FROM companies ORDER BY name ASC", COMPANY_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let companies = stmt
            .query_map([], company_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(companies)
    }

    fn list_emissions(&self, company_id: &str, range: &DateRange) -> Result<Vec<EmissionRecord>> {
        let sql = format!(
            "SELECT {} FROM emissions
             WHERE company_id = ?1 AND measurement_date BETWEEN ?2 AND ?3
             ORDER BY measurement_date ASC, created_at ASC",
            EMISSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let records = stmt
            .query_map(
                params![company_id, format_date(range.start), format_date(range.end)],
                emission_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn insert_emission(&mut self, record: &EmissionRecord) -> Result<EmissionRecord> {
        let hash = record.idempotency_hash();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !company_exists(&tx, &record.company_id)? {
            return Err(CarbonError::not_found("company", &record.company_id));
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM emissions WHERE idempotency_hash = ?1",
                [&hash],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(CarbonError::Duplicate(hash));
        }

        tx.execute(
            "INSERT INTO emissions (
                id, company_id, pollutant_type, amount, unit, measurement_date,
                source, notes, idempotency_hash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.company_id,
                record.pollutant.as_str(),
                record.amount,
                record.unit.as_str(),
                format_date(record.measurement_date),
                record.source,
                record.notes,
                hash,
                record.created_at.to_rfc3339(),
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "emission_recorded",
                "emission",
                &record.id,
                serde_json::json!({
                    "company_id": record.company_id,
                    "pollutant": record.pollutant.as_str(),
                    "amount": record.amount,
                    "unit": record.unit.as_str(),
                }),
                STORE_ACTOR,
            ),
        )?;

        tx.commit()?;
        Ok(record.clone())
    }

    fn list_transactions(&self, company_id: &str) -> Result<Vec<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM carbon_credits
             WHERE company_id = ?1
             ORDER BY transaction_date DESC, created_at DESC",
            TRANSACTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let transactions = stmt
            .query_map([company_id], transaction_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    fn get_transaction(&self, transaction_id: &str) -> Result<CreditTransaction> {
        load_transaction(&self.conn, transaction_id)
    }

    fn insert_transaction(&mut self, transaction: &CreditTransaction) -> Result<CreditTransaction> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !company_exists(&tx, &transaction.company_id)? {
            return Err(CarbonError::not_found("company", &transaction.company_id));
        }

        tx.execute(
            "INSERT INTO carbon_credits (
                id, company_id, credits, transaction_type, price_per_credit,
                total_amount, transaction_date, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                transaction.id,
                transaction.company_id,
                transaction.credits,
                transaction.kind.as_str(),
                transaction.price_per_credit,
                transaction.total_amount,
                format_date(transaction.transaction_date),
                transaction.status.as_str(),
                transaction.created_at.to_rfc3339(),
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "credit_transaction_recorded",
                "credit_transaction",
                &transaction.id,
                serde_json::json!({
                    "company_id": transaction.company_id,
                    "kind": transaction.kind.as_str(),
                    "credits": transaction.credits,
                    "total_amount": transaction.total_amount,
                }),
                STORE_ACTOR,
            ),
        )?;

        tx.commit()?;
        Ok(transaction.clone())
    }

    fn update_transaction_status(
        &mut self,
        transaction_id: &str,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<CreditTransaction> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE carbon_credits SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                to.as_str(),
                Utc::now().to_rfc3339(),
                transaction_id,
                from.as_str()
            ],
        )?;

        if changed == 0 {
            // Either the row is missing or someone else moved it first
            let current = load_transaction(&tx, transaction_id)?;
            return Err(CarbonError::InvalidStateTransition {
                from: current.status,
                to,
            });
        }

        insert_event(
            &tx,
            &Event::new(
                &format!("credit_transaction_{}", to.as_str()),
                "credit_transaction",
                transaction_id,
                serde_json::json!({ "from": from.as_str(), "to": to.as_str() }),
                STORE_ACTOR,
            ),
        )?;

        let updated = load_transaction(&tx, transaction_id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn list_assessments(&self, company_id: &str) -> Result<Vec<RatingAssessment>> {
        let sql = format!(
            "SELECT {} FROM sac_ratings r
             WHERE r.company_id = ?1
             ORDER BY r.assessment_date ASC, r.created_at ASC",
            ASSESSMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let assessments = stmt
            .query_map([company_id], assessment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(assessments)
    }

    fn list_assessments_in_location(&self, location: &str) -> Result<Vec<RatingAssessment>> {
        let sql = format!(
            "SELECT {} FROM sac_ratings r
             JOIN companies c ON c.id = r.company_id
             WHERE c.location = ?1
             ORDER BY r.assessment_date ASC, r.created_at ASC",
            ASSESSMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let assessments = stmt
            .query_map([location], assessment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(assessments)
    }

    fn insert_assessment(&mut self, assessment: &RatingAssessment) -> Result<RatingAssessment> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !company_exists(&tx, &assessment.company_id)? {
            return Err(CarbonError::not_found("company", &assessment.company_id));
        }

        tx.execute(
            "INSERT INTO sac_ratings (
                id, company_id, overall_score, pollutant_knowledge_score,
                compliance_score, reduction_efforts_score, rating_grade,
                assessment_date, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                assessment.id,
                assessment.company_id,
                assessment.overall_score,
                assessment.knowledge_score,
                assessment.compliance_score,
                assessment.reduction_score,
                assessment.grade,
                format_date(assessment.assessment_date),
                assessment.notes,
                assessment.created_at.to_rfc3339(),
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "rating_assessed",
                "rating_assessment",
                &assessment.id,
                serde_json::json!({
                    "company_id": assessment.company_id,
                    "overall_score": assessment.overall_score,
                    "grade": assessment.grade,
                }),
                STORE_ACTOR,
            ),
        )?;

        tx.commit()?;
        Ok(assessment.clone())
    }

    fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, entity_type, entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmissionSubmission, PollutantKind, TransactionKind};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store_with_company() -> (SqliteStore, Company) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let company = Company::new("Acme Industries Ltd.", "Textiles", "Indore");
        store.insert_company(&company).unwrap();
        (store, company)
    }

    fn emission(company_id: &str, pollutant: &str, amount: f64, day: NaiveDate) -> EmissionRecord {
        EmissionRecord::from_submission(
            company_id,
            &EmissionSubmission {
                date: day,
                pollutant: pollutant.to_string(),
                amount,
                unit: "t".to_string(),
                source: "Kiln".to_string(),
                notes: Some("  ".to_string()),
            },
        )
        .unwrap()
    }

    fn pending_transaction(company_id: &str) -> CreditTransaction {
        CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            credits: 5.0,
            kind: TransactionKind::Purchase,
            price_per_credit: 2500.0,
            total_amount: 12500.0,
            transaction_date: date(2025, 3, 1),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_company_round_trip() {
        let (store, company) = store_with_company();

        let loaded = store.get_company(&company.id).unwrap();
        assert_eq!(loaded.name, "Acme Industries Ltd.");
        assert_eq!(loaded.location, "Indore");
        assert_eq!(store.list_companies().unwrap().len(), 1);

        assert!(matches!(
            store.get_company("missing"),
            Err(CarbonError::NotFound { entity: "company", .. })
        ));
    }

    #[test]
    fn test_emission_window_query() {
        let (mut store, company) = store_with_company();

        store
            .insert_emission(&emission(&company.id, "CO2", 40.0, date(2025, 1, 5)))
            .unwrap();
        store
            .insert_emission(&emission(&company.id, "NOx", 12.0, date(2025, 2, 5)))
            .unwrap();
        store
            .insert_emission(&emission(&company.id, "SOx", 7.0, date(2025, 6, 5)))
            .unwrap();

        let range = DateRange::new(date(2025, 1, 1), date(2025, 3, 31)).unwrap();
        let records = store.list_emissions(&company.id, &range).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pollutant, PollutantKind::Co2);
        assert_eq!(records[1].pollutant, PollutantKind::Nox);
        // Whitespace-only notes are dropped at ingestion
        assert_eq!(records[0].notes, None);
    }

    #[test]
    fn test_duplicate_emission_rejected() {
        let (mut store, company) = store_with_company();
        let first = emission(&company.id, "PM", 3.5, date(2025, 1, 9)).with_import_key("q1.csv:4");
        let again = emission(&company.id, "PM", 3.5, date(2025, 1, 9)).with_import_key("q1.csv:4");

        store.insert_emission(&first).unwrap();
        assert!(matches!(
            store.insert_emission(&again),
            Err(CarbonError::Duplicate(_))
        ));

        // The same reading submitted twice outside an import is two readings
        store
            .insert_emission(&emission(&company.id, "PM", 3.5, date(2025, 1, 9)))
            .unwrap();
        store
            .insert_emission(&emission(&company.id, "PM", 3.5, date(2025, 1, 9)))
            .unwrap();

        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        assert_eq!(store.list_emissions(&company.id, &range).unwrap().len(), 3);
    }

    #[test]
    fn test_writes_require_company() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        assert!(matches!(
            store.insert_emission(&emission("ghost", "CO2", 1.0, date(2025, 1, 1))),
            Err(CarbonError::NotFound { .. })
        ));
        assert!(matches!(
            store.insert_transaction(&pending_transaction("ghost")),
            Err(CarbonError::NotFound { .. })
        ));
    }

    #[test]
    fn test_status_compare_and_set() {
        let (mut store, company) = store_with_company();
        let tx = store
            .insert_transaction(&pending_transaction(&company.id))
            .unwrap();

        let settled = store
            .update_transaction_status(&tx.id, TransactionStatus::Pending, TransactionStatus::Completed)
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Completed);

        // A second writer still expecting Pending loses
        let err = store
            .update_transaction_status(&tx.id, TransactionStatus::Pending, TransactionStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(
            err,
            CarbonError::InvalidStateTransition {
                from: TransactionStatus::Completed,
                to: TransactionStatus::Cancelled,
            }
        ));

        assert!(matches!(
            store.update_transaction_status(
                "missing",
                TransactionStatus::Pending,
                TransactionStatus::Completed
            ),
            Err(CarbonError::NotFound { .. })
        ));
    }

    #[test]
    fn test_event_log() {
        let (mut store, company) = store_with_company();
        let tx = store
            .insert_transaction(&pending_transaction(&company.id))
            .unwrap();
        store
            .update_transaction_status(&tx.id, TransactionStatus::Pending, TransactionStatus::Cancelled)
            .unwrap();

        let events = store.events_for("credit_transaction", &tx.id).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "credit_transaction_recorded");
        assert_eq!(events[1].event_type, "credit_transaction_cancelled");
        assert_eq!(events[1].actor, STORE_ACTOR);
    }

    #[test]
    fn test_assessments_by_location() {
        let (mut store, indore) = store_with_company();
        let pune = Company::new("Deccan Castings", "Foundry", "Pune");
        store.insert_company(&pune).unwrap();

        for company in [&indore, &pune] {
            store
                .insert_assessment(&RatingAssessment {
                    id: uuid::Uuid::new_v4().to_string(),
                    company_id: company.id.clone(),
                    knowledge_score: 80.0,
                    compliance_score: 90.0,
                    reduction_score: 85.0,
                    overall_score: 85.0,
                    grade: "B+".to_string(),
                    assessment_date: date(2025, 3, 31),
                    notes: None,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        let in_indore = store.list_assessments_in_location("Indore").unwrap();
        assert_eq!(in_indore.len(), 1);
        assert_eq!(in_indore[0].company_id, indore.id);
        assert_eq!(store.list_assessments(&pune.id).unwrap().len(), 1);
    }
}
