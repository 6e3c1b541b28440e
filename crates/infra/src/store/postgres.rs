//! Postgres-backed clinic store.
//!
//! A change set runs inside one transaction. Stock and cost writes are
//! compare-and-swap updates (`WHERE version = $expected`), so two commits that
//! read the same drug cannot both land. If any statement fails the
//! transaction is dropped, which rolls it back.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` unique violation | `Conflict` | duplicate id or code issued concurrently |
//! | `23503` foreign key violation | `NotFound` | referenced record is gone |
//! | anything else | `Backend` | connection, type or constraint failures |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use clinic_core::{ExpectedVersion, Money, RecordRef, UserId};
use clinic_inventory::{Drug, DrugId, LedgerEntryId, StockDirection, StockLedgerEntry};
use clinic_records::{
    CostBreakdown, DailyCode, Doctor, DoctorId, MedicalRecord, MedicalRecordId, PatientId,
    Prescription, PrescriptionId, PrescriptionLine, PrescriptionLineId,
};

use super::r#trait::{ChangeSet, ClinicStore, StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS doctors (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        consultation_fee BIGINT NOT NULL CHECK (consultation_fee >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS drugs (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        unit_price BIGINT NOT NULL CHECK (unit_price >= 0),
        stock BIGINT NOT NULL,
        minimum_stock BIGINT NOT NULL CHECK (minimum_stock >= 0),
        expires_on DATE,
        version BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS medical_records (
        id UUID PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        patient_id UUID NOT NULL,
        doctor_id UUID NOT NULL REFERENCES doctors (id),
        consultation_fee BIGINT NOT NULL,
        drug_cost BIGINT NOT NULL,
        total_cost BIGINT NOT NULL,
        created_by UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS prescriptions (
        id UUID PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        medical_record_id UUID NOT NULL REFERENCES medical_records (id),
        doctor_id UUID NOT NULL,
        created_by UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    // drug_id deliberately has no foreign key: drugs can be removed out of band.
    r#"
    CREATE TABLE IF NOT EXISTS prescription_lines (
        id UUID PRIMARY KEY,
        prescription_id UUID NOT NULL REFERENCES prescriptions (id) ON DELETE RESTRICT,
        drug_id UUID NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        unit_price BIGINT NOT NULL,
        created_by UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_ledger (
        position BIGSERIAL PRIMARY KEY,
        id UUID NOT NULL UNIQUE,
        drug_id UUID NOT NULL,
        direction TEXT NOT NULL CHECK (direction IN ('in', 'out', 'adjustment')),
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        stock_before BIGINT NOT NULL,
        stock_after BIGINT NOT NULL,
        reason TEXT NOT NULL,
        reference_kind TEXT,
        reference_id UUID,
        recorded_by UUID NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS stock_ledger_drug_idx ON stock_ledger (drug_id, position)",
];

/// Postgres-backed clinic store.
#[derive(Debug, Clone)]
pub struct PostgresClinicStore {
    pool: Arc<PgPool>,
}

impl PostgresClinicStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` and make sure the schema exists.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, changes),
        fields(
            drug_writes = changes.drug_writes.len(),
            record_writes = changes.record_writes.len(),
            ledger_entries = changes.ledger.len()
        ),
        err
    )]
    async fn commit_changes(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for doctor in &changes.new_doctors {
            sqlx::query("INSERT INTO doctors (id, name, consultation_fee) VALUES ($1, $2, $3)")
                .bind(doctor.id_typed().as_uuid())
                .bind(doctor.name())
                .bind(doctor.consultation_fee().amount())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_doctor", e))?;
        }

        for drug in &changes.new_drugs {
            sqlx::query(
                r#"
                INSERT INTO drugs (id, name, unit_price, stock, minimum_stock, expires_on, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(drug.id_typed().as_uuid())
            .bind(drug.name())
            .bind(drug.unit_price().amount())
            .bind(drug.stock())
            .bind(drug.minimum_stock())
            .bind(drug.expires_on())
            .bind(to_db_version(drug_version(drug))?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_drug", e))?;
        }

        for record in &changes.new_records {
            let costs = record.costs();
            sqlx::query(
                r#"
                INSERT INTO medical_records (
                    id, code, patient_id, doctor_id,
                    consultation_fee, drug_cost, total_cost,
                    created_by, created_at, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0)
                "#,
            )
            .bind(record.id_typed().as_uuid())
            .bind(record.code().to_string())
            .bind(record.patient_id().as_uuid())
            .bind(record.doctor_id().as_uuid())
            .bind(costs.consultation_fee.amount())
            .bind(costs.drug_cost.amount())
            .bind(costs.total.amount())
            .bind(record.created_by().as_uuid())
            .bind(record.created_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_medical_record", e))?;
        }

        for p in &changes.new_prescriptions {
            sqlx::query(
                r#"
                INSERT INTO prescriptions (id, code, medical_record_id, doctor_id, created_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(p.id.as_uuid())
            .bind(p.code.to_string())
            .bind(p.medical_record_id.as_uuid())
            .bind(p.doctor_id.as_uuid())
            .bind(p.created_by.as_uuid())
            .bind(p.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_prescription", e))?;
        }

        for id in &changes.removed_lines {
            let done = sqlx::query("DELETE FROM prescription_lines WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_line", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("prescription line {id}")));
            }
        }

        for id in &changes.removed_prescriptions {
            let done = sqlx::query("DELETE FROM prescriptions WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if sqlstate(&e).as_deref() == Some("23503") {
                        StoreError::Conflict(format!("prescription {id} still has lines"))
                    } else {
                        map_sqlx_error("delete_prescription", e)
                    }
                })?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("prescription {id}")));
            }
        }

        for line in &changes.new_lines {
            sqlx::query(
                r#"
                INSERT INTO prescription_lines (
                    id, prescription_id, drug_id, quantity, unit_price, created_by, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id_typed().as_uuid())
            .bind(line.prescription_id().as_uuid())
            .bind(line.drug_id().as_uuid())
            .bind(line.quantity())
            .bind(line.unit_price().amount())
            .bind(line.created_by().as_uuid())
            .bind(line.created_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_line", e))?;
        }

        for write in &changes.drug_writes {
            let id = write.value.id_typed();
            let done = sqlx::query(
                r#"
                UPDATE drugs
                SET stock = $2, version = version + 1
                WHERE id = $1 AND ($3::BIGINT IS NULL OR version = $3)
                "#,
            )
            .bind(id.as_uuid())
            .bind(write.value.stock())
            .bind(expected_param(write.expected)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_drug_stock", e))?;
            if done.rows_affected() == 0 {
                return Err(missing_or_stale(&mut tx, "drugs", *id.as_uuid(), write.expected).await);
            }
        }

        for write in &changes.record_writes {
            let id = write.value.id_typed();
            let costs = write.value.costs();
            let done = sqlx::query(
                r#"
                UPDATE medical_records
                SET consultation_fee = $2, drug_cost = $3, total_cost = $4, version = version + 1
                WHERE id = $1 AND ($5::BIGINT IS NULL OR version = $5)
                "#,
            )
            .bind(id.as_uuid())
            .bind(costs.consultation_fee.amount())
            .bind(costs.drug_cost.amount())
            .bind(costs.total.amount())
            .bind(expected_param(write.expected)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_record_costs", e))?;
            if done.rows_affected() == 0 {
                return Err(
                    missing_or_stale(&mut tx, "medical_records", *id.as_uuid(), write.expected).await,
                );
            }
        }

        for entry in &changes.ledger {
            sqlx::query(
                r#"
                INSERT INTO stock_ledger (
                    id, drug_id, direction, quantity, stock_before, stock_after,
                    reason, reference_kind, reference_id, recorded_by, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(entry.id_typed().as_uuid())
            .bind(entry.drug_id().as_uuid())
            .bind(entry.direction().as_str())
            .bind(entry.quantity())
            .bind(entry.stock_before())
            .bind(entry.stock_after())
            .bind(entry.reason())
            .bind(entry.reference().map(|r| r.kind.as_str()))
            .bind(entry.reference().map(|r| *r.id.as_uuid()))
            .bind(entry.recorded_by().as_uuid())
            .bind(entry.recorded_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("append_ledger", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ClinicStore for PostgresClinicStore {
    async fn get_drug(&self, id: DrugId) -> StoreResult<Option<Drug>> {
        let row = sqlx::query(
            "SELECT id, name, unit_price, stock, minimum_stock, expires_on, version FROM drugs WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_drug", e))?;
        row.as_ref().map(drug_from_row).transpose()
    }

    async fn list_drugs(&self) -> StoreResult<Vec<Drug>> {
        let rows = sqlx::query(
            "SELECT id, name, unit_price, stock, minimum_stock, expires_on, version FROM drugs ORDER BY name",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_drugs", e))?;
        rows.iter().map(drug_from_row).collect()
    }

    async fn remove_drug(&self, id: DrugId) -> StoreResult<()> {
        let done = sqlx::query("DELETE FROM drugs WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_drug", e))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("drug {id}")));
        }
        Ok(())
    }

    async fn get_doctor(&self, id: DoctorId) -> StoreResult<Option<Doctor>> {
        let row = sqlx::query("SELECT id, name, consultation_fee FROM doctors WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_doctor", e))?;
        row.map(|r| {
            Ok(Doctor::from_parts(
                DoctorId::from_uuid(get(&r, "id")?),
                get(&r, "name")?,
                Money::new(get(&r, "consultation_fee")?),
            ))
        })
        .transpose()
    }

    async fn get_medical_record(&self, id: MedicalRecordId) -> StoreResult<Option<MedicalRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, patient_id, doctor_id, consultation_fee, drug_cost, total_cost,
                   created_by, created_at, version
            FROM medical_records
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_medical_record", e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_prescription(&self, id: PrescriptionId) -> StoreResult<Option<Prescription>> {
        let row = sqlx::query(
            "SELECT id, code, medical_record_id, doctor_id, created_by, created_at FROM prescriptions WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_prescription", e))?;
        row.as_ref().map(prescription_from_row).transpose()
    }

    async fn list_prescriptions(&self, record: MedicalRecordId) -> StoreResult<Vec<Prescription>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, medical_record_id, doctor_id, created_by, created_at
            FROM prescriptions
            WHERE medical_record_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(record.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_prescriptions", e))?;
        rows.iter().map(prescription_from_row).collect()
    }

    async fn get_line(&self, id: PrescriptionLineId) -> StoreResult<Option<PrescriptionLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, prescription_id, drug_id, quantity, unit_price, created_by, created_at
            FROM prescription_lines
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_line", e))?;
        row.as_ref().map(line_from_row).transpose()
    }

    async fn list_lines(&self, prescription: PrescriptionId) -> StoreResult<Vec<PrescriptionLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, prescription_id, drug_id, quantity, unit_price, created_by, created_at
            FROM prescription_lines
            WHERE prescription_id = $1
            ORDER BY id
            "#,
        )
        .bind(prescription.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_lines", e))?;
        rows.iter().map(line_from_row).collect()
    }

    async fn list_lines_for_record(&self, record: MedicalRecordId) -> StoreResult<Vec<PrescriptionLine>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.prescription_id, l.drug_id, l.quantity, l.unit_price, l.created_by, l.created_at
            FROM prescription_lines l
            JOIN prescriptions p ON p.id = l.prescription_id
            WHERE p.medical_record_id = $1
            ORDER BY l.id
            "#,
        )
        .bind(record.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_lines_for_record", e))?;
        rows.iter().map(line_from_row).collect()
    }

    async fn latest_code(&self, prefix: &str, date: NaiveDate) -> StoreResult<Option<DailyCode>> {
        let pattern = code_pattern(prefix, date);
        let rows = sqlx::query(
            r#"
            SELECT code FROM prescriptions WHERE code LIKE $1
            UNION ALL
            SELECT code FROM medical_records WHERE code LIKE $1
            "#,
        )
        .bind(&pattern)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_code", e))?;

        let codes = rows
            .iter()
            .map(|row| get::<String>(row, "code"))
            .collect::<StoreResult<Vec<_>>>()?;
        latest_of(prefix, codes)
    }

    async fn ledger_for_drug(&self, id: DrugId) -> StoreResult<Vec<StockLedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, drug_id, direction, quantity, stock_before, stock_after,
                   reason, reference_kind, reference_id, recorded_by, recorded_at
            FROM stock_ledger
            WHERE drug_id = $1
            ORDER BY position
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_for_drug", e))?;
        rows.iter().map(ledger_from_row).collect()
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        self.commit_changes(changes).await
    }
}

async fn missing_or_stale(
    tx: &mut Transaction<'_, Postgres>,
    table: &'static str,
    id: Uuid,
    expected: ExpectedVersion,
) -> StoreError {
    // Table names come from the fixed set above, never from input.
    let sql = format!("SELECT version FROM {table} WHERE id = $1");
    match sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await {
        Ok(Some(row)) => match row.try_get::<i64, _>("version") {
            Ok(found) => {
                StoreError::Conflict(format!("{table} {id}: expected {expected:?}, found {found}"))
            }
            Err(e) => StoreError::Backend(format!("failed to read {table} {id} version: {e}")),
        },
        Ok(None) => StoreError::NotFound(format!("{table} {id}")),
        Err(e) => map_sqlx_error("check_version", e),
    }
}

fn drug_version(drug: &Drug) -> u64 {
    clinic_core::AggregateRoot::version(drug)
}

fn expected_param(expected: ExpectedVersion) -> StoreResult<Option<i64>> {
    match expected {
        ExpectedVersion::Any => Ok(None),
        ExpectedVersion::Exact(v) => to_db_version(v).map(Some),
    }
}

fn to_db_version(version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::Backend(format!("version {version} out of range")))
}

fn from_db_version(version: i64) -> StoreResult<u64> {
    u64::try_from(version).map_err(|_| StoreError::Backend(format!("negative version {version}")))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read column {column}: {e}")))
}

/// `LIKE` pattern matching every code issued under `prefix` on `date`.
fn code_pattern(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}-{}-%", date.format("%Y%m%d"))
}

/// Highest-sequence code carrying exactly `prefix`; codes under any other
/// prefix are ignored.
fn latest_of(prefix: &str, codes: impl IntoIterator<Item = String>) -> StoreResult<Option<DailyCode>> {
    let mut latest: Option<DailyCode> = None;
    for raw in codes {
        let code = parse_code(raw)?;
        if code.prefix() == prefix && latest.as_ref().is_none_or(|l| code.seq() > l.seq()) {
            latest = Some(code);
        }
    }
    Ok(latest)
}

fn parse_code(raw: String) -> StoreResult<DailyCode> {
    raw.parse()
        .map_err(|e| StoreError::Backend(format!("stored code '{raw}' is malformed: {e}")))
}

fn drug_from_row(row: &PgRow) -> StoreResult<Drug> {
    Ok(Drug::from_parts(
        DrugId::from_uuid(get(row, "id")?),
        get(row, "name")?,
        Money::new(get(row, "unit_price")?),
        get(row, "stock")?,
        get(row, "minimum_stock")?,
        get::<Option<NaiveDate>>(row, "expires_on")?,
        from_db_version(get(row, "version")?)?,
    ))
}

fn record_from_row(row: &PgRow) -> StoreResult<MedicalRecord> {
    Ok(MedicalRecord::from_parts(
        MedicalRecordId::from_uuid(get(row, "id")?),
        parse_code(get(row, "code")?)?,
        PatientId::from_uuid(get(row, "patient_id")?),
        DoctorId::from_uuid(get(row, "doctor_id")?),
        CostBreakdown {
            consultation_fee: Money::new(get(row, "consultation_fee")?),
            drug_cost: Money::new(get(row, "drug_cost")?),
            total: Money::new(get(row, "total_cost")?),
        },
        UserId::from_uuid(get(row, "created_by")?),
        get::<DateTime<Utc>>(row, "created_at")?,
        from_db_version(get(row, "version")?)?,
    ))
}

fn prescription_from_row(row: &PgRow) -> StoreResult<Prescription> {
    Ok(Prescription {
        id: PrescriptionId::from_uuid(get(row, "id")?),
        code: parse_code(get(row, "code")?)?,
        medical_record_id: MedicalRecordId::from_uuid(get(row, "medical_record_id")?),
        doctor_id: DoctorId::from_uuid(get(row, "doctor_id")?),
        created_by: UserId::from_uuid(get(row, "created_by")?),
        created_at: get(row, "created_at")?,
    })
}

fn line_from_row(row: &PgRow) -> StoreResult<PrescriptionLine> {
    Ok(PrescriptionLine::from_parts(
        PrescriptionLineId::from_uuid(get(row, "id")?),
        PrescriptionId::from_uuid(get(row, "prescription_id")?),
        DrugId::from_uuid(get(row, "drug_id")?),
        get(row, "quantity")?,
        Money::new(get(row, "unit_price")?),
        UserId::from_uuid(get(row, "created_by")?),
        get(row, "created_at")?,
    ))
}

fn ledger_from_row(row: &PgRow) -> StoreResult<StockLedgerEntry> {
    let direction: String = get(row, "direction")?;
    let direction: StockDirection = direction
        .parse()
        .map_err(|e| StoreError::Backend(format!("stored ledger direction: {e}")))?;

    let reference = match (
        get::<Option<String>>(row, "reference_kind")?,
        get::<Option<Uuid>>(row, "reference_id")?,
    ) {
        (Some(kind), Some(id)) => Some(RecordRef::new(kind, id)),
        _ => None,
    };

    Ok(StockLedgerEntry::from_parts(
        LedgerEntryId::from_uuid(get(row, "id")?),
        DrugId::from_uuid(get(row, "drug_id")?),
        direction,
        get(row, "quantity")?,
        get(row, "stock_before")?,
        get(row, "stock_after")?,
        get(row, "reason")?,
        reference,
        UserId::from_uuid(get(row, "recorded_by")?),
        get(row, "recorded_at")?,
    ))
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match sqlstate(&err).as_deref() {
        Some("23505") => StoreError::Conflict(format!("{operation}: {err}")),
        Some("23503") => StoreError::NotFound(format!("{operation}: {err}")),
        _ => StoreError::Backend(format!("{operation}: {err}")),
    }
}
