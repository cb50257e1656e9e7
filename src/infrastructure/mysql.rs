use crate::config::DatabaseConfig;
use crate::domain::payment::{
    Amount, PaymentInvoice, PaymentRecord, PaymentState, RecordStatus, check_invoice_id,
};
use crate::domain::ports::{PaymentStore, QueryStore};
use crate::domain::topic::TopicQuery;
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlQueryResult, MySqlRow};
use sqlx::query::Query;
use sqlx::{Connection, MySql, MySqlConnection, Row};
use tracing::{debug, warn};

/// Table creation statements run by [`MySqlStore::ensure_schema`].
///
/// `payment_records.transaction_id` carries the unique key that backs the
/// at-most-one-record-per-invoice guarantee.
pub const SCHEMA: [&str; 3] = [
    r"
    CREATE TABLE IF NOT EXISTS relevance_queries (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        topic TEXT NOT NULL,
        ai_response TEXT NOT NULL,
        created_at DATETIME(6) NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS payment_invoices (
        invoice_id VARCHAR(64) PRIMARY KEY,
        payer_email VARCHAR(255) NOT NULL,
        payer_phone VARCHAR(32) NOT NULL,
        amount DECIMAL(12, 2) NOT NULL,
        currency CHAR(3) NOT NULL,
        state VARCHAR(16) NOT NULL,
        last_checked_at DATETIME(6) NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS payment_records (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        payer_email VARCHAR(255) NOT NULL,
        transaction_id VARCHAR(64) NOT NULL,
        amount DECIMAL(12, 2) NOT NULL,
        currency CHAR(3) NOT NULL,
        status VARCHAR(16) NOT NULL,
        recorded_at DATETIME(6) NOT NULL,
        UNIQUE KEY uq_payment_records_transaction (transaction_id)
    )
    ",
];

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

/// A relational store backed by MySQL.
///
/// No connection is shared: every operation opens its own connection, runs
/// inside it and closes it again whether the operation succeeded or not.
#[derive(Clone)]
pub struct MySqlStore {
    options: MySqlConnectOptions,
}

impl MySqlStore {
    /// Builds a store from the configured connection parameters, or `None`
    /// when any of them is missing.
    pub fn from_config(config: &DatabaseConfig) -> Option<Self> {
        let (host, name, user, password) = config.parts()?;
        let base = MySqlConnectOptions::new()
            .database(name)
            .username(user)
            .password(password);
        // DB_HOST may carry an explicit port as host:port.
        let explicit_port = host
            .rsplit_once(':')
            .and_then(|(h, p)| p.parse::<u16>().ok().map(|p| (h, p)));
        let options = match explicit_port {
            Some((h, port)) => base.host(h).port(port),
            None => base.host(host),
        };
        Some(Self { options })
    }

    /// Creates the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        let mut outcome = Ok(());
        for statement in SCHEMA {
            if let Err(e) = sqlx::query(statement).execute(&mut conn).await {
                outcome = Err(ServiceError::from(e));
                break;
            }
        }
        Self::release(conn).await;
        outcome
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        MySqlConnection::connect_with(&self.options)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("Database connection failed: {e}")))
    }

    async fn release(conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close database connection");
        }
    }

    async fn execute_in_transaction(
        conn: &mut MySqlConnection,
        query: MySqlQuery<'_>,
    ) -> std::result::Result<MySqlQueryResult, sqlx::Error> {
        let mut tx = conn.begin().await?;
        match query.execute(&mut *tx).await {
            Ok(done) => {
                tx.commit().await?;
                Ok(done)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn scoped_execute(
        &self,
        query: MySqlQuery<'_>,
    ) -> Result<std::result::Result<MySqlQueryResult, sqlx::Error>> {
        let mut conn = self.connect().await?;
        let result = Self::execute_in_transaction(&mut conn, query).await;
        Self::release(conn).await;
        Ok(result)
    }

    async fn scoped_write(&self, query: MySqlQuery<'_>) -> Result<MySqlQueryResult> {
        Ok(self.scoped_execute(query).await??)
    }

    /// Runs an insert. Returns `false` when a unique key already holds the
    /// row; every other database error is surfaced.
    async fn scoped_insert(&self, query: MySqlQuery<'_>) -> Result<bool> {
        match self.scoped_execute(query).await? {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn scoped_fetch_optional(&self, query: MySqlQuery<'_>) -> Result<Option<MySqlRow>> {
        let mut conn = self.connect().await?;
        let result = query.fetch_optional(&mut conn).await;
        Self::release(conn).await;
        Ok(result?)
    }

    async fn scoped_fetch_all(&self, query: MySqlQuery<'_>) -> Result<Vec<MySqlRow>> {
        let mut conn = self.connect().await?;
        let result = query.fetch_all(&mut conn).await;
        Self::release(conn).await;
        Ok(result?)
    }

    fn stored_amount(value: Decimal) -> Result<Amount> {
        Amount::new(value).map_err(|e| ServiceError::Persistence(format!("Stored amount: {e}")))
    }

    fn row_to_invoice(row: &MySqlRow) -> Result<PaymentInvoice> {
        let state: String = row.try_get("state")?;
        let currency: String = row.try_get("currency")?;
        Ok(PaymentInvoice {
            invoice_id: row.try_get("invoice_id")?,
            payer_email: row.try_get("payer_email")?,
            payer_phone: row.try_get("payer_phone")?,
            amount: Self::stored_amount(row.try_get("amount")?)?,
            currency: currency.parse()?,
            state: state.parse()?,
            last_checked_at: row.try_get("last_checked_at")?,
        })
    }

    fn row_to_record(row: &MySqlRow) -> Result<PaymentRecord> {
        let currency: String = row.try_get("currency")?;
        Ok(PaymentRecord {
            payer_email: row.try_get("payer_email")?,
            transaction_id: row.try_get("transaction_id")?,
            amount: Self::stored_amount(row.try_get("amount")?)?,
            currency: currency.parse()?,
            status: RecordStatus::Completed,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

#[async_trait]
impl QueryStore for MySqlStore {
    async fn append(&self, query: TopicQuery) -> Result<()> {
        self.scoped_write(
            sqlx::query(
                "INSERT INTO relevance_queries (topic, ai_response, created_at) VALUES (?, ?, ?)",
            )
            .bind(&query.topic)
            .bind(&query.response)
            .bind(query.created_at),
        )
        .await?;
        debug!(topic_len = query.topic.len(), "Topic query stored");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.connect().await?;
        Self::release(conn).await;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MySqlStore {
    async fn open_invoice(&self, invoice: PaymentInvoice) -> Result<bool> {
        check_invoice_id(&invoice.invoice_id)?;
        self.scoped_insert(
            sqlx::query(
                r"
                INSERT INTO payment_invoices
                    (invoice_id, payer_email, payer_phone, amount, currency, state, last_checked_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&invoice.invoice_id)
            .bind(&invoice.payer_email)
            .bind(&invoice.payer_phone)
            .bind(invoice.amount.value())
            .bind(invoice.currency.as_str())
            .bind(invoice.state.as_str())
            .bind(invoice.last_checked_at),
        )
        .await
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<PaymentInvoice>> {
        let row = self
            .scoped_fetch_optional(
                sqlx::query(
                    r"
                    SELECT invoice_id, payer_email, payer_phone, amount, currency, state, last_checked_at
                    FROM payment_invoices WHERE invoice_id = ?
                    ",
                )
                .bind(invoice_id),
            )
            .await?;
        row.as_ref().map(Self::row_to_invoice).transpose()
    }

    async fn advance_invoice(
        &self,
        invoice_id: &str,
        state: PaymentState,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let done = self
            .scoped_write(
                sqlx::query(
                    r"
                    UPDATE payment_invoices SET state = ?, last_checked_at = ?
                    WHERE invoice_id = ? AND state = ?
                    ",
                )
                .bind(state.as_str())
                .bind(at)
                .bind(invoice_id)
                .bind(PaymentState::Pending.as_str()),
            )
            .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn touch_invoice(&self, invoice_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.scoped_write(
            sqlx::query("UPDATE payment_invoices SET last_checked_at = ? WHERE invoice_id = ?")
                .bind(at)
                .bind(invoice_id),
        )
        .await?;
        Ok(())
    }

    async fn insert_record(&self, record: PaymentRecord) -> Result<bool> {
        check_invoice_id(&record.transaction_id)?;
        // The unique key on transaction_id turns a losing concurrent insert into `false`.
        self.scoped_insert(
            sqlx::query(
                r"
                INSERT INTO payment_records
                    (payer_email, transaction_id, amount, currency, status, recorded_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&record.payer_email)
            .bind(&record.transaction_id)
            .bind(record.amount.value())
            .bind(record.currency.as_str())
            .bind(record.status.as_str())
            .bind(record.recorded_at),
        )
        .await
    }

    async fn get_record(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        let row = self
            .scoped_fetch_optional(
                sqlx::query(
                    r"
                    SELECT payer_email, transaction_id, amount, currency, status, recorded_at
                    FROM payment_records WHERE transaction_id = ?
                    ",
                )
                .bind(transaction_id),
            )
            .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn all_records(&self) -> Result<Vec<PaymentRecord>> {
        let rows = self
            .scoped_fetch_all(sqlx::query(
                r"
                SELECT payer_email, transaction_id, amount, currency, status, recorded_at
                FROM payment_records ORDER BY id
                ",
            ))
            .await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_requires_every_connection_parameter() {
        let partial = DatabaseConfig {
            host: Some("localhost".to_string()),
            name: Some("careerlens".to_string()),
            user: None,
            password: Some("secret".to_string()),
        };
        assert!(MySqlStore::from_config(&partial).is_none());

        let full = DatabaseConfig {
            user: Some("app".to_string()),
            ..partial
        };
        assert!(MySqlStore::from_config(&full).is_some());
    }

    #[test]
    fn test_schema_declares_unique_transaction_id() {
        let records = SCHEMA
            .iter()
            .find(|s| s.contains("payment_records"))
            .unwrap();
        assert!(records.contains("UNIQUE KEY"));
        assert!(records.contains("(transaction_id)"));
    }

    #[tokio::test]
    async fn test_oversized_id_is_rejected_before_writing() {
        let config = DatabaseConfig {
            host: Some("127.0.0.1:1".to_string()),
            name: Some("careerlens".to_string()),
            user: Some("app".to_string()),
            password: Some("secret".to_string()),
        };
        let store = MySqlStore::from_config(&config).unwrap();
        let invoice = PaymentInvoice::pending(
            format!("{}B", "x".repeat(64)),
            "payer@example.com",
            "0712345678",
            Amount::new(rust_decimal_macros::dec!(20)).unwrap(),
            crate::domain::payment::Currency::Kes,
        );
        let record = PaymentRecord::completed(&invoice);

        assert!(matches!(
            store.insert_record(record).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            store.open_invoice(invoice).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_unavailable() {
        let config = DatabaseConfig {
            host: Some("127.0.0.1:1".to_string()),
            name: Some("careerlens".to_string()),
            user: Some("app".to_string()),
            password: Some("secret".to_string()),
        };
        let store = MySqlStore::from_config(&config).unwrap();
        assert!(matches!(
            store.ping().await,
            Err(ServiceError::Unavailable(_))
        ));
    }
}
