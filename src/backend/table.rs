//! Table Backend
//!
//! Stores events as rows of a PostgreSQL table:
//!
//! ```text
//! transactions(sequence    BIGSERIAL PRIMARY KEY,
//!              event_type  SMALLINT NOT NULL,
//!              key         TEXT NOT NULL,
//!              value       TEXT,
//!              create_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP)
//! ```
//!
//! The database assigns `sequence`. Replay order comes from an explicit
//! `ORDER BY sequence`, never from physical row order.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use postgres::error::SqlState;
use postgres::{Client, NoTls, Portal, Row, Transaction};

use crate::config::TableParams;
use crate::error::{Result, TxLogError};
use crate::wal::{Event, EventKind};

use super::{Backend, EventScan};

const CREATE_TABLE: &str = "CREATE TABLE transactions (
    sequence BIGSERIAL PRIMARY KEY,
    event_type SMALLINT NOT NULL,
    key TEXT NOT NULL,
    value TEXT,
    create_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

const PROBE_TABLE: &str = "SELECT 1 FROM transactions LIMIT 1";

const INSERT_EVENT: &str = "INSERT INTO transactions (event_type, key, value)
    VALUES ($1, $2, $3)
    RETURNING sequence";

const SELECT_EVENTS: &str = "SELECT sequence, event_type, key, value
    FROM transactions
    ORDER BY sequence";

/// Rows fetched per round trip during a scan
const SCAN_BATCH_SIZE: i32 = 256;

/// Upper bound on a single liveness probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Transaction log stored in a relational table
pub struct TableBackend {
    client: Option<Client>,
}

impl TableBackend {
    /// Connect, wait for the database to come up, and bootstrap the schema.
    ///
    /// The liveness probe is retried `params.connect_attempts` times with a
    /// fixed `params.retry_delay` between attempts.
    pub fn connect(params: &TableParams) -> Result<Self> {
        let client = connect_with_retry(params)?;
        let mut backend = Self {
            client: Some(client),
        };

        if !backend.verify_table_exists()? {
            tracing::info!("creating transactions table");
            backend.create_table()?;
        }

        Ok(backend)
    }

    fn client(&mut self) -> Result<&mut Client> {
        self.client.as_mut().ok_or(TxLogError::BackendClosed)
    }

    fn verify_table_exists(&mut self) -> Result<bool> {
        match self.client()?.query(PROBE_TABLE, &[]) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => Ok(false),
            Err(e) => Err(TxLogError::Connection(format!(
                "failed to verify table exists: {}",
                e
            ))),
        }
    }

    fn create_table(&mut self) -> Result<()> {
        self.client()?
            .batch_execute(CREATE_TABLE)
            .map_err(|e| TxLogError::Connection(format!("failed to create table: {}", e)))
    }
}

fn connect_with_retry(params: &TableParams) -> Result<Client> {
    let conn = params.connection_string();
    let attempts = params.connect_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        tracing::info!(attempt, host = %params.host, port = params.port, "pinging database");

        let probe = Client::connect(&conn, NoTls)
            .and_then(|mut client| client.is_valid(PROBE_TIMEOUT).map(|_| client));

        match probe {
            Ok(client) => return Ok(client),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "database not ready");
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            thread::sleep(params.retry_delay);
        }
    }

    Err(TxLogError::Connection(format!(
        "failed to open db connection after {} attempts: {}",
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

impl Backend for TableBackend {
    fn append(&mut self, event: &Event) -> Result<u64> {
        event.validate()?;

        let kind = event.kind.as_u8() as i16;
        let value: Option<&str> = match event.kind {
            EventKind::Delete => None,
            _ => Some(event.value.as_str()),
        };

        let row = self
            .client()?
            .query_one(INSERT_EVENT, &[&kind, &event.key, &value])?;
        let sequence: i64 = row.try_get(0)?;

        Ok(sequence as u64)
    }

    fn scan(&mut self) -> Result<EventScan<'_>> {
        let mut transaction = self.client()?.transaction()?;
        let portal = transaction.bind(SELECT_EVENTS, &[])?;

        Ok(Box::new(RowScan {
            transaction,
            portal,
            buffered: VecDeque::new(),
            exhausted: false,
            failed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

/// Batched cursor over `SELECT_EVENTS`
struct RowScan<'a> {
    transaction: Transaction<'a>,
    portal: Portal,
    buffered: VecDeque<Row>,
    exhausted: bool,
    failed: bool,
}

impl Iterator for RowScan<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }

            if let Some(row) = self.buffered.pop_front() {
                let decoded = decode_row(&row);
                if decoded.is_err() {
                    self.failed = true;
                }
                return Some(decoded);
            }

            if self.exhausted {
                return None;
            }

            match self.transaction.query_portal(&self.portal, SCAN_BATCH_SIZE) {
                Ok(rows) => {
                    if rows.len() < SCAN_BATCH_SIZE as usize {
                        self.exhausted = true;
                    }
                    self.buffered.extend(rows);
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(TxLogError::Database(e)));
                }
            }
        }
    }
}

fn decode_row(row: &Row) -> Result<Event> {
    let invalid = |e: postgres::Error| TxLogError::Decode(format!("error reading row: {}", e));

    let sequence: i64 = row.try_get(0).map_err(invalid)?;
    let kind: i16 = row.try_get(1).map_err(invalid)?;
    let key: String = row.try_get(2).map_err(invalid)?;
    let value: Option<String> = row.try_get(3).map_err(invalid)?;

    if sequence <= 0 {
        return Err(TxLogError::Decode(format!("non-positive sequence: {}", sequence)));
    }

    let kind = EventKind::try_from(kind)?;
    if key.is_empty() {
        return Err(TxLogError::Decode(format!("empty key at sequence {}", sequence)));
    }

    let value = match kind {
        EventKind::Delete => String::new(),
        _ => value.unwrap_or_default(),
    };

    Ok(Event {
        sequence: sequence as u64,
        kind,
        key,
        value,
    })
}
