//! Non-blocking SQLite writer using a dedicated thread and a bounded
//! channel.

use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::errors::{ScanError, ScanResult};

use super::records::{ExecutionRecord, OpportunityRecord, PriceHistoryRecord};
use super::schema::create_tables;

const FLUSH_BATCH_SIZE: usize = 100;
const FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// Messages sent to the storage writer thread.
pub enum StorageMessage {
    Opportunity(OpportunityRecord),
    PriceHistory(PriceHistoryRecord),
    Execution(ExecutionRecord),
    /// Graceful shutdown; flushes pending rows first.
    Shutdown,
}

/// Writer-side liveness shared with the orchestrator. A persistent
/// outage beyond the configured tolerance escalates to shutdown.
pub struct StoreHealth {
    last_ok: RwLock<Instant>,
    failing: AtomicBool,
}

impl StoreHealth {
    fn new() -> Self {
        Self {
            last_ok: RwLock::new(Instant::now()),
            failing: AtomicBool::new(false),
        }
    }

    fn mark_ok(&self) {
        *self.last_ok.write().expect("store health lock") = Instant::now();
        self.failing.store(false, Ordering::SeqCst);
    }

    fn mark_failing(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// How long writes have been failing, if they currently are.
    pub fn outage(&self) -> Option<Duration> {
        if self.failing.load(Ordering::SeqCst) {
            Some(self.last_ok.read().expect("store health lock").elapsed())
        } else {
            None
        }
    }
}

/// Cloneable, non-blocking handle for sending rows to the writer.
/// `record_*` return `false` when the bounded buffer is full and the
/// row was dropped; the caller owns the drop accounting.
#[derive(Clone)]
pub struct StorageChannel {
    tx: SyncSender<StorageMessage>,
    health: Arc<StoreHealth>,
}

impl StorageChannel {
    pub fn record_opportunity(&self, record: OpportunityRecord) -> bool {
        self.send(StorageMessage::Opportunity(record))
    }

    pub fn record_price_history(&self, record: PriceHistoryRecord) -> bool {
        self.send(StorageMessage::PriceHistory(record))
    }

    pub fn record_execution(&self, record: ExecutionRecord) -> bool {
        self.send(StorageMessage::Execution(record))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.try_send(StorageMessage::Shutdown);
    }

    pub fn health(&self) -> Arc<StoreHealth> {
        self.health.clone()
    }

    fn send(&self, message: StorageMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                self.health.mark_failing();
                false
            }
        }
    }
}

/// Opens the database, creates the schema, and spawns the writer
/// thread. Failure here means the store is unavailable at startup,
/// which is fatal.
pub fn create_storage_channel(db_path: &str, buffer_limit: usize) -> ScanResult<StorageChannel> {
    let conn = Connection::open(db_path).map_err(|e| ScanError::Store {
        message: format!("cannot open database at {db_path}: {e}"),
        outage: None,
    })?;
    create_tables(&conn).map_err(|e| ScanError::Store {
        message: format!("cannot create tables: {e}"),
        outage: None,
    })?;
    info!("💾 Store initialized at {db_path}");

    let (tx, rx) = mpsc::sync_channel(buffer_limit);
    let health = Arc::new(StoreHealth::new());
    let thread_health = health.clone();

    thread::Builder::new()
        .name("store-writer".to_string())
        .spawn(move || writer_loop(conn, rx, thread_health))
        .map_err(|e| ScanError::Store {
            message: format!("cannot spawn writer thread: {e}"),
            outage: None,
        })?;

    Ok(StorageChannel { tx, health })
}

fn writer_loop(conn: Connection, rx: Receiver<StorageMessage>, health: Arc<StoreHealth>) {
    let mut batch: Vec<StorageMessage> = Vec::with_capacity(FLUSH_BATCH_SIZE);

    loop {
        match rx.recv_timeout(FLUSH_TIMEOUT) {
            Ok(StorageMessage::Shutdown) => {
                flush_batch(&conn, &mut batch, &health);
                info!("💾 Store writer shutdown complete");
                break;
            }
            Ok(message) => {
                batch.push(message);
                if batch.len() >= FLUSH_BATCH_SIZE {
                    flush_batch(&conn, &mut batch, &health);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                flush_batch(&conn, &mut batch, &health);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                flush_batch(&conn, &mut batch, &health);
                info!("💾 Store channel disconnected, writer exiting");
                break;
            }
        }
    }
}

fn flush_batch(conn: &Connection, batch: &mut Vec<StorageMessage>, health: &StoreHealth) {
    if batch.is_empty() {
        return;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => {
            error!("Store transaction failed to start: {e}");
            health.mark_failing();
            batch.clear();
            return;
        }
    };

    let mut failed = false;
    for message in batch.drain(..) {
        let result = match &message {
            StorageMessage::Opportunity(record) => insert_opportunity(&tx, record),
            StorageMessage::PriceHistory(record) => insert_price_history(&tx, record),
            StorageMessage::Execution(record) => insert_execution(&tx, record),
            StorageMessage::Shutdown => Ok(0),
        };
        if let Err(e) = result {
            warn!("Store insert failed: {e}");
            failed = true;
        }
    }

    match tx.commit() {
        Ok(()) if !failed => health.mark_ok(),
        Ok(()) => health.mark_failing(),
        Err(e) => {
            error!("Store commit failed: {e}");
            health.mark_failing();
        }
    }
}

/// Idempotent on the primary key: re-inserting an id is a no-op.
pub fn insert_opportunity(conn: &Connection, record: &OpportunityRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO opportunities (
            id, kind, pair_path, venue_path, trade_amount_in,
            gross_profit_quote, net_profit_quote, gas_cost_quote,
            fee_cost_quote, margin, status, reason,
            block_number, block_hash, created_at, expires_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            record.id,
            record.kind,
            record.pair_path,
            record.venue_path,
            record.trade_amount_in,
            record.gross_profit_quote,
            record.net_profit_quote,
            record.gas_cost_quote,
            record.fee_cost_quote,
            record.margin,
            record.status,
            record.reason,
            record.block_number,
            record.block_hash,
            record.created_at,
            record.expires_at,
        ],
    )
}

pub fn insert_price_history(
    conn: &Connection,
    record: &PriceHistoryRecord,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO price_history (pair, venue, reserve0, reserve1, block_number, observed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            record.pair,
            record.venue,
            record.reserve0,
            record.reserve1,
            record.block_number,
            record.observed_at,
        ],
    )
}

pub fn insert_execution(conn: &Connection, record: &ExecutionRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO executions (
            id, opportunity_id, venue_path, status, tx_hash, gas_used,
            gas_price_gwei, execution_time_ms, sized_amount_quote,
            expected_profit_quote, actual_profit_quote, slippage_bps,
            error_message, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            record.id,
            record.opportunity_id,
            record.venue_path,
            record.status,
            record.tx_hash,
            record.gas_used,
            record.gas_price_gwei,
            record.execution_time_ms,
            record.sized_amount_quote,
            record.expected_profit_quote,
            record.actual_profit_quote,
            record.slippage_bps,
            record.error_message,
            record.timestamp,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: &str) -> OpportunityRecord {
        OpportunityRecord {
            id: id.to_string(),
            kind: "two_leg".to_string(),
            pair_path: "0xaa>0xbb>0xaa".to_string(),
            venue_path: "uniswap>sushiswap".to_string(),
            trade_amount_in: "1000000000000000000".to_string(),
            gross_profit_quote: "42.5".to_string(),
            net_profit_quote: "30.1".to_string(),
            gas_cost_quote: "12.4".to_string(),
            fee_cost_quote: "6.3".to_string(),
            margin: "1.61".to_string(),
            status: "qualified".to_string(),
            reason: String::new(),
            block_number: 1_000,
            block_hash: "0xabc".to_string(),
            created_at: 1_700_000_000,
            expires_at: 1_700_000_030,
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn duplicate_ids_store_once() {
        let conn = memory_db();
        insert_opportunity(&conn, &sample_record("opp-1")).unwrap();
        insert_opportunity(&conn, &sample_record("opp-1")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM opportunities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn distinct_ids_store_separately() {
        let conn = memory_db();
        insert_opportunity(&conn, &sample_record("opp-1")).unwrap();
        insert_opportunity(&conn, &sample_record("opp-2")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM opportunities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn price_history_appends() {
        let conn = memory_db();
        let record = PriceHistoryRecord {
            pair: "0xaa/0xbb".to_string(),
            venue: "uniswap".to_string(),
            reserve0: "1000".to_string(),
            reserve1: "2000".to_string(),
            block_number: 5,
            observed_at: 1_700_000_000,
        };
        insert_price_history(&conn, &record).unwrap();
        insert_price_history(&conn, &record).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn store_health_tracks_outage() {
        let health = StoreHealth::new();
        assert!(health.outage().is_none());
        health.mark_failing();
        assert!(health.outage().is_some());
        health.mark_ok();
        assert!(health.outage().is_none());
    }
}
