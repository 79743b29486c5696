//! Database schema creation

use rusqlite::{Connection, Result};

/// Create all tables and indexes. Safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS opportunities (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            pair_path TEXT NOT NULL,
            venue_path TEXT NOT NULL,
            trade_amount_in TEXT NOT NULL,
            gross_profit_quote TEXT NOT NULL,
            net_profit_quote TEXT NOT NULL,
            gas_cost_quote TEXT NOT NULL,
            fee_cost_quote TEXT NOT NULL,
            margin TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT,
            block_number INTEGER NOT NULL,
            block_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS price_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pair TEXT NOT NULL,
            venue TEXT NOT NULL,
            reserve0 TEXT NOT NULL,
            reserve1 TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            observed_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            opportunity_id TEXT NOT NULL,
            venue_path TEXT NOT NULL,
            status TEXT NOT NULL,
            tx_hash TEXT,
            gas_used INTEGER NOT NULL,
            gas_price_gwei TEXT NOT NULL,
            execution_time_ms INTEGER NOT NULL,
            sized_amount_quote TEXT NOT NULL,
            expected_profit_quote TEXT NOT NULL,
            actual_profit_quote TEXT,
            slippage_bps INTEGER,
            error_message TEXT,
            timestamp INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_opportunities_created
         ON opportunities(created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_opportunities_kind
         ON opportunities(kind, created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_opportunities_block
         ON opportunities(block_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_price_history_pair
         ON price_history(pair, venue, observed_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_executions_opportunity
         ON executions(opportunity_id)",
        [],
    )?;

    Ok(())
}
