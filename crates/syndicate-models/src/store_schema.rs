//! SQLite schema for the persistent store: upsert tables for agent ledgers
//! and positions, append-only tables for trades and decision logs.

/// The store's DDL. Positions are unique per (agent, symbol) and may never
/// go negative; trades are unique per decision id, which is the idempotence
/// anchor for the execution manager.
pub const STORE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS agents (
    name             TEXT PRIMARY KEY,
    risk_profile     TEXT NOT NULL,
    model            TEXT NOT NULL,
    initial_capital  TEXT NOT NULL,
    cash             TEXT NOT NULL,
    realized_profit  TEXT NOT NULL,
    total_fees       TEXT NOT NULL,
    trade_count      INTEGER NOT NULL,
    winning_trades   INTEGER NOT NULL,
    losing_trades    INTEGER NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS positions (
    agent            TEXT NOT NULL,
    symbol           TEXT NOT NULL,
    quantity         TEXT NOT NULL CHECK (CAST(quantity AS REAL) >= 0),
    avg_entry_price  TEXT NOT NULL,
    unrealized_pnl   TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (agent, symbol)
);

CREATE TABLE IF NOT EXISTS trades (
    id               TEXT PRIMARY KEY,
    decision_id      TEXT NOT NULL UNIQUE,
    agent            TEXT NOT NULL,
    action           TEXT NOT NULL,
    symbol           TEXT,
    quantity         TEXT NOT NULL,
    fill_price       TEXT NOT NULL,
    fee              TEXT NOT NULL,
    realized_pnl     TEXT,
    status           TEXT NOT NULL,
    order_id         TEXT,
    confidence       INTEGER NOT NULL,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
    id               TEXT PRIMARY KEY,
    cycle            INTEGER NOT NULL,
    agent            TEXT NOT NULL,
    action           TEXT NOT NULL,
    symbol           TEXT,
    quantity         TEXT NOT NULL,
    reasoning        TEXT NOT NULL,
    confidence       INTEGER NOT NULL,
    source           TEXT NOT NULL,
    decided_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trades_agent ON trades(agent, created_at);
CREATE INDEX IF NOT EXISTS idx_decisions_agent ON decisions(agent, cycle);
CREATE INDEX IF NOT EXISTS idx_positions_agent ON positions(agent);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_covers_all_tables() {
        for table in ["agents", "positions", "trades", "decisions"] {
            assert!(
                STORE_DDL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn trades_are_unique_per_decision() {
        assert!(STORE_DDL.contains("decision_id      TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn positions_unique_per_agent_symbol() {
        assert!(STORE_DDL.contains("PRIMARY KEY (agent, symbol)"));
    }
}
