//! Persistent store over SQLite (WAL). Trades and decisions are append-only;
//! agent ledgers and positions are upserts. Multi-row writes for one
//! execution go through a single transaction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use syndicate_models::decision::{Action, Decision, DecisionSource};
use syndicate_models::store_schema::STORE_DDL;
use syndicate_models::trade::{ExecutionStatus, TradeRecord};
use syndicate_models::{AgentLedger, AgentProfile, Position};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ledger::LedgerState;

pub struct TradeStore {
    conn: Connection,
}

fn action_str(action: Action) -> &'static str {
    match action {
        Action::Buy => "BUY",
        Action::Sell => "SELL",
        Action::Hold => "HOLD",
    }
}

fn parse_action(s: &str) -> Result<Action, StoreError> {
    match s {
        "BUY" => Ok(Action::Buy),
        "SELL" => Ok(Action::Sell),
        "HOLD" => Ok(Action::Hold),
        other => Err(StoreError::Corrupt(format!("unknown action {other}"))),
    }
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Filled => "filled",
        ExecutionStatus::NotExecuted => "not_executed",
        ExecutionStatus::Rejected => "rejected",
        ExecutionStatus::Held => "held",
    }
}

fn parse_status(s: &str) -> Result<ExecutionStatus, StoreError> {
    match s {
        "filled" => Ok(ExecutionStatus::Filled),
        "not_executed" => Ok(ExecutionStatus::NotExecuted),
        "rejected" => Ok(ExecutionStatus::Rejected),
        "held" => Ok(ExecutionStatus::Held),
        other => Err(StoreError::Corrupt(format!("unknown status {other}"))),
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s).map_err(|e| StoreError::Corrupt(format!("decimal {s}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::from_str(s).map_err(|e| StoreError::Corrupt(format!("uuid {s}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s}: {e}")))
}

impl TradeStore {
    /// Open (or create) the store, enabling WAL for concurrent readers.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(STORE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(STORE_DDL)?;
        Ok(Self { conn })
    }

    /// Register an agent row if absent. Existing ledgers are left alone so a
    /// restart never resets capital.
    pub fn insert_agent_if_absent(
        &self,
        profile: &AgentProfile,
        ledger: &AgentLedger,
    ) -> Result<(), StoreError> {
        let risk_profile = serde_json::to_string(&profile.risk_profile)
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        self.conn.execute(
            "INSERT OR IGNORE INTO agents \
             (name, risk_profile, model, initial_capital, cash, realized_profit, total_fees, \
              trade_count, winning_trades, losing_trades, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                profile.name,
                risk_profile,
                profile.model,
                ledger.initial_capital.to_string(),
                ledger.cash.to_string(),
                ledger.realized_profit.to_string(),
                ledger.total_fees.to_string(),
                ledger.trade_count,
                ledger.winning_trades,
                ledger.losing_trades,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_ledger(&self, name: &str) -> Result<Option<AgentLedger>, StoreError> {
        let row = self
            .conn
            .prepare_cached(
                "SELECT name, initial_capital, cash, realized_profit, total_fees, \
                 trade_count, winning_trades, losing_trades FROM agents WHERE name = ?1",
            )?
            .query_row(params![name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u64>(5)?,
                    row.get::<_, u64>(6)?,
                    row.get::<_, u64>(7)?,
                ))
            })
            .optional()?;

        row.map(
            |(agent, initial, cash, realized, fees, trades, wins, losses)| {
                Ok(AgentLedger {
                    agent,
                    initial_capital: parse_decimal(&initial)?,
                    cash: parse_decimal(&cash)?,
                    realized_profit: parse_decimal(&realized)?,
                    total_fees: parse_decimal(&fees)?,
                    trade_count: trades,
                    winning_trades: wins,
                    losing_trades: losses,
                })
            },
        )
        .transpose()
    }

    pub fn load_positions(&self, agent: &str) -> Result<Vec<Position>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT agent, symbol, quantity, avg_entry_price, unrealized_pnl, updated_at \
             FROM positions WHERE agent = ?1",
        )?;
        let rows = stmt
            .query_map(params![agent], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(agent, symbol, qty, avg, pnl, updated)| {
                Ok(Position {
                    agent,
                    symbol,
                    quantity: parse_decimal(&qty)?,
                    avg_entry_price: parse_decimal(&avg)?,
                    unrealized_pnl: parse_decimal(&pnl)?,
                    updated_at: parse_timestamp(&updated)?,
                })
            })
            .collect()
    }

    /// Whether a decision id has already been applied. The executor's
    /// idempotence check.
    pub fn decision_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .prepare_cached("SELECT 1 FROM decisions WHERE id = ?1")?
            .query_row(params![id.to_string()], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Append a decision log row (Hold decisions only write this).
    pub fn insert_decision(&self, decision: &Decision) -> Result<(), StoreError> {
        insert_decision_tx(&self.conn, decision)
    }

    /// Record a Buy/Sell that never executed (precondition or brokerage
    /// failure): decision log plus a failed trade record, atomically.
    pub fn record_failed_execution(
        &mut self,
        decision: &Decision,
        record: &TradeRecord,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        insert_decision_tx(&tx, decision)?;
        insert_trade_tx(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist one successful execution as a single logical unit: the
    /// decision log, the trade record, the mutated ledger, the touched
    /// position row, and (for sells) the closing P&L attached to the
    /// earliest still-open buy of the same symbol.
    pub fn commit_execution(
        &mut self,
        decision: &Decision,
        record: &TradeRecord,
        state: &LedgerState,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        insert_decision_tx(&tx, decision)?;
        insert_trade_tx(&tx, record)?;

        let ledger = &state.ledger;
        tx.execute(
            "UPDATE agents SET cash = ?2, realized_profit = ?3, total_fees = ?4, \
             trade_count = ?5, winning_trades = ?6, losing_trades = ?7, updated_at = ?8 \
             WHERE name = ?1",
            params![
                ledger.agent,
                ledger.cash.to_string(),
                ledger.realized_profit.to_string(),
                ledger.total_fees.to_string(),
                ledger.trade_count,
                ledger.winning_trades,
                ledger.losing_trades,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if let Some(symbol) = record.symbol.as_deref() {
            match state.position(symbol) {
                Some(pos) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO positions \
                         (agent, symbol, quantity, avg_entry_price, unrealized_pnl, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            pos.agent,
                            pos.symbol,
                            pos.quantity.to_string(),
                            pos.avg_entry_price.to_string(),
                            pos.unrealized_pnl.to_string(),
                            pos.updated_at.to_rfc3339(),
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM positions WHERE agent = ?1 AND symbol = ?2",
                        params![ledger.agent, symbol],
                    )?;
                }
            }

            // A sell closes history: attach its realized P&L to the earliest
            // open buy record for the symbol.
            if record.action == Action::Sell {
                if let Some(pnl) = record.realized_pnl {
                    tx.execute(
                        "UPDATE trades SET realized_pnl = ?1 WHERE id = \
                         (SELECT id FROM trades WHERE agent = ?2 AND symbol = ?3 \
                          AND action = 'BUY' AND realized_pnl IS NULL AND status = 'filled' \
                          ORDER BY created_at ASC, id ASC LIMIT 1)",
                        params![pnl.to_string(), ledger.agent, symbol],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Upsert refreshed position valuations (the review loop's write).
    pub fn update_positions(&mut self, positions: &[Position]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for pos in positions {
            tx.execute(
                "INSERT OR REPLACE INTO positions \
                 (agent, symbol, quantity, avg_entry_price, unrealized_pnl, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    pos.agent,
                    pos.symbol,
                    pos.quantity.to_string(),
                    pos.avg_entry_price.to_string(),
                    pos.unrealized_pnl.to_string(),
                    pos.updated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The agent's most recent trades, newest first. Feeds the self-critique
    /// read and the prompt's history section.
    pub fn recent_trades(&self, agent: &str, limit: usize) -> Result<Vec<TradeRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, decision_id, agent, action, symbol, quantity, fill_price, fee, \
             realized_pnl, status, order_id, confidence, created_at \
             FROM trades WHERE agent = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![agent, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, u8>(11)?,
                    row.get::<_, String>(12)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    id,
                    decision_id,
                    agent,
                    action,
                    symbol,
                    quantity,
                    fill_price,
                    fee,
                    realized,
                    status,
                    order_id,
                    confidence,
                    created,
                )| {
                    Ok(TradeRecord {
                        id: parse_uuid(&id)?,
                        decision_id: parse_uuid(&decision_id)?,
                        agent,
                        action: parse_action(&action)?,
                        symbol,
                        quantity: parse_decimal(&quantity)?,
                        fill_price: parse_decimal(&fill_price)?,
                        fee: parse_decimal(&fee)?,
                        realized_pnl: realized.as_deref().map(parse_decimal).transpose()?,
                        status: parse_status(&status)?,
                        order_id,
                        confidence,
                        created_at: parse_timestamp(&created)?,
                    })
                },
            )
            .collect()
    }

    /// Count of trade rows for an agent (test and monitoring helper).
    pub fn trade_count(&self, agent: &str) -> Result<usize, StoreError> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE agent = ?1",
            params![agent],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn insert_decision_tx(conn: &Connection, decision: &Decision) -> Result<(), StoreError> {
    let source = match decision.source {
        DecisionSource::Inference => "inference",
        DecisionSource::Aggregated => "aggregated",
    };
    conn.execute(
        "INSERT OR IGNORE INTO decisions \
         (id, cycle, agent, action, symbol, quantity, reasoning, confidence, source, decided_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            decision.id.to_string(),
            decision.cycle,
            decision.agent,
            action_str(decision.action),
            decision.symbol,
            decision.quantity.to_string(),
            decision.reasoning,
            decision.confidence,
            source,
            decision.decided_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_trade_tx(conn: &Connection, record: &TradeRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO trades \
         (id, decision_id, agent, action, symbol, quantity, fill_price, fee, realized_pnl, \
          status, order_id, confidence, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.id.to_string(),
            record.decision_id.to_string(),
            record.agent,
            action_str(record.action),
            record.symbol,
            record.quantity.to_string(),
            record.fill_price.to_string(),
            record.fee.to_string(),
            record.realized_pnl.map(|p| p.to_string()),
            status_str(record.status),
            record.order_id,
            record.confidence,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use syndicate_models::RiskProfile;

    fn profile() -> AgentProfile {
        AgentProfile {
            name: "hawk".to_string(),
            risk_profile: RiskProfile::Aggressive,
            model: "x-ai/grok-3-mini".to_string(),
        }
    }

    fn decision(action: Action, symbol: Option<&str>) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            cycle: 1,
            agent: "hawk".to_string(),
            action,
            symbol: symbol.map(|s| s.to_string()),
            quantity: dec!(10),
            reasoning: "test".to_string(),
            confidence: 75,
            decided_at: Utc::now(),
            source: DecisionSource::Inference,
        }
    }

    fn trade_for(decision: &Decision, status: ExecutionStatus) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            decision_id: decision.id,
            agent: decision.agent.clone(),
            action: decision.action,
            symbol: decision.symbol.clone(),
            quantity: decision.quantity,
            fill_price: dec!(50),
            fee: dec!(1),
            realized_pnl: None,
            status,
            order_id: Some("ord-1".to_string()),
            confidence: decision.confidence,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn agent_registration_is_idempotent() {
        let store = TradeStore::open_in_memory().unwrap();
        let ledger = AgentLedger::new("hawk", dec!(10000));
        store.insert_agent_if_absent(&profile(), &ledger).unwrap();

        // A restart must not reset capital.
        let fresh = AgentLedger::new("hawk", dec!(99999));
        store.insert_agent_if_absent(&profile(), &fresh).unwrap();

        let loaded = store.load_ledger("hawk").unwrap().unwrap();
        assert_eq!(loaded.initial_capital, dec!(10000));
    }

    #[test]
    fn load_missing_ledger_is_none() {
        let store = TradeStore::open_in_memory().unwrap();
        assert!(store.load_ledger("nobody").unwrap().is_none());
    }

    #[test]
    fn decision_existence_check() {
        let store = TradeStore::open_in_memory().unwrap();
        let d = decision(Action::Hold, None);
        assert!(!store.decision_exists(d.id).unwrap());
        store.insert_decision(&d).unwrap();
        assert!(store.decision_exists(d.id).unwrap());
    }

    #[test]
    fn commit_execution_persists_everything() {
        let mut store = TradeStore::open_in_memory().unwrap();
        let ledger = AgentLedger::new("hawk", dec!(10000));
        store.insert_agent_if_absent(&profile(), &ledger).unwrap();

        let d = decision(Action::Buy, Some("AAPL"));
        let record = trade_for(&d, ExecutionStatus::Filled);
        let mut state = LedgerState::new("hawk", dec!(10000));
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));

        store.commit_execution(&d, &record, &state).unwrap();

        let loaded = store.load_ledger("hawk").unwrap().unwrap();
        assert_eq!(loaded.cash, dec!(9499.00));
        assert_eq!(loaded.trade_count, 1);

        let positions = store.load_positions("hawk").unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(10));

        assert!(store.decision_exists(d.id).unwrap());
        assert_eq!(store.trade_count("hawk").unwrap(), 1);
    }

    #[test]
    fn sell_attaches_closing_pnl_to_earliest_open_buy() {
        let mut store = TradeStore::open_in_memory().unwrap();
        let ledger = AgentLedger::new("hawk", dec!(10000));
        store.insert_agent_if_absent(&profile(), &ledger).unwrap();

        let mut state = LedgerState::new("hawk", dec!(10000));

        let buy = decision(Action::Buy, Some("AAPL"));
        let buy_record = trade_for(&buy, ExecutionStatus::Filled);
        state.apply_buy("AAPL", dec!(10), dec!(50), dec!(1));
        store.commit_execution(&buy, &buy_record, &state).unwrap();

        let sell = decision(Action::Sell, Some("AAPL"));
        let mut sell_record = trade_for(&sell, ExecutionStatus::Filled);
        sell_record.fill_price = dec!(55);
        let realized = state.apply_sell("AAPL", dec!(10), dec!(55), dec!(1));
        sell_record.realized_pnl = Some(realized);
        store.commit_execution(&sell, &sell_record, &state).unwrap();

        let trades = store.recent_trades("hawk", 10).unwrap();
        let buy_row = trades.iter().find(|t| t.action == Action::Buy).unwrap();
        assert_eq!(
            buy_row.realized_pnl,
            Some(dec!(50)),
            "closing P&L attached to the buy record"
        );

        // Full close removes the position row.
        assert!(store.load_positions("hawk").unwrap().is_empty());
    }

    #[test]
    fn duplicate_trade_for_same_decision_is_rejected_by_schema() {
        let mut store = TradeStore::open_in_memory().unwrap();
        let d = decision(Action::Buy, Some("AAPL"));
        let first = trade_for(&d, ExecutionStatus::Filled);
        let second = trade_for(&d, ExecutionStatus::Filled);

        store
            .record_failed_execution(&d, &first)
            .expect("first insert");
        let err = store.record_failed_execution(&d, &second);
        assert!(err.is_err(), "UNIQUE(decision_id) must reject the second");
    }

    #[test]
    fn recent_trades_newest_first_with_limit() {
        let store = TradeStore::open_in_memory().unwrap();
        for i in 0..5 {
            let d = decision(Action::Buy, Some("AAPL"));
            let mut record = trade_for(&d, ExecutionStatus::Filled);
            record.created_at = Utc::now() + chrono::Duration::seconds(i);
            insert_trade_tx(&store.conn, &record).unwrap();
        }
        let trades = store.recent_trades("hawk", 3).unwrap();
        assert_eq!(trades.len(), 3);
        assert!(trades[0].created_at >= trades[1].created_at);
    }

    #[test]
    fn wal_mode_on_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let _store = TradeStore::open(path.to_str().unwrap()).unwrap();
    }

    #[test]
    fn update_positions_upserts() {
        let mut store = TradeStore::open_in_memory().unwrap();
        let pos = Position {
            agent: "hawk".to_string(),
            symbol: "AAPL".to_string(),
            quantity: dec!(10),
            avg_entry_price: dec!(50),
            unrealized_pnl: dec!(30),
            updated_at: Utc::now(),
        };
        store.update_positions(&[pos.clone()]).unwrap();
        store.update_positions(&[pos]).unwrap();
        let positions = store.load_positions("hawk").unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].unrealized_pnl, dec!(30));
    }
}
