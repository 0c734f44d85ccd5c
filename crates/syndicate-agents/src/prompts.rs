//! Prompt assembly for decision units. One template per risk profile; the
//! unit itself is parameterized, never specialized.

use rust_decimal::Decimal;
use syndicate_models::market::MarketContext;
use syndicate_models::trade::TradeRecord;
use syndicate_models::RiskProfile;

use crate::unit::AgentView;

const RECENT_TRADES_SHOWN: usize = 5;
const HEADLINES_SHOWN: usize = 10;

/// Schema description included in every decision prompt.
fn response_schema() -> String {
    let example = serde_json::json!({
        "decision": "BUY | SELL | HOLD",
        "symbol": "<ticker, omit for HOLD>",
        "quantity": "<number of shares, omit for HOLD>",
        "reasoning": "<concise explanation of the catalyst and the exit plan>",
        "confidence": "<integer 0-100>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

/// Trading temperament per strategy variant.
pub fn personality(profile: RiskProfile) -> &'static str {
    match profile {
        RiskProfile::Aggressive => {
            "You are an aggressive but calculating trader. You hunt asymmetric \
             risk/reward: surprise catalysts, excessive panics, sector rotations \
             other traders have not priced yet. You move fast but never without a \
             stated catalyst, a price target, and a stop. You cut losers quickly \
             and pyramid into winners."
        }
        RiskProfile::Methodical => {
            "You are a systematic, indicator-driven trader. You only act when the \
             technical picture is unambiguous: RSI extremes, moving-average \
             crossovers, MACD confirmation. You size small, you never chase, and \
             when signals conflict you hold. Discipline over conviction."
        }
        RiskProfile::Balanced => {
            "You are a diversified, capital-preservation-first trader. You keep a \
             cash reserve, cap exposure to any single position, and prefer many \
             small positions across sectors over one concentrated bet. You take \
             partial profits early and avoid trading into uncertainty."
        }
    }
}

/// Full system prompt: personality, ledger status, open positions, recent
/// history, the latest self-critique, and the fee-awareness rule.
pub fn system_prompt(view: &AgentView, critique: Option<&str>, fee_per_trade: Decimal) -> String {
    let ledger = &view.ledger;
    let positions = if view.positions.is_empty() {
        "None - all capital is in cash.".to_string()
    } else {
        view.positions
            .iter()
            .map(|p| {
                format!(
                    "- {} x{} @ avg ${} (unrealized ${})",
                    p.symbol, p.quantity, p.avg_entry_price, p.unrealized_pnl
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are {name}, an autonomous trading agent.\n\n\
         ## TEMPERAMENT\n{personality}\n\n\
         ## YOUR LEDGER\n\
         - Initial capital: ${initial}\n\
         - Cash available: ${cash}\n\
         - Realized profit: ${realized}\n\
         - Fees paid: ${fees}\n\
         - Record: {wins} wins / {losses} losses / {pending} open\n\n\
         ## OPEN POSITIONS\n{positions}\n\n\
         ## SELF-CRITIQUE\n{critique}\n\n\
         ## HARD RULES\n\
         - Every executed trade costs ${fee} in fees. Only trade when your \
         confidence exceeds 70.\n\
         - Never spend more cash than you have; never sell more than you hold.\n\
         - You MUST respond with ONLY a JSON object matching this schema:\n\
         {schema}",
        name = view.profile.name,
        personality = personality(view.profile.risk_profile),
        initial = ledger.initial_capital,
        cash = ledger.cash,
        realized = ledger.realized_profit,
        fees = ledger.total_fees,
        wins = ledger.winning_trades,
        losses = ledger.losing_trades,
        pending = ledger.pending_trades(),
        positions = positions,
        critique = critique.unwrap_or("None yet. Focus on trade quality."),
        fee = fee_per_trade,
        schema = response_schema(),
    )
}

/// Bounded user prompt: the market snapshot plus the agent's recent trades.
pub fn market_user_prompt(context: &MarketContext, recent_trades: &[TradeRecord]) -> String {
    let mut sections = Vec::new();

    let quotes: Vec<String> = context
        .quotes
        .values()
        .map(|q| format!("- {}: ${} (volume {})", q.symbol, q.price, q.volume))
        .collect();
    sections.push(format!("## QUOTES\n{}", quotes.join("\n")));

    let indicator_lines: Vec<String> = context
        .indicators
        .iter()
        .map(|(symbol, set)| {
            let fmt = |v: Option<f64>| match v {
                Some(v) => format!("{v:.2}"),
                None => "n/a".to_string(),
            };
            format!(
                "- {symbol}: RSI14 {} | SMA20 {} | EMA20 {} | MACD {} / signal {}",
                fmt(set.rsi_14),
                fmt(set.sma_20),
                fmt(set.ema_20),
                fmt(set.macd_line),
                fmt(set.macd_signal),
            )
        })
        .collect();
    if !indicator_lines.is_empty() {
        sections.push(format!("## INDICATORS\n{}", indicator_lines.join("\n")));
    }

    if let Some(news) = &context.news {
        let headlines: Vec<String> = news
            .headlines
            .iter()
            .take(HEADLINES_SHOWN)
            .map(|h| format!("- {h}"))
            .collect();
        sections.push(format!(
            "## NEWS (mean sentiment {:+.2})\n{}",
            news.sentiment,
            headlines.join("\n")
        ));
    }

    if recent_trades.is_empty() {
        sections.push("## YOUR RECENT TRADES\nNone.".to_string());
    } else {
        let lines: Vec<String> = recent_trades
            .iter()
            .take(RECENT_TRADES_SHOWN)
            .map(|t| {
                format!(
                    "- {:?} {} x{} @ ${} ({:?}, confidence {})",
                    t.action,
                    t.symbol.as_deref().unwrap_or("-"),
                    t.quantity,
                    t.fill_price,
                    t.status,
                    t.confidence
                )
            })
            .collect();
        sections.push(format!("## YOUR RECENT TRADES\n{}", lines.join("\n")));
    }

    sections.push(
        "## INSTRUCTION\nAnalyze the snapshot and decide. Respond with ONLY the JSON object."
            .to_string(),
    );

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use syndicate_models::market::Quote;
    use syndicate_models::{AgentLedger, AgentProfile};

    fn sample_view() -> AgentView {
        AgentView {
            profile: AgentProfile {
                name: "hawk".to_string(),
                risk_profile: RiskProfile::Aggressive,
                model: "x-ai/grok-3-mini".to_string(),
            },
            ledger: AgentLedger::new("hawk", dec!(10000)),
            positions: Vec::new(),
        }
    }

    fn sample_context() -> MarketContext {
        let mut quotes = BTreeMap::new();
        quotes.insert(
            "AAPL".to_string(),
            Quote {
                symbol: "AAPL".to_string(),
                price: dec!(150.25),
                volume: 1_000_000,
                as_of: Utc::now(),
            },
        );
        MarketContext {
            symbols: vec!["AAPL".to_string()],
            quotes,
            bars: BTreeMap::new(),
            indicators: BTreeMap::new(),
            news: None,
            fetched_at: Utc::now(),
            ttl_seconds: 120,
        }
    }

    #[test]
    fn system_prompt_contains_ledger_and_schema() {
        let prompt = system_prompt(&sample_view(), None, dec!(1));
        assert!(prompt.contains("hawk"));
        assert!(prompt.contains("10000"));
        assert!(prompt.contains("\"decision\""));
        assert!(prompt.contains("confidence"));
        assert!(prompt.contains("costs $1 in fees"));
    }

    #[test]
    fn system_prompt_includes_critique_when_present() {
        let prompt = system_prompt(&sample_view(), Some("Stop churning AAPL."), dec!(1));
        assert!(prompt.contains("Stop churning AAPL."));
    }

    #[test]
    fn each_profile_has_distinct_personality() {
        let a = personality(RiskProfile::Aggressive);
        let m = personality(RiskProfile::Methodical);
        let b = personality(RiskProfile::Balanced);
        assert_ne!(a, m);
        assert_ne!(m, b);
        assert_ne!(a, b);
    }

    #[test]
    fn user_prompt_lists_quotes_and_instruction() {
        let prompt = market_user_prompt(&sample_context(), &[]);
        assert!(prompt.contains("AAPL: $150.25"));
        assert!(prompt.contains("## INSTRUCTION"));
        assert!(prompt.contains("None."));
    }

    #[test]
    fn user_prompt_caps_headlines() {
        let mut context = sample_context();
        context.news = Some(syndicate_models::market::NewsDigest {
            headlines: (0..50).map(|i| format!("headline {i}")).collect(),
            sentiment: 0.2,
            fetched_at: Utc::now(),
        });
        let prompt = market_user_prompt(&context, &[]);
        assert!(prompt.contains("headline 9"));
        assert!(!prompt.contains("headline 10\n"));
    }
}
