//! Auxiliary CLI subcommands: report, reset, db-status.

use crate::config::AppConfig;
use crate::error::AppResult;
use polyarb_db::{Db, DbConfig};

async fn connect(config: &AppConfig) -> AppResult<Db> {
    Ok(Db::connect(&DbConfig {
        database_url: config.database_url.clone(),
        ..DbConfig::default()
    })
    .await?)
}

/// Print the latest P&L snapshot, open positions and trade counters.
pub async fn report(config: &AppConfig) -> AppResult<()> {
    let db = connect(config).await?;
    db.verify_schema().await?;

    match db.latest_pnl_snapshot().await? {
        Some(snapshot) => {
            println!("Latest P&L snapshot ({}):", snapshot.snapshot_at);
            println!("  cash balance    {}", snapshot.cash_balance);
            println!("  position value  {}", snapshot.position_value);
            println!("  total equity    {}", snapshot.total_equity);
            println!("  unrealized pnl  {}", snapshot.unrealized_pnl);
            println!("  total pnl       {}", snapshot.total_pnl);
            println!("  trades today    {}", snapshot.trades_today);
        }
        None => println!("No P&L snapshots recorded yet."),
    }

    let positions = db.open_positions().await?;
    if positions.is_empty() {
        println!("No open positions.");
    } else {
        println!("Open positions:");
        for position in positions {
            println!(
                "  {} {} qty {} avg {} pnl {}",
                position.market_id,
                position.token_side,
                position.quantity,
                position.average_cost,
                position
                    .unrealized_pnl
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
    }

    let stats = db.trade_stats().await?;
    println!(
        "Trades: {} total, {} today",
        stats.total_trades, stats.trades_today
    );

    let counts = db.active_opportunity_counts().await?;
    if !counts.is_empty() {
        println!("Active opportunities:");
        for (kind, count) in counts {
            println!("  {kind}: {count}");
        }
    }

    db.close().await;
    Ok(())
}

/// Wipe the paper book and opportunity log.
pub async fn reset(config: &AppConfig) -> AppResult<()> {
    let db = connect(config).await?;
    db.init_schema().await?;
    db.reset_paper_state().await?;
    println!("Paper trading state reset.");
    db.close().await;
    Ok(())
}

/// Verify the schema and print per-table row counts.
pub async fn db_status(config: &AppConfig) -> AppResult<()> {
    let db = connect(config).await?;
    match db.verify_schema().await {
        Ok(()) => println!("Schema OK."),
        Err(e) => {
            println!("Schema check failed: {e}");
            db.close().await;
            return Err(e.into());
        }
    }
    for (table, count) in db.table_counts().await? {
        println!("  {table:<24} {count}");
    }
    db.close().await;
    Ok(())
}
