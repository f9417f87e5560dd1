// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use chrono::Local;
use csv::Writer;
use std::path::{Path, PathBuf};

use crate::models::Bar;

pub fn bars_csv_path(data_dir: &Path, ticker: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    data_dir.join(format!("bars_{}_{}.csv", ticker, timestamp))
}

/// Write OHLCV bars to CSV, one row per bar in the order given.
pub fn export_bars_csv(ticker: &str, bars: &[Bar], csv_path: &Path) -> Result<()> {
    if let Some(dir) = csv_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = Writer::from_path(csv_path)?;

    // Write header
    writer.write_record([
        "Ticker",
        "Start (UTC)",
        "Timestamp (ms)",
        "Open",
        "High",
        "Low",
        "Close",
        "Volume",
        "VWAP",
        "Transactions",
    ])?;

    for bar in bars {
        writer.write_record([
            ticker.to_string(),
            bar.start().map(|t| t.to_rfc3339()).unwrap_or_default(),
            bar.timestamp.to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            bar.vwap.map(|v| v.to_string()).unwrap_or_default(),
            bar.transactions.map(|n| n.to_string()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
