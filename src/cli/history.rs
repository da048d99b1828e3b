use super::ui;
use crate::core::quote::{HistoryPoint, Timeframe};
use crate::market::MarketDataService;
use anyhow::Result;
use comfy_table::Cell;
use rust_decimal::Decimal;

/// Rows shown in the history table; longer series are sampled evenly.
const MAX_ROWS: usize = 24;

/// Picks at most `max` points spread evenly over `points`, always keeping the
/// last one.
fn sample(points: &[HistoryPoint], max: usize) -> Vec<HistoryPoint> {
    if points.len() <= max || max < 2 {
        return points.iter().rev().take(max.max(1)).rev().copied().collect();
    }
    let last = points.len() - 1;
    (0..max).map(|i| points[i * last / (max - 1)]).collect()
}

pub fn display_history(symbol: &str, timeframe: Timeframe, points: &[HistoryPoint]) -> String {
    let title = ui::style_text(&format!("{symbol} ({timeframe})"), ui::StyleType::Title);
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return format!("{title}\n\nNo price history available.");
    };

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Time (UTC)"),
        ui::header_cell("Price"),
        ui::header_cell("Volume"),
    ]);
    for point in sample(points, MAX_ROWS) {
        table.add_row(vec![
            Cell::new(point.timestamp.format("%Y-%m-%d %H:%M")),
            ui::right_cell(ui::format_price(point.price)),
            ui::right_cell(ui::format_amount(point.volume)),
        ]);
    }

    let high = points.iter().map(|p| p.price).max().unwrap_or_default();
    let low = points.iter().map(|p| p.price).min().unwrap_or_default();
    let change = if first.price.is_zero() {
        Decimal::ZERO
    } else {
        (last.price - first.price) / first.price * Decimal::ONE_HUNDRED
    };

    format!(
        "{title}\n\n{table}\n\n{}: {}  {}: {}  {}: {}%  ({} points)",
        ui::style_text("High", ui::StyleType::TotalLabel),
        ui::format_price(high),
        ui::style_text("Low", ui::StyleType::TotalLabel),
        ui::format_price(low),
        ui::style_text("Change", ui::StyleType::TotalLabel),
        ui::format_amount(change),
        points.len()
    )
}

pub async fn run(service: &MarketDataService, symbol: &str, timeframe: Timeframe) -> Result<()> {
    let points = service.get_historical_prices(symbol, timeframe).await?;
    println!(
        "{}",
        display_history(&symbol.trim().to_uppercase(), timeframe, &points)
    );
    Ok(())
}
