use super::ui;
use crate::core::quote::{Quote, normalize_symbol};
use crate::market::MarketDataService;
use anyhow::Result;
use comfy_table::Cell;
use std::collections::HashMap;

/// One row per requested symbol, in request order. Symbols without a quote
/// are listed as N/A.
pub fn display_quotes(symbols: &[String], quotes: &HashMap<String, Quote>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Price"),
        ui::header_cell("24h"),
        ui::header_cell("Volume 24h"),
        ui::header_cell("Source"),
    ]);

    for symbol in symbols {
        match quotes.get(symbol) {
            Some(quote) => {
                table.add_row(vec![
                    Cell::new(&quote.symbol),
                    ui::right_cell(ui::format_price(quote.price)),
                    ui::change_cell(quote.change_24h),
                    ui::right_cell(ui::format_amount(quote.volume_24h)),
                    Cell::new(&quote.source),
                ]);
            }
            None => {
                table.add_row(vec![
                    Cell::new(symbol),
                    ui::na_cell(true),
                    ui::na_cell(false),
                    ui::na_cell(false),
                    Cell::new(""),
                ]);
            }
        }
    }
    table.to_string()
}

pub fn display_market_data(quote: &Quote) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Field"), ui::header_cell("Value")]);

    let change = |value: Option<rust_decimal::Decimal>| {
        value.map_or_else(|| ui::na_cell(false), ui::change_cell)
    };
    table.add_row(vec![Cell::new("Price"), ui::right_cell(ui::format_price(quote.price))]);
    table.add_row(vec![Cell::new("Change 1h"), change(quote.change_1h)]);
    table.add_row(vec![Cell::new("Change 24h"), ui::change_cell(quote.change_24h)]);
    table.add_row(vec![Cell::new("Change 7d"), change(quote.change_7d)]);
    table.add_row(vec![Cell::new("Change 30d"), change(quote.change_30d)]);
    table.add_row(vec![
        Cell::new("High 24h"),
        ui::format_optional_cell(quote.high_24h, ui::format_price),
    ]);
    table.add_row(vec![
        Cell::new("Low 24h"),
        ui::format_optional_cell(quote.low_24h, ui::format_price),
    ]);
    table.add_row(vec![
        Cell::new("Volume 24h"),
        ui::right_cell(ui::format_amount(quote.volume_24h)),
    ]);
    // Zero means the serving provider does not publish a market cap.
    let market_cap = if quote.market_cap.is_zero() {
        ui::na_cell(false)
    } else {
        ui::right_cell(ui::format_amount(quote.market_cap))
    };
    table.add_row(vec![Cell::new("Market cap"), market_cap]);

    format!(
        "{} ({})\n\n{}\n{}",
        ui::style_text(&quote.name, ui::StyleType::Title),
        quote.symbol,
        table,
        ui::style_text(
            &format!(
                "Source: {}, observed {}",
                quote.source,
                quote.observed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            ui::StyleType::Subtle
        )
    )
}

pub async fn run_price(service: &MarketDataService, symbols: &[String]) -> Result<()> {
    if let [symbol] = symbols {
        let quote = service.get_current_price(symbol).await?;
        let symbol = quote.symbol.clone();
        let quotes = HashMap::from([(symbol.clone(), quote)]);
        println!("{}", display_quotes(&[symbol], &quotes));
        return Ok(());
    }

    let quotes = service.get_multiple_prices(symbols).await?;
    let mut ordered = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = normalize_symbol(symbol)?;
        if !ordered.contains(&symbol) {
            ordered.push(symbol);
        }
    }
    println!("{}", display_quotes(&ordered, &quotes));
    Ok(())
}

pub async fn run_market(service: &MarketDataService, symbol: &str) -> Result<()> {
    let quote = service.get_full_market_data(symbol).await?;
    println!("{}", display_market_data(&quote));
    Ok(())
}
