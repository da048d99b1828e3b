use super::ui;
use crate::core::config::Portfolio;
use crate::core::quote::normalize_symbol;
use crate::core::valuation::{self, Holding, PortfolioValuation};
use crate::market::MarketDataService;
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::collections::HashMap;
use tracing::warn;

impl PortfolioValuation {
    pub fn display_as_table(&self, name: &str) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Holding"),
            ui::header_cell("Quantity"),
            ui::header_cell("Avg cost"),
            ui::header_cell("Price"),
            ui::header_cell("Value"),
            ui::header_cell("Gain/Loss"),
            ui::header_cell("Gain/Loss (%)"),
            ui::header_cell("24h"),
            ui::header_cell("Weight (%)"),
        ]);

        for holding in &self.holdings {
            let mut row = vec![
                Cell::new(&holding.symbol),
                ui::right_cell(holding.quantity.normalize().to_string()),
                ui::right_cell(ui::format_price(holding.average_cost)),
            ];
            if holding.has_quote {
                row.extend([
                    ui::right_cell(ui::format_price(holding.current_price)),
                    ui::right_cell(ui::format_amount(holding.current_value)),
                    ui::amount_change_cell(holding.gain_loss_amount),
                    ui::change_cell(holding.gain_loss_percent),
                    ui::change_cell(holding.price_change_24h),
                ]);
            } else {
                row.push(ui::na_cell(true));
                row.extend((0..4).map(|_| ui::na_cell(false)));
            }
            row.push(ui::right_cell(format!(
                "{}%",
                ui::format_amount(holding.allocation_percent)
            )));
            table.add_row(row);
        }

        let mut output = format!(
            "Portfolio: {}\n\n{}\n\n",
            ui::style_text(name, ui::StyleType::Title),
            table
        );
        output.push_str(&format!(
            "{}: {}\n{}: {}\n{}: {} ({}%)\n{}: {}",
            ui::style_text("Total Value", ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_amount(self.total_value), ui::StyleType::TotalValue),
            ui::style_text("Cost Basis", ui::StyleType::TotalLabel),
            ui::format_amount(self.total_cost_basis),
            ui::style_text("Gain/Loss", ui::StyleType::TotalLabel),
            ui::format_amount(self.total_gain_loss),
            ui::format_amount(self.total_gain_loss_percent),
            ui::style_text("24h Change", ui::StyleType::TotalLabel),
            ui::format_amount(self.change_24h_amount),
        ));
        if !self.unpriced_cost_basis.is_zero() {
            output.push_str(&format!(
                "\n{}: {}",
                ui::style_text("Unpriced cost basis", ui::StyleType::Subtle),
                ui::format_amount(self.unpriced_cost_basis),
            ));
        }

        let highlights = [
            ("Best performer", &self.best_performer, false),
            ("Worst performer", &self.worst_performer, false),
            ("Largest holding", &self.largest_holding, true),
        ];
        for (label, holding, by_weight) in highlights {
            if let Some(h) = holding {
                let value = if by_weight {
                    h.allocation_percent
                } else {
                    h.gain_loss_percent
                };
                output.push_str(&format!(
                    "\n{}: {} ({}%)",
                    ui::style_text(label, ui::StyleType::Subtle),
                    h.symbol,
                    ui::format_amount(value)
                ));
            }
        }
        output
    }
}

/// Holdings with canonical symbols, so they line up with quote keys.
fn normalized_holdings(portfolio: &Portfolio) -> Result<Vec<Holding>> {
    portfolio
        .holdings
        .iter()
        .map(|h| {
            Ok(Holding {
                symbol: normalize_symbol(&h.symbol).with_context(|| {
                    format!("Invalid holding in portfolio {}", portfolio.name)
                })?,
                ..h.clone()
            })
        })
        .collect()
}

pub async fn run(service: &MarketDataService, portfolios: &[Portfolio]) -> Result<()> {
    if portfolios.iter().all(|p| p.holdings.is_empty()) {
        println!("No holdings found in the configured portfolios.");
        return Ok(());
    }

    let pb = ui::new_progress_bar(portfolios.len() as u64, true);
    let mut outputs = Vec::with_capacity(portfolios.len());
    for portfolio in portfolios {
        pb.set_message(portfolio.name.clone());
        let holdings = normalized_holdings(portfolio)?;
        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let quotes = if symbols.is_empty() {
            HashMap::new()
        } else {
            match service.get_multiple_prices(&symbols).await {
                Ok(quotes) => quotes,
                Err(e) => {
                    // Value what we can; unpriced holdings show as N/A.
                    warn!(portfolio = %portfolio.name, error = %e, "Failed to fetch prices");
                    HashMap::new()
                }
            }
        };
        let valuation = valuation::value_portfolio(&holdings, &quotes);
        outputs.push(valuation.display_as_table(&portfolio.name));
        pb.inc(1);
    }
    pb.finish_and_clear();

    for (i, output) in outputs.iter().enumerate() {
        if i > 0 {
            ui::print_separator();
        }
        println!("{output}");
    }
    Ok(())
}
