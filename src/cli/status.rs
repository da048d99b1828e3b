use super::ui;
use crate::market::{AdapterStatus, MarketDataService};
use anyhow::Result;
use comfy_table::{Cell, Color};

pub fn display_status(status: &AdapterStatus, cache_store: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Role"),
        ui::header_cell("Provider"),
        ui::header_cell("Status"),
    ]);
    for (role, provider) in [("Primary", &status.primary), ("Fallback", &status.fallback)] {
        let state = if provider.available {
            Cell::new("available").fg(Color::Green)
        } else {
            Cell::new("unreachable").fg(Color::Red)
        };
        table.add_row(vec![Cell::new(role), Cell::new(&provider.name), state]);
    }

    let mut output = table.to_string();
    if status.active_fallback {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text("Serving from the fallback provider", ui::StyleType::Error)
        ));
    }
    output.push_str(&format!(
        "\n\n{}",
        ui::style_text(&format!("Volatile cache: {cache_store}"), ui::StyleType::Subtle)
    ));
    output
}

pub async fn run(service: &MarketDataService) -> Result<()> {
    let status = service.get_adapter_status().await;
    println!("{}", display_status(&status, service.cache().volatile_name()));
    Ok(())
}
