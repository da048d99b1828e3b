//! Holding and portfolio valuation over exact decimals.
//!
//! Everything here is pure: callers hand in holdings and the quotes they
//! already fetched. Missing or zero inputs produce zero values, never errors.
use crate::core::quote::Quote;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Colours handed out to allocation entries by position.
pub const PALETTE: [&str; 10] = [
    "#F7931A", "#627EEA", "#26A17B", "#F3BA2F", "#9945FF", "#23292F", "#2775CA", "#0033AD",
    "#C2A633", "#E6007A",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

impl Holding {
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GainLoss {
    pub amount: Decimal,
    pub percent: Decimal,
    pub is_profit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationEntry {
    pub symbol: String,
    pub value: Decimal,
    pub percent: Decimal,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuedHolding {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub cost_basis: Decimal,
    pub gain_loss_amount: Decimal,
    pub gain_loss_percent: Decimal,
    pub allocation_percent: Decimal,
    pub price_change_24h: Decimal,
    /// False when no quote was available. Price, value and gain/loss are then
    /// zero and the holding is left out of totals and rankings.
    pub has_quote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioValuation {
    pub holdings: Vec<ValuedHolding>,
    pub total_value: Decimal,
    /// Cost basis of the priced holdings.
    pub total_cost_basis: Decimal,
    /// Cost basis of holdings without a quote, kept out of the gain/loss.
    pub unpriced_cost_basis: Decimal,
    pub total_gain_loss: Decimal,
    pub total_gain_loss_percent: Decimal,
    /// Value gained or lost over the last 24 hours across priced holdings.
    pub change_24h_amount: Decimal,
    pub best_performer: Option<ValuedHolding>,
    pub worst_performer: Option<ValuedHolding>,
    pub largest_holding: Option<ValuedHolding>,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `part` as a percentage of `whole`, rounded to 2 places; zero when `whole`
/// is zero.
fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        round2(part / whole * Decimal::ONE_HUNDRED)
    }
}

pub fn gain_loss(quantity: Decimal, average_cost: Decimal, current_price: Decimal) -> GainLoss {
    let cost_basis = quantity * average_cost;
    let amount = quantity * current_price - cost_basis;
    GainLoss {
        amount,
        percent: percent_of(amount, cost_basis),
        is_profit: amount >= Decimal::ZERO,
    }
}

/// Splits the combined value of `holdings` by holding. A symbol without a
/// price counts as zero value.
pub fn allocate(holdings: &[Holding], prices: &HashMap<String, Decimal>) -> Vec<AllocationEntry> {
    let values: Vec<Decimal> = holdings
        .iter()
        .map(|h| h.quantity * prices.get(&h.symbol).copied().unwrap_or_default())
        .collect();
    let total: Decimal = values.iter().sum();

    holdings
        .iter()
        .zip(values)
        .enumerate()
        .map(|(index, (holding, value))| AllocationEntry {
            symbol: holding.symbol.clone(),
            value,
            percent: percent_of(value, total),
            color: PALETTE[index % PALETTE.len()],
        })
        .collect()
}

/// Values a single holding. Allocation is left at zero; it only has meaning
/// within a portfolio.
pub fn value_holding(holding: &Holding, quote: Option<&Quote>) -> ValuedHolding {
    let current_price = quote.map(|q| q.price).unwrap_or_default();
    let gl = match quote {
        Some(_) => gain_loss(holding.quantity, holding.average_cost, current_price),
        None => GainLoss {
            amount: Decimal::ZERO,
            percent: Decimal::ZERO,
            is_profit: true,
        },
    };

    ValuedHolding {
        symbol: holding.symbol.clone(),
        quantity: holding.quantity,
        average_cost: holding.average_cost,
        current_price,
        current_value: holding.quantity * current_price,
        cost_basis: holding.cost_basis(),
        gain_loss_amount: gl.amount,
        gain_loss_percent: gl.percent,
        allocation_percent: Decimal::ZERO,
        price_change_24h: quote.map(|q| q.change_24h).unwrap_or_default(),
        has_quote: quote.is_some(),
    }
}

/// Value moved over 24h for a holding now worth `value` after a
/// `change_percent` move.
fn change_amount(value: Decimal, change_percent: Decimal) -> Decimal {
    let factor = Decimal::ONE + change_percent / Decimal::ONE_HUNDRED;
    if factor.is_zero() {
        return Decimal::ZERO;
    }
    value - value / factor
}

/// First element with the greatest key; later equal keys do not replace it.
fn first_max_by<'a, T: 'a, K: PartialOrd>(
    items: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&T) -> K,
) -> Option<&'a T> {
    let mut best: Option<(&T, K)> = None;
    for item in items {
        let k = key(item);
        if best.as_ref().is_none_or(|(_, current)| k > *current) {
            best = Some((item, k));
        }
    }
    best.map(|(item, _)| item)
}

pub fn value_portfolio(holdings: &[Holding], quotes: &HashMap<String, Quote>) -> PortfolioValuation {
    let mut valued: Vec<ValuedHolding> = holdings
        .iter()
        .map(|h| value_holding(h, quotes.get(&h.symbol)))
        .collect();

    let total_value: Decimal = valued.iter().map(|v| v.current_value).sum();
    let (mut total_cost_basis, mut unpriced_cost_basis) = (Decimal::ZERO, Decimal::ZERO);
    for v in &valued {
        if v.has_quote {
            total_cost_basis += v.cost_basis;
        } else {
            unpriced_cost_basis += v.cost_basis;
        }
    }
    for v in valued.iter_mut() {
        v.allocation_percent = percent_of(v.current_value, total_value);
    }

    let total_gain_loss = total_value - total_cost_basis;
    let change_24h_amount: Decimal = valued
        .iter()
        .filter(|v| v.has_quote)
        .map(|v| change_amount(v.current_value, v.price_change_24h))
        .sum();

    let priced = || valued.iter().filter(|v| v.has_quote);
    let best_performer = first_max_by(priced(), |v| v.gain_loss_percent).cloned();
    let worst_performer = first_max_by(priced(), |v| -v.gain_loss_percent).cloned();
    let largest_holding = first_max_by(priced(), |v| v.allocation_percent).cloned();

    PortfolioValuation {
        total_gain_loss_percent: percent_of(total_gain_loss, total_cost_basis),
        holdings: valued,
        total_value,
        total_cost_basis,
        unpriced_cost_basis,
        total_gain_loss,
        change_24h_amount,
        best_performer,
        worst_performer,
        largest_holding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn holding(symbol: &str, quantity: Decimal, average_cost: Decimal) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            quantity,
            average_cost,
        }
    }

    fn quote(symbol: &str, price: Decimal, change_24h: Decimal) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            price,
            change_1h: None,
            change_24h,
            change_7d: None,
            change_30d: None,
            volume_24h: Decimal::ZERO,
            market_cap: Decimal::ZERO,
            high_24h: None,
            low_24h: None,
            observed_at: Utc::now(),
            source: "TEST".to_string(),
        }
    }

    #[test]
    fn test_gain_loss() {
        let gl = gain_loss(dec!(1), dec!(40000), dec!(50000));
        assert_eq!(gl.amount, dec!(10000));
        assert_eq!(gl.percent, dec!(25.00));
        assert!(gl.is_profit);

        let loss = gain_loss(dec!(2), dec!(100), dec!(75));
        assert_eq!(loss.amount, dec!(-50));
        assert_eq!(loss.percent, dec!(-25));
        assert!(!loss.is_profit);

        // Break-even counts as profit
        assert!(gain_loss(dec!(3), dec!(10), dec!(10)).is_profit);
    }

    #[test]
    fn test_gain_loss_zero_cost_basis() {
        let gl = gain_loss(dec!(1), dec!(0), dec!(50000));
        assert_eq!(gl.amount, dec!(50000));
        assert_eq!(gl.percent, Decimal::ZERO);
        assert!(gl.is_profit);
    }

    #[test]
    fn test_gain_loss_percent_rounding() {
        // 1/3 gain -> 33.333...%
        assert_eq!(gain_loss(dec!(1), dec!(3), dec!(4)).percent, dec!(33.33));
        // 0.125 -> midpoint rounds away from zero
        assert_eq!(gain_loss(dec!(1), dec!(800), dec!(801)).percent, dec!(0.13));
        assert_eq!(gain_loss(dec!(1), dec!(800), dec!(799)).percent, dec!(-0.13));
    }

    #[test]
    fn test_allocate() {
        let holdings = vec![
            holding("BTC", dec!(1), dec!(0)),
            holding("ETH", dec!(10), dec!(0)),
        ];
        let prices = HashMap::from([
            ("BTC".to_string(), dec!(50000)),
            ("ETH".to_string(), dec!(3000)),
        ]);
        let entries = allocate(&holdings, &prices);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol, "BTC");
        assert_eq!(entries[0].value, dec!(50000));
        assert_eq!(entries[0].percent, dec!(62.50));
        assert_eq!(entries[1].symbol, "ETH");
        assert_eq!(entries[1].percent, dec!(37.50));
        let sum: Decimal = entries.iter().map(|e| e.percent).sum();
        assert!((sum - dec!(100)).abs() <= dec!(0.01));

        // Colours are stable for the same order
        assert_eq!(entries[0].color, PALETTE[0]);
        assert_eq!(allocate(&holdings, &prices), entries);
    }

    #[test]
    fn test_allocate_edge_cases() {
        assert!(allocate(&[], &HashMap::new()).is_empty());

        let holdings = vec![holding("BTC", dec!(1), dec!(1)), holding("XYZ", dec!(5), dec!(1))];
        let entries = allocate(&holdings, &HashMap::new());
        assert!(entries.iter().all(|e| e.percent.is_zero() && e.value.is_zero()));

        let prices = HashMap::from([("BTC".to_string(), dec!(10))]);
        let entries = allocate(&holdings, &prices);
        assert_eq!(entries[0].percent, dec!(100));
        assert_eq!(entries[1].percent, dec!(0));
    }

    #[test]
    fn test_palette_cycles() {
        let holdings: Vec<Holding> = (0..12)
            .map(|i| holding(&format!("C{i}"), dec!(1), dec!(1)))
            .collect();
        let entries = allocate(&holdings, &HashMap::new());
        assert_eq!(entries[10].color, entries[0].color);
        assert_eq!(entries[11].color, entries[1].color);
    }

    #[test]
    fn test_value_holding() {
        let h = holding("BTC", dec!(0.5), dec!(30000));
        let valued = value_holding(&h, Some(&quote("BTC", dec!(40000), dec!(-2.5))));
        assert_eq!(valued.current_value, dec!(20000));
        assert_eq!(valued.cost_basis, dec!(15000));
        assert_eq!(valued.gain_loss_amount, dec!(5000));
        assert_eq!(valued.gain_loss_percent, dec!(33.33));
        assert_eq!(valued.price_change_24h, dec!(-2.5));
        assert_eq!(valued.allocation_percent, Decimal::ZERO);
        assert!(valued.has_quote);

        let unpriced = value_holding(&h, None);
        assert!(!unpriced.has_quote);
        assert_eq!(unpriced.current_value, Decimal::ZERO);
        assert_eq!(unpriced.cost_basis, dec!(15000));
        assert_eq!(unpriced.gain_loss_amount, Decimal::ZERO);
        assert_eq!(unpriced.gain_loss_percent, Decimal::ZERO);
    }

    #[test]
    fn test_value_portfolio() {
        let holdings = vec![
            holding("BTC", dec!(1), dec!(40000)),
            holding("ETH", dec!(10), dec!(3000)),
            holding("SOL", dec!(100), dec!(50)),
        ];
        let quotes = HashMap::from([
            ("BTC".to_string(), quote("BTC", dec!(50000), dec!(25))),
            ("ETH".to_string(), quote("ETH", dec!(3000), dec!(0))),
        ]);
        let valuation = value_portfolio(&holdings, &quotes);

        assert_eq!(valuation.total_value, dec!(80000));
        assert_eq!(valuation.total_cost_basis, dec!(70000));
        assert_eq!(valuation.unpriced_cost_basis, dec!(5000));
        assert_eq!(valuation.total_gain_loss, dec!(10000));
        assert_eq!(valuation.total_gain_loss_percent, dec!(14.29));
        assert_eq!(valuation.holdings[0].allocation_percent, dec!(62.50));
        assert_eq!(valuation.holdings[1].allocation_percent, dec!(37.50));
        assert_eq!(valuation.holdings[2].allocation_percent, dec!(0));
        // 50000 after +25% was 40000 a day ago
        assert_eq!(valuation.change_24h_amount, dec!(10000));

        assert_eq!(valuation.best_performer.unwrap().symbol, "BTC");
        // SOL has no quote and is not ranked
        assert_eq!(valuation.worst_performer.unwrap().symbol, "ETH");
        assert_eq!(valuation.largest_holding.unwrap().symbol, "BTC");
    }

    #[test]
    fn test_unpriced_holding_is_not_a_loss() {
        let holdings = vec![
            holding("BTC", dec!(1), dec!(40000)),
            holding("ETH", dec!(1), dec!(3000)),
        ];
        let quotes = HashMap::from([("BTC".to_string(), quote("BTC", dec!(30000), dec!(0)))]);
        let valuation = value_portfolio(&holdings, &quotes);

        assert_eq!(valuation.total_gain_loss, dec!(-10000));
        assert_eq!(valuation.total_gain_loss_percent, dec!(-25));
        assert_eq!(valuation.unpriced_cost_basis, dec!(3000));
        assert_eq!(valuation.worst_performer.unwrap().symbol, "BTC");
        assert_eq!(valuation.best_performer.unwrap().symbol, "BTC");

        let nothing_priced = value_portfolio(&holdings, &HashMap::new());
        assert_eq!(nothing_priced.total_gain_loss, Decimal::ZERO);
        assert_eq!(nothing_priced.unpriced_cost_basis, dec!(43000));
        assert!(nothing_priced.best_performer.is_none());
        assert!(nothing_priced.worst_performer.is_none());
        assert!(nothing_priced.largest_holding.is_none());
    }

    #[test]
    fn test_value_portfolio_ties_keep_first() {
        let holdings = vec![
            holding("AAA", dec!(1), dec!(10)),
            holding("BBB", dec!(1), dec!(10)),
        ];
        let quotes = HashMap::from([
            ("AAA".to_string(), quote("AAA", dec!(10), dec!(0))),
            ("BBB".to_string(), quote("BBB", dec!(10), dec!(0))),
        ]);
        let valuation = value_portfolio(&holdings, &quotes);
        assert_eq!(valuation.best_performer.unwrap().symbol, "AAA");
        assert_eq!(valuation.worst_performer.unwrap().symbol, "AAA");
        assert_eq!(valuation.largest_holding.unwrap().symbol, "AAA");
    }

    #[test]
    fn test_value_empty_portfolio() {
        let valuation = value_portfolio(&[], &HashMap::new());
        assert!(valuation.holdings.is_empty());
        assert_eq!(valuation.total_value, Decimal::ZERO);
        assert_eq!(valuation.total_gain_loss_percent, Decimal::ZERO);
        assert_eq!(valuation.change_24h_amount, Decimal::ZERO);
        assert!(valuation.best_performer.is_none());
        assert!(valuation.worst_performer.is_none());
        assert!(valuation.largest_holding.is_none());
    }
}
