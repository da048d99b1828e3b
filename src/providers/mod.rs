pub mod binance;
pub mod coingecko;
pub mod util;

pub use binance::BinanceProvider;
pub use coingecko::CoinGeckoProvider;
