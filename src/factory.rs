//! Venue name to adapter construction

use crate::exchange::{
    BinanceAdapter, BinanceFuturesAdapter, BybitAdapter, BybitCategory, CoinbaseAdapter,
    Exchange, ExchangeName, KrakenAdapter,
};

/// Build the adapter for a venue, bound to one symbol
pub fn new_exchange(name: ExchangeName, symbol: &str) -> Box<dyn Exchange> {
    match name {
        ExchangeName::Binance => Box::new(BinanceAdapter::new(symbol)),
        ExchangeName::BinanceFutures => Box::new(BinanceFuturesAdapter::new(symbol)),
        ExchangeName::Bybit => Box::new(BybitAdapter::new(symbol, BybitCategory::Spot)),
        ExchangeName::BybitFutures => Box::new(BybitAdapter::new(symbol, BybitCategory::Linear)),
        ExchangeName::Coinbase => Box::new(CoinbaseAdapter::new(symbol)),
        ExchangeName::Kraken => Box::new(KrakenAdapter::new(symbol)),
    }
}
