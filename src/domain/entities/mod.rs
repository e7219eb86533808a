pub mod candle;
pub mod execution;
pub mod imbalance_box;
pub mod order;
pub mod quote;
pub mod signal;
pub mod trade_intent;
