pub mod candle_builder;
pub mod candle_deriver;
pub mod order_executor;
pub mod position_sizer;
pub mod quote_normalizer;
pub mod signal_ledger;
pub mod strategy_engine;
pub mod trade_execution_error;
pub mod trading_gate;
