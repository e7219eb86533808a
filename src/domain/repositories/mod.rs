pub mod broker_adapter;
pub mod store;
pub mod trading_state;
