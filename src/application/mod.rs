//! Application layer: the quote-to-order pipeline and the actors that drive it

pub mod actors;
pub mod events;
pub mod pipeline;
