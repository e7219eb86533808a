pub mod position_sizing;
pub mod price;
pub mod tick;
