pub mod active;
pub mod breakdown;
pub mod filter_options;
pub mod health;
pub mod overview;
pub mod query;
pub mod timeseries;
pub mod track;
