pub mod active;
pub mod breakdowns;
pub(crate) mod filters;
pub mod overview;
pub mod timeseries;
