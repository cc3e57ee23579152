// Domain layer - Pure data shaping for the generation dashboard
pub mod calendar;
pub mod catalog;
pub mod pivot;
pub mod range;
pub mod site;
pub mod time_series;
pub mod totals;
