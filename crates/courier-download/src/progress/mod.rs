//! Progress parsing and aggregation.

pub mod model;
pub mod parse;

pub use model::{AggregateInput, AggregateView, recompute};
pub use parse::{LineProgress, parse_line, parse_size, parse_speed};
