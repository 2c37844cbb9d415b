pub mod attach;
pub mod config;
pub mod error;
pub mod input;
pub mod normalize;
pub mod reference;
pub mod resolver;
pub mod roster_index;
pub mod similarity;
pub mod stints;
pub mod store;
pub mod teams;
pub mod unmatched;

pub type PlayerId = i64;
pub type TeamId = i64;
