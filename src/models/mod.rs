// Re-export model modules
mod aggregates;
mod news;

pub use aggregates::*;
pub use news::*;
