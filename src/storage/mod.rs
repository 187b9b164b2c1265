pub mod memory;
pub mod pattern;

pub use memory::{InMemoryTransport, StatusCounters};
pub use pattern::glob_match;
