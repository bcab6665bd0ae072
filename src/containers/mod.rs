/// Provides the identifier-and-time-sorted container.
pub mod sorted;

/// Provides the state map, a named scalar map tagged with a time and an
/// availability time.
pub mod state_map;

pub use self::sorted::{ContainerEntry, TimeSortedContainer};
pub use self::state_map::StateMap;
