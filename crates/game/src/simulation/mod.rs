mod tick;

pub use tick::{FixedTimestep, TickLoop};
