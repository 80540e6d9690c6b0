mod store;

pub use store::{Snapshot, Store};
