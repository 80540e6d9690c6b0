pub mod auto_switch;
pub mod catalog;
pub mod context;
pub mod tester;
pub mod timer;
pub mod traffic;

pub use self::context::{AppContext, Runtime};
