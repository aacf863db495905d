//! Guest lifecycle: status model and the controller driving it.

mod controller;
mod state;

pub use controller::LifecycleController;
pub use state::LifecycleStatus;
