//! Host-side helpers.

pub mod process;
pub mod terminal;

pub use process::{kill_process, terminate_process};
pub use terminal::RawTerminal;
