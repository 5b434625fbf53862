//! Utility modules for the scanner

pub mod ports;
pub mod target;

pub use ports::parse_ports;
pub use target::resolve_target;
