//! Public library modules for the CLI crate
pub mod shutdown;
pub mod status;
