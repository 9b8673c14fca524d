// ABOUTME: Command implementations for the cloning tool
// ABOUTME: Exports the clone and verify commands

pub mod clone;
pub mod verify;

pub use clone::clone;
pub use verify::verify;
