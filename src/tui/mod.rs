pub mod app;
pub mod events;
pub mod rendering;
pub mod types;

#[cfg(test)]
mod tests;

pub use rendering::run_tui;
