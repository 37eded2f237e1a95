pub mod api;
pub mod config;
pub mod diff;
pub mod logging;
pub mod markdown;
pub mod state;
pub mod stream;
pub mod terminal;
pub mod types;
pub mod ui;
pub mod util;

#[cfg(test)]
pub mod test_support;
