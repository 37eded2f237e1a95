mod core;
mod flush;
mod state;

#[cfg(test)]
mod tests;

pub use state::SegmentTracker;
