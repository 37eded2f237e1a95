pub mod provider;

pub use provider::{ProviderError, ProviderEvent, SubagentEvent};
