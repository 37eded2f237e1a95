pub mod mock_client;
pub mod provider;
pub mod sse;

pub use mock_client::MockProvider;
pub use provider::{
    provider_stream_from_bytes, provider_stream_from_events, ByteStream, ProviderStream,
};
pub use sse::SseParser;
