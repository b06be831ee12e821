mod channel_sink;
mod routes;

pub use channel_sink::ChannelSink;
pub use routes::{bind, routes};
