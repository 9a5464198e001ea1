//! Streaming market-data client.
//!
//! Maintains a persistent full-duplex subscription to the market channel,
//! reconciles the asset set, decodes the four inbound event kinds, keeps
//! per-asset top-of-book state, and emits normalized `PriceUpdate` batches
//! downstream through a typed sink.

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod normalize;
pub mod stats;
pub mod subscription;

pub use connection::{ConnectionManager, ConnectionState, FeedEvent, StreamConfig};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatManager;
pub use message::{decode_frame, subscribe_frame, unsubscribe_frame, RawEvent};
pub use normalize::Normalizer;
pub use stats::{StreamStats, StreamStatsSnapshot};
pub use subscription::{SubscriptionDiff, SubscriptionSet};
