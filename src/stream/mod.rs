pub mod connection;
pub mod multiplexer;
pub mod router;

pub use connection::StreamConnection;
pub use multiplexer::{SubscriptionGuard, SubscriptionMultiplexer};
pub use router::StreamRouter;
