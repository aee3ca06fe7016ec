//! Adapters for the checkout collaborators.
pub mod memory;
pub mod nats;
pub mod postgres;

pub use memory::{InMemoryCartStore, InMemoryOrderGateway};
pub use nats::{NatsEventPublisher, NoopEventPublisher};
pub use postgres::{PgCartStore, PgOrderGateway};
