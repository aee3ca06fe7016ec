//! Checkout domain: value objects, settings, aggregates, events and ports.
pub mod aggregates;
pub mod events;
pub mod ports;
pub mod settings;
pub mod value_objects;
