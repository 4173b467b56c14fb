//! Event mirroring for tether

pub mod bus;

pub use bus::{BusSubscription, InboundEvent, LocalBus, matches_pattern};
