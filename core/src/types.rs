//! Shared primitive types used across the whole bot core.

/// Opaque, stable identifier of a bot user (the platform chat id as text).
pub type UserId = String;

/// Identifier of a gated channel, e.g. `@my_channel`.
pub type ChannelId = String;

/// Monetary units and spin counts. Unsigned so nothing can go negative.
pub type Amount = u64;
