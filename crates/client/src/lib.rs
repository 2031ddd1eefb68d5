// roomline-client: the client half of the marketplace chat subsystem.
//
// One [`session::SocketSession`] owns the app's single WebSocket; the
// [`hub::SubscriptionHub`] multiplexes its events to any number of UI
// screens; the [`cache::OfflineCache`] keeps a bounded, durable buffer
// of inbound messages for screens that are not currently mounted.

pub mod cache;
pub mod config;
pub mod hub;
pub mod presence;
pub mod session;
