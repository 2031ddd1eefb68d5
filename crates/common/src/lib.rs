// roomline-common: shared types and wire protocol for the Roomline workspace

pub mod protocol;
pub mod room;
pub mod types;
