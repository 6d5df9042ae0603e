// System Layout Service: networks, subnets and IP reservations.

pub mod client;
pub mod models;
