// Boot Script Service: per-node boot parameters and cloud-init data.

pub mod client;
pub mod models;
