// csm-api: Async Rust clients for the CSM System Layout Service (SLS)
// and Boot Script Service (BSS).

pub mod bss;
pub mod client;
pub mod error;
pub mod sls;
pub mod transport;

pub use bss::client::{BssClient, UpsertMethod};
pub use bss::models::{BootParameterRecord, CloudInit, IpamEntry, MetaData};
pub use error::Error;
pub use sls::client::SlsClient;
pub use sls::models::{
    DumpState, IpReservation, NetworkDescriptor, NetworkProperties, SubnetDescriptor,
};
pub use transport::{RetryPolicy, TlsMode, TransportConfig};
