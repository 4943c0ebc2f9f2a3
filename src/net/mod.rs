pub mod nmcli;
pub mod wifi;

pub use nmcli::NmcliManager;
pub use wifi::{connect_with_retry, NetworkManager, WifiConnection, WifiSession};
