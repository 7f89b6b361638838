//! Wi-Fi credentials and the TLS transport used for the download.

pub mod tls;

/// Wi-Fi credentials, baked in at build time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl WifiConfig {
    pub const fn new(ssid: &'static str, password: &'static str) -> Self {
        Self { ssid, password }
    }
}
