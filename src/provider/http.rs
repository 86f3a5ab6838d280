//! Shared HTTP client.
//!
//! One lazily-built client for the whole process so connection pools are
//! reused across provider calls and web tools.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;

pub fn shared_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client")
    })
}
