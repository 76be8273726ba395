pub mod bridge;
pub mod credentials;
pub mod qr;

pub use bridge::{BridgeClient, BridgeClientFactory};
pub use credentials::FsCredentialStore;
