//! The local bibliographic store's two faces: read-only search ([`local`],
//! C7) and the write-side REST API ([`api`], C8). Kept in separate modules
//! because they never share a connection — reads go straight at the SQLite
//! file, writes always go through the store's own API so its client can keep
//! holding whatever locks it needs.

pub mod api;
pub mod local;

pub use api::StoreApiClient;
pub use local::{ContainerInfo, LocalStore, StoreItem};
