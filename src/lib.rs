pub mod client;
pub mod cmd;
pub mod config;
pub mod connection;
pub mod frame;
pub mod server;
pub mod service;
pub mod store;
pub mod telemetry;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const DEFAULT_PORT: u16 = 5500;

/*
    Request lifecycle:

    Listener -> Handler (one task per socket) -> Command -> InventoryService
    -> InventoryStore, and the response travels back the same way.

    - Frames are bare JSON objects; the connection buffers bytes until one
      complete object is present, so partial and coalesced reads both work.
    - Store failures never kill a connection: they come back as
      `success: false` with an `error` field.
    - Malformed frames only close the offending connection.
*/
