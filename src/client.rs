use std::io;
use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::cmd::{
    AddInventoryItems, ListInventory, ListInventoryItems, NewInventory, Request, Response,
};
use crate::connection::{Connection, ConnectionError};
use crate::frame::{self, Frame};
use crate::service::{InventoryRecord, ItemRecord};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("problem connecting to the server: {0}")]
    Connect(#[source] io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] frame::Error),

    #[error("server closed the connection")]
    Closed,

    /// The server answered with `success: false`.
    #[error("{operation} failed: {message}")]
    Server { operation: String, message: String },

    #[error("unexpected result for {operation}: {source}")]
    UnexpectedResult {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

const CLIENT_TARGET: &str = "home_inventory::client";

impl ClientError {
    /// True when the server is gone from this socket, e.g. after closing an
    /// idle connection, as opposed to having rejected the request.
    fn is_disconnect(&self) -> bool {
        use io::ErrorKind::{BrokenPipe, ConnectionAborted, ConnectionReset};

        match self {
            ClientError::Closed | ClientError::Connection(ConnectionError::Reset) => true,
            ClientError::Io(err) | ClientError::Connection(ConnectionError::Io(err)) => {
                matches!(err.kind(), BrokenPipe | ConnectionAborted | ConnectionReset)
            }
            _ => false,
        }
    }
}

/// Async client for the inventory protocol. One request is in flight at a
/// time; each call waits for its response.
///
/// If the server has hung up in the meantime (the server closes idle
/// connections) the request is sent once more over a fresh connection.
pub struct Client {
    addr: SocketAddr,
    connection: Connection,
}

impl Client {
    pub async fn connect<T: ToSocketAddrs>(addr: T) -> Result<Client, ClientError> {
        let socket = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        let addr = socket.peer_addr().map_err(ClientError::Connect)?;
        let connection = Connection::new(socket);

        Ok(Client { addr, connection })
    }

    pub async fn new_inventory(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<i64, ClientError> {
        let request = NewInventory::new(name, description).into_request();

        self.call(&request).await
    }

    pub async fn list_inventories(&mut self) -> Result<Vec<InventoryRecord>, ClientError> {
        let request = ListInventory::new().into_request();

        self.call(&request).await
    }

    pub async fn list_inventory_items(
        &mut self,
        inventory_id: i64,
    ) -> Result<Vec<ItemRecord>, ClientError> {
        let request = ListInventoryItems::new(inventory_id).into_request();

        self.call(&request).await
    }

    pub async fn add_inventory_item(
        &mut self,
        inventory_id: i64,
        name: &str,
        count: i64,
    ) -> Result<i64, ClientError> {
        let request = AddInventoryItems::new(inventory_id, name, count).into_request();

        self.call(&request).await
    }

    /// Sends any request and returns the raw response envelope, whatever its
    /// `success` flag says.
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        let frame = Frame::from_message(request)?;

        match self.exchange(&frame).await {
            Err(err) if err.is_disconnect() => {
                debug!(target: CLIENT_TARGET, addr = %self.addr, error = %err, "reconnecting");

                self.reconnect().await?;
                self.exchange(&frame).await
            }
            res => res,
        }
    }

    async fn exchange(&mut self, frame: &Frame) -> Result<Response, ClientError> {
        self.connection.write_frame(frame).await?;

        self.read_response().await
    }

    async fn reconnect(&mut self) -> Result<(), ClientError> {
        let socket = TcpStream::connect(self.addr)
            .await
            .map_err(ClientError::Connect)?;
        self.connection = Connection::new(socket);

        Ok(())
    }

    async fn call<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T, ClientError> {
        let response = self.send(request).await?;

        if !response.success {
            return Err(ClientError::Server {
                operation: response.requested_func,
                message: response
                    .error
                    .unwrap_or_else(|| "operation not recognised by the server".to_string()),
            });
        }

        serde_json::from_value(response.result).map_err(|source| ClientError::UnexpectedResult {
            operation: response.requested_func,
            source,
        })
    }

    async fn read_response(&mut self) -> Result<Response, ClientError> {
        let frame = match self.connection.read_frame().await? {
            Some(frame) => frame,
            None => return Err(ClientError::Closed),
        };

        frame
            .decode()
            .map_err(|source| ClientError::UnexpectedResult {
                operation: "response".to_string(),
                source,
            })
    }
}
