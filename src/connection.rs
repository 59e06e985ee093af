use std::io::{self, Cursor};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::frame::{self, Frame, Scan};

/// Size of the initial read buffer. Larger frames grow it on demand, up to
/// `frame::MAX_FRAME_BYTES`.
const READ_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection reset by peer")]
    Reset,

    #[error(transparent)]
    Frame(#[from] frame::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads and writes JSON frames on a single socket.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    // Progress on the frame at the front of `buffer`.
    scan: Scan,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            scan: Scan::default(),
        }
    }

    /// Waits for the next complete frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly, i.e.
    /// without leaving a half-sent frame behind.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if frame::is_blank(&self.buffer) {
                    return Ok(None);
                } else {
                    return Err(ConnectionError::Reset);
                }
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        use frame::Error::Incomplete;

        let mut buf = Cursor::new(&self.buffer[..]);

        match Frame::parse_resuming(&mut buf, &mut self.scan) {
            Ok(frame) => {
                let len = buf.position() as usize;

                self.buffer.advance(len);

                Ok(Some(frame))
            }
            Err(Incomplete) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.stream.write_all(frame.as_bytes()).await?;

        self.stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn socket_pair() -> (TcpStream, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        (client, Connection::new(server))
    }

    #[tokio::test]
    async fn reads_frame_sent_in_pieces() {
        let (mut client, mut conn) = socket_pair().await;

        let writer = tokio::spawn(async move {
            client.write_all(br#"{"requested_func":"#).await.unwrap();
            client.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            client.write_all(br#""list_inventory"}"#).await.unwrap();
            client
        });

        let frame = conn.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.as_bytes(), br#"{"requested_func":"list_inventory"}"#);

        drop(writer.await.unwrap());
        assert!(conn.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_coalesced_frames_in_order() {
        let (mut client, mut conn) = socket_pair().await;

        client.write_all(b"{\"n\":1}\n{\"n\":2}\n").await.unwrap();
        drop(client);

        let first = conn.read_frame().await.unwrap().unwrap();
        let second = conn.read_frame().await.unwrap().unwrap();

        assert_eq!(first.as_bytes(), br#"{"n":1}"#);
        assert_eq!(second.as_bytes(), br#"{"n":2}"#);
        assert!(conn.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn half_sent_frame_is_a_reset() {
        let (mut client, mut conn) = socket_pair().await;

        client.write_all(br#"{"requested_func":"#).await.unwrap();
        drop(client);

        assert!(matches!(
            conn.read_frame().await,
            Err(ConnectionError::Reset)
        ));
    }

    #[tokio::test]
    async fn written_frame_arrives_verbatim() {
        let (mut client, mut conn) = socket_pair().await;

        let frame = Frame::from_message(&serde_json::json!({"success": true})).unwrap();
        conn.write_frame(&frame).await.unwrap();
        drop(conn);

        let mut received = vec![];
        client.read_to_end(&mut received).await.unwrap();

        assert_eq!(received, br#"{"success":true}"#);
    }

    #[tokio::test]
    async fn frame_trickled_byte_by_byte_is_read_once() {
        let (mut client, mut conn) = socket_pair().await;
        let request = br#"{"requested_func":"list_inventory","options":{"note":"}"}}"#;

        let writer = tokio::spawn(async move {
            for byte in request.iter() {
                client.write_all(&[*byte]).await.unwrap();
                client.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            client.write_all(b"{\"n\":2}").await.unwrap();
            client
        });

        let first = conn.read_frame().await.unwrap().unwrap();
        let second = conn.read_frame().await.unwrap().unwrap();

        assert_eq!(first.as_bytes(), &request[..]);
        assert_eq!(second.as_bytes(), br#"{"n":2}"#);
        assert_eq!(conn.scan.scanned(), 0);

        drop(writer.await.unwrap());
        assert!(conn.read_frame().await.unwrap().is_none());
    }
}
