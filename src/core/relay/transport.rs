//! Message-oriented duplex connections used by the relay.
//!
//! Both sides of a session are reduced to a [`Connection`]: a sink and a stream of
//! [`Frame`]s. Ping/pong handling stays inside the websocket libraries.

use std::pin::Pin;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// A single application frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Close,
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text and binary frames carry data; close does not.
    pub fn is_data(&self) -> bool {
        !matches!(self, Frame::Close)
    }

    fn into_axum(self) -> AxumMessage {
        match self {
            Frame::Text(text) => AxumMessage::Text(text.into()),
            Frame::Binary(data) => AxumMessage::Binary(data),
            Frame::Close => AxumMessage::Close(None),
        }
    }

    fn into_tungstenite(self) -> WsMessage {
        match self {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(data) => WsMessage::Binary(data),
            Frame::Close => WsMessage::Close(None),
        }
    }
}

/// Transport-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed")]
    Closed,
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// One side of a relay session.
///
/// A stream that ends without a close frame is treated as a graceful close.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Wraps an upgraded axum websocket (the downstream client).
    pub fn from_axum(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame.into_axum())));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(AxumMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(AxumMessage::Binary(data)) => Some(Ok(Frame::Binary(data))),
                Ok(AxumMessage::Close(_)) => Some(Ok(Frame::Close)),
                Ok(AxumMessage::Ping(_) | AxumMessage::Pong(_)) => None,
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Self::new(sink, stream)
    }

    /// Wraps a tokio-tungstenite websocket (the upstream service, or a test peer).
    pub fn from_tungstenite<S>(socket: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|frame: Frame| {
                future::ready(Ok::<_, TransportError>(frame.into_tungstenite()))
            });

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(WsMessage::Binary(data)) => Some(Ok(Frame::Binary(data))),
                Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => None,
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Self::new(sink, stream)
    }

    /// In-memory duplex pair: frames sent on one end arrive on the other.
    pub fn pair(capacity: usize) -> (Connection, Connection) {
        let (left_tx, right_rx) = mpsc::channel::<Frame>(capacity);
        let (right_tx, left_rx) = mpsc::channel::<Frame>(capacity);
        (
            Self::from_channel(left_tx, left_rx),
            Self::from_channel(right_tx, right_rx),
        )
    }

    fn from_channel(tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>) -> Self {
        Self::new(tx.sink_map_err(|_| TransportError::Closed), rx.map(Ok))
    }

    pub async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.sink.send(frame).await
    }

    pub async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.stream.next().await
    }

    pub fn split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}
