//! Live message channel to the RAG backend.
//!
//! A [`MessageChannel`] owns at most one connection to a WebSocket endpoint,
//! decodes every inbound text frame into a [`ChannelMessage`] and hands it to
//! a single listener. Unexpected closes are retried at a fixed interval until
//! the channel is told to stop with [`MessageChannel::disconnect`] or dropped.
//!
//! The dial itself sits behind the [`Connector`] trait; [`WsConnector`] is the
//! production implementation. [`FanOut`] lets several consumers share the
//! single listener slot.

pub mod channel;
pub mod connector;
pub mod error;
pub mod fanout;

pub use {
    channel::{
        ChannelBuilder, ChannelConfig, ChannelState, DEFAULT_RECONNECT_INTERVAL, MessageChannel,
    },
    connector::{Connection, Connector, WsConnector},
    error::ChannelError,
    fanout::FanOut,
    rag_studio_protocol::{ChannelMessage, OutboundFrame},
};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod mock;
