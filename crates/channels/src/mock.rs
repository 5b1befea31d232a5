//! In-memory connector for exercising the channel state machine.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    connector::{Connection, Connector},
    error::ChannelError,
};

/// What the next dial should do.
pub enum Dial {
    Accept,
    Refuse,
    InvalidUrl,
}

/// Server side of one accepted mock connection.
pub struct Peer {
    to_client: Option<mpsc::UnboundedSender<String>>,
    pub from_client: mpsc::UnboundedReceiver<String>,
    closed_by_client: Arc<AtomicBool>,
}

impl Peer {
    pub fn push(&self, frame: &str) {
        if let Some(tx) = &self.to_client {
            tx.send(frame.to_string()).unwrap();
        }
    }

    /// Simulate the server going away.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockConnector {
    script: Arc<Mutex<VecDeque<Dial>>>,
    peers: mpsc::UnboundedSender<Peer>,
    dials: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockConnector {
    /// Dials follow `script`, then accept once it runs out.
    pub fn new(script: Vec<Dial>) -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(Mutex::new(script.into())),
            peers,
            dials: Arc::new(AtomicUsize::new(0)),
            delay: None,
        };
        (connector, rx)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Dial::Accept);
        match next {
            Dial::Accept => {},
            Dial::Refuse => return Err(ChannelError::connect(url, "connection refused")),
            Dial::InvalidUrl => {
                return Err(ChannelError::InvalidUrl {
                    url: url.to_string(),
                    reason: "scripted".into(),
                });
            },
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let peer = Peer {
            to_client: Some(to_client),
            from_client,
            closed_by_client: Arc::clone(&closed),
        };
        // The test may have stopped listening for peers; that is fine.
        let _ = self.peers.send(peer);
        Ok(Box::new(MockConnection {
            inbound,
            outbound,
            closed,
        }))
    }
}

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.outbound
            .send(frame)
            .map_err(|_| ChannelError::transport("peer gone"))
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
