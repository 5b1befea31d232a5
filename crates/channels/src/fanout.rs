use {rag_studio_protocol::ChannelMessage, tokio::sync::broadcast};

const DEFAULT_CAPACITY: usize = 256;

/// Multiplexes the channel's single `on_message` listener onto any number of
/// subscribers. Slow subscribers lag and lose the oldest messages.
#[derive(Debug, Clone)]
pub struct FanOut {
    tx: broadcast::Sender<ChannelMessage>,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FanOut {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver to every current subscriber. Returns how many received it.
    pub fn publish(&self, msg: ChannelMessage) -> usize {
        // No subscribers is not an error here.
        self.tx.send(msg).unwrap_or(0)
    }

    /// A closure suitable for `ChannelBuilder::on_message`.
    pub fn handler(&self) -> impl Fn(ChannelMessage) + Send + Sync + 'static {
        let fanout = self.clone();
        move |msg| {
            fanout.publish(msg);
        }
    }
}
