use tokio::sync::mpsc;

/// Typed broadcast point for model change notification.
///
/// Subscribers receive every published event on an unbounded channel;
/// publishing happens synchronously on the calling thread and never
/// blocks. Senders whose receiver has been dropped are pruned on the
/// next publish.
pub struct Publisher<E: Clone> {
    subscribers: Vec<mpsc::UnboundedSender<E>>,
}

impl<E: Clone> Publisher<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: E) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: Clone> Default for Publisher<E> {
    fn default() -> Self {
        Self::new()
    }
}
