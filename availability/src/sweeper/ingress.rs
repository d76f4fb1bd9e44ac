use crate::Error;
use futures::{channel::mpsc, SinkExt};

/// Message types that can be sent to the [Mailbox].
pub enum Message {
    /// Start a pass now instead of waiting for the sweep interval.
    ///
    /// Ignored if a pass is already running.
    Sweep,

    /// Stop the sweeper, abandoning any pass in progress.
    Stop,
}

/// Ingress mailbox for a [super::Actor].
///
/// The actor stops once every clone of its mailbox is dropped.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Request a pass now.
    pub async fn sweep(&mut self) -> Result<(), Error> {
        self.sender
            .send(Message::Sweep)
            .await
            .map_err(|_| Error::Closed)
    }

    /// Stop the sweeper.
    pub async fn stop(&mut self) -> Result<(), Error> {
        self.sender
            .send(Message::Stop)
            .await
            .map_err(|_| Error::Closed)
    }
}
