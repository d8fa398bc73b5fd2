//! 回调派发模块
//!
//! All listener callbacks, for single requests, aggregates and download
//! tasks alike, are funneled through one dispatcher task so they run
//! sequentially on a single context and never race caller-owned state.

use log::debug;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to the dispatcher. Dropping every handle stops the
/// dispatcher once the queue drains.
#[derive(Clone)]
pub struct DeliveryContext {
    sender: mpsc::UnboundedSender<Command>,
}

impl DeliveryContext {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Command>();

        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Run(job) => job(),
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("delivery context stopped");
        });

        Self { sender }
    }

    /// Queue a callback. Jobs run in dispatch order.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        // A send error means the dispatcher is gone during shutdown, at
        // which point dropping the callback is the right thing.
        let _ = self.sender.send(Command::Run(Box::new(job)));
    }

    /// Wait until everything dispatched before this call has run.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

impl Default for DeliveryContext {
    fn default() -> Self {
        Self::new()
    }
}
