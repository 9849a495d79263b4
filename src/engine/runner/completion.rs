//! Single-settle completion shared by competing tasks.

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

/// An outcome that can be settled exactly once.
///
/// Several tasks may race to call [`Completion::settle`]; only the first one
/// delivers its value to the receiver returned by [`Completion::new`].
#[derive(Debug)]
pub(crate) struct Completion<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Completion<T> {
    /// Creates an unsettled completion and the receiver of its outcome.
    pub(crate) fn new() -> (Self, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            receiver,
        )
    }

    /// Settles the completion with `value`.
    ///
    /// Returns false, dropping `value`, when it was already settled.
    pub(crate) fn settle(&self, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(tx) = sender else {
            return false;
        };
        if tx.send(value).is_err() {
            debug!(target: "podbridge::runner", "start outcome settled after its receiver was dropped");
        }
        true
    }

    /// Returns true once any caller has settled the completion.
    pub(crate) fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
