//! One-shot completions for the async suspension points.
//!
//! Video acquisition, tracker load and locate all finish "later". The
//! collaborator hands back a [`Completion`] receiver and resolves the
//! matching sender; the session polls the receiver from its frame loop
//! without ever blocking on it.

use futures::channel::oneshot;

/// Receiving half of an async operation.
pub type Completion<T, E> = oneshot::Receiver<Result<T, E>>;

/// Sending half, held by whoever finishes the operation.
pub type Resolver<T, E> = oneshot::Sender<Result<T, E>>;

/// Create a linked resolver/completion pair.
pub fn completion<T, E>() -> (Resolver<T, E>, Completion<T, E>) {
    oneshot::channel()
}

/// Completion that is already finished.
pub fn resolved<T, E>(result: Result<T, E>) -> Completion<T, E> {
    let (tx, rx) = oneshot::channel();
    // The receiver is alive right here, so the send cannot fail.
    let _ = tx.send(result);
    rx
}

/// Outcome of polling a pending completion.
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<T> {
    /// Still running.
    Pending,
    /// Finished with a value.
    Ready(T),
    /// The resolver was dropped without answering.
    Dropped,
}

/// Poll `slot` without blocking. Clears the slot once it has an answer.
pub fn poll_slot<T>(slot: &mut Option<oneshot::Receiver<T>>) -> Option<Poll<T>> {
    let receiver = slot.as_mut()?;
    let outcome = match receiver.try_recv() {
        Ok(None) => return Some(Poll::Pending),
        Ok(Some(value)) => Poll::Ready(value),
        Err(oneshot::Canceled) => Poll::Dropped,
    };
    *slot = None;
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_slot_lifecycle() {
        let (tx, rx) = completion::<u32, ()>();
        let mut slot = Some(rx);
        assert_eq!(poll_slot(&mut slot), Some(Poll::Pending));

        tx.send(Ok(7)).unwrap();
        assert_eq!(poll_slot(&mut slot), Some(Poll::Ready(Ok(7))));
        assert!(slot.is_none());
        assert_eq!(poll_slot(&mut slot), None);
    }

    #[test]
    fn dropped_resolver() {
        let (tx, rx) = completion::<(), ()>();
        let mut slot = Some(rx);
        drop(tx);
        assert_eq!(poll_slot(&mut slot), Some(Poll::Dropped));
    }

    #[test]
    fn already_resolved() {
        let mut slot = Some(resolved::<u8, ()>(Err(())));
        assert_eq!(poll_slot(&mut slot), Some(Poll::Ready(Err(()))));
    }
}
