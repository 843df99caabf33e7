use std::path::PathBuf;

use tokio::sync::broadcast;

use crate::solution::SolutionId;

/// A handle for receiving broker lifecycle notifications.
pub type Subscription = broadcast::Receiver<BrokerEvent>;

/// Why a request was answered with no-op storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// Forked branch or a workspace without persistence.
    Gated,
    /// Real storage was allowed but the solution has no file path.
    NoSolutionPath,
    /// The solution file changed and no longer exists on disk.
    StaleSolutionPath,
    /// No working folder could be resolved for the solution.
    NoWorkingFolder,
    /// Small solution without a pre-existing database.
    BelowThreshold,
    /// An earlier attempt for this path was declined or failed.
    PreviousFailure,
    /// The factory could not open a backend.
    FactoryFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerEvent {
    BackendOpened { path: PathBuf, working_folder: PathBuf },
    BackendClosed { path: PathBuf },
    FellBackToNoOp { path: Option<PathBuf>, reason: FallbackReason },
    PrimaryRegistered { id: SolutionId },
    PrimaryUnregistered { id: SolutionId },
}

#[derive(Debug)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<BrokerEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, ev: BrokerEvent) {
        // send() only fails when there are no receivers
        let _ = self.tx.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(BrokerEvent::PrimaryRegistered { id: SolutionId::new() });
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let id = SolutionId::new();

        bus.publish(BrokerEvent::PrimaryRegistered { id });
        bus.publish(BrokerEvent::FellBackToNoOp {
            path: None,
            reason: FallbackReason::Gated,
        });

        assert_eq!(rx.try_recv().unwrap(), BrokerEvent::PrimaryRegistered { id });
        assert!(matches!(
            rx.try_recv().unwrap(),
            BrokerEvent::FellBackToNoOp { reason: FallbackReason::Gated, .. }
        ));
        assert!(rx.try_recv().is_err());
    }
}
