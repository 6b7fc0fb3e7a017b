//! ---
//! ems_section: "04-topology-store"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Active network slot, change fan-out, and query views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use gridscope_model::VersionToken;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Why the active network changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    Uploaded,
    Restored,
}

/// Event published once per successful replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub version: VersionToken,
    pub network_id: String,
    pub cause: ChangeCause,
    pub at: DateTime<Utc>,
}

/// Fan-out of [`ChangeEvent`]s to any number of subscribers.
///
/// Each subscriber owns a bounded buffer; a subscriber that falls behind
/// loses its oldest events instead of blocking the publisher or its peers.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    /// Create a notifier buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers it was queued for.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let version = event.version;
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(%version, receivers, "change event published");
                receivers
            }
            Err(_) => {
                debug!(%version, "change event published without subscribers");
                0
            }
        }
    }

    /// Start a new subscription. Only events published afterwards are seen.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Per-subscriber handle over the notifier.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Wait for the next event; `None` once the notifier is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change subscriber lagged behind; dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a lazy stream of events.
    pub fn into_stream(self) -> impl Stream<Item = ChangeEvent> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: u64) -> ChangeEvent {
        ChangeEvent {
            version: VersionToken::from_raw(raw),
            network_id: "net".into(),
            cause: ChangeCause::Uploaded,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn late_subscribers_see_no_replay() {
        let notifier = ChangeNotifier::new(4);
        assert_eq!(notifier.publish(event(1)), 0);

        let mut subscription = notifier.subscribe();
        notifier.publish(event(2));
        assert_eq!(subscription.next().await.unwrap().version.get(), 2);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_recent_events() {
        let notifier = ChangeNotifier::new(2);
        let mut slow = notifier.subscribe();
        for raw in 1..=5 {
            notifier.publish(event(raw));
        }
        assert_eq!(slow.next().await.unwrap().version.get(), 4);
        assert_eq!(slow.next().await.unwrap().version.get(), 5);
    }

    #[tokio::test]
    async fn stream_ends_when_notifier_drops() {
        use futures::StreamExt;

        let notifier = ChangeNotifier::new(2);
        let stream = notifier.subscribe().into_stream();
        notifier.publish(event(7));
        drop(notifier);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cause, ChangeCause::Uploaded);
    }
}
