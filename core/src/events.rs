//! Ordered event fan-out with a bounded replay ring.
//!
//! Publishing happens under the kernel write lock, so per-subscriber
//! delivery order equals the serialization order of the producing
//! operations. Delivery is best-effort: a full or disconnected subscriber
//! queue drops the message for that subscriber only and never blocks the
//! publisher.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::clock::Clock;
use crate::models::{
    Agent, Blocker, ChangelogEntry, Claim, Comment, Evidence, GateRun, Intent, Task, TimestampMs,
};

/// Events retained for replay via [`EventBus::recent`].
pub const RING_CAPACITY: usize = 500;

/// Outbound queue depth per subscriber before messages are dropped.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// What happened, without the publish timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EventKind {
    /// Synthetic greeting delivered to every new subscriber.
    #[serde(rename = "hello")]
    Hello {},

    #[serde(rename = "file.changed", rename_all = "camelCase")]
    FileChanged { path: String, agent_id: String },
    #[serde(rename = "file.added", rename_all = "camelCase")]
    FileAdded { path: String, agent_id: String },
    #[serde(rename = "file.deleted", rename_all = "camelCase")]
    FileDeleted { path: String, agent_id: String },

    #[serde(rename = "task.created")]
    TaskCreated { task: Task },
    #[serde(rename = "task.updated")]
    TaskUpdated { task: Task },
    #[serde(rename = "task.completed")]
    TaskCompleted { task: Task },

    #[serde(rename = "intent.posted")]
    IntentPosted { intent: Intent },

    #[serde(rename = "claim.created")]
    ClaimCreated { claim: Claim },
    #[serde(rename = "claim.extended", rename_all = "camelCase")]
    ClaimExtended { agent_id: String, files: Vec<String> },
    #[serde(rename = "claim.released", rename_all = "camelCase")]
    ClaimReleased { agent_id: String, files: Vec<String> },
    #[serde(rename = "claim.conflict", rename_all = "camelCase")]
    ClaimConflict {
        agent_id: String,
        files: Vec<String>,
        conflicts_with: Vec<String>,
    },

    #[serde(rename = "evidence.attached")]
    EvidenceAttached { evidence: Evidence },

    #[serde(rename = "changelog.logged")]
    ChangelogLogged { entry: ChangelogEntry },

    #[serde(rename = "gate.run")]
    GateRunRecorded { run: GateRun },
    #[serde(rename = "gate.passed")]
    GatePassed { run: GateRun },
    #[serde(rename = "gate.failed")]
    GateFailed { run: GateRun },

    #[serde(rename = "comment.added")]
    CommentAdded { comment: Comment },

    #[serde(rename = "blocker.added")]
    BlockerAdded { blocker: Blocker },
    #[serde(rename = "blocker.resolved")]
    BlockerResolved { blocker: Blocker },

    #[serde(rename = "dependency.added", rename_all = "camelCase")]
    DependencyAdded {
        task_id: String,
        depends_on_task_id: String,
    },
    #[serde(rename = "dependency.removed", rename_all = "camelCase")]
    DependencyRemoved {
        task_id: String,
        depends_on_task_id: String,
    },

    #[serde(rename = "agent.registered")]
    AgentRegistered { agent: Agent },
    #[serde(rename = "agent.heartbeat", rename_all = "camelCase")]
    AgentHeartbeat { agent_id: String },
}

/// A published event: kind plus the timestamp assigned at publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub ts: TimestampMs,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Handle for one live subscriber. Dropping the receiver disconnects; the
/// bus notices on the next publish and discards the subscriber.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<Event>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

#[derive(Default)]
struct BusInner {
    ring: VecDeque<Event>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// In-process publish/subscribe hub with a bounded replay ring.
pub struct EventBus {
    clock: Arc<dyn Clock>,
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(BusInner::default()),
        }
    }

    /// Publish one event to the ring and every live subscriber, in FIFO
    /// order per subscriber. Returns the stamped event.
    pub fn publish(&self, kind: EventKind) -> Event {
        let event = Event {
            ts: self.clock.now_ms(),
            kind,
        };

        let mut inner = self.lock_inner();
        if inner.ring.len() == RING_CAPACITY {
            inner.ring.pop_front();
        }
        inner.ring.push_back(event.clone());

        inner.subscribers.retain(|sub| {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                // Slow consumer: drop this message for them, keep the queue.
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = sub.id, "event queue full, dropping event");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = sub.id, "subscriber gone, removing");
                    false
                }
            }
        });

        event
    }

    /// Attach a subscriber. Its queue starts with a synthetic `hello`
    /// event; the replay ring is NOT delivered automatically (fetch it
    /// with [`EventBus::recent`]).
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let hello = Event {
            ts: self.clock.now_ms(),
            kind: EventKind::Hello {},
        };
        // Queue is empty, so this cannot fail.
        let _ = tx.try_send(hello);

        let mut inner = self.lock_inner();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, tx });
        Subscription { id, rx }
    }

    /// Detach a subscriber explicitly. Pending queued events are discarded
    /// with the receiver.
    pub fn unsubscribe(&self, id: u64) {
        self.lock_inner().subscribers.retain(|sub| sub.id != id);
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let inner = self.lock_inner();
        let skip = inner.ring.len().saturating_sub(limit);
        inner.ring.iter().skip(skip).cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_inner().subscribers.len()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn bus_at(ms: i64) -> (Arc<ManualClock>, EventBus) {
        let clock = Arc::new(ManualClock::new(ms));
        let bus = EventBus::new(clock.clone());
        (clock, bus)
    }

    fn heartbeat(agent: &str) -> EventKind {
        EventKind::AgentHeartbeat {
            agent_id: agent.to_string(),
        }
    }

    #[test]
    fn subscriber_sees_hello_then_publish_order() {
        let (_, bus) = bus_at(100);
        let mut sub = bus.subscribe();

        bus.publish(heartbeat("a"));
        bus.publish(heartbeat("b"));
        bus.publish(heartbeat("c"));

        assert_eq!(sub.rx.try_recv().unwrap().kind, EventKind::Hello {});
        assert_eq!(sub.rx.try_recv().unwrap().kind, heartbeat("a"));
        assert_eq!(sub.rx.try_recv().unwrap().kind, heartbeat("b"));
        assert_eq!(sub.rx.try_recv().unwrap().kind, heartbeat("c"));
        assert!(sub.rx.try_recv().is_err());
    }

    #[test]
    fn all_subscribers_see_same_order() {
        let (_, bus) = bus_at(0);
        let mut one = bus.subscribe();
        let mut two = bus.subscribe();

        for agent in ["x", "y", "z"] {
            bus.publish(heartbeat(agent));
        }

        for sub in [&mut one, &mut two] {
            assert_eq!(sub.rx.try_recv().unwrap().kind, EventKind::Hello {});
            assert_eq!(sub.rx.try_recv().unwrap().kind, heartbeat("x"));
            assert_eq!(sub.rx.try_recv().unwrap().kind, heartbeat("y"));
            assert_eq!(sub.rx.try_recv().unwrap().kind, heartbeat("z"));
        }
    }

    #[test]
    fn publish_stamps_clock_time() {
        let (clock, bus) = bus_at(1_000);
        let first = bus.publish(heartbeat("a"));
        clock.advance(250);
        let second = bus.publish(heartbeat("a"));

        assert_eq!(first.ts, 1_000);
        assert_eq!(second.ts, 1_250);
    }

    #[test]
    fn ring_keeps_only_latest_events() {
        let (_, bus) = bus_at(0);
        for i in 0..(RING_CAPACITY + 25) {
            bus.publish(heartbeat(&format!("agent-{i}")));
        }

        let recent = bus.recent(RING_CAPACITY + 100);
        assert_eq!(recent.len(), RING_CAPACITY);
        // Oldest retained event is number 25.
        assert_eq!(recent[0].kind, heartbeat("agent-25"));
        assert_eq!(
            recent[RING_CAPACITY - 1].kind,
            heartbeat(&format!("agent-{}", RING_CAPACITY + 24))
        );
    }

    #[test]
    fn recent_respects_limit_and_returns_tail() {
        let (_, bus) = bus_at(0);
        for agent in ["a", "b", "c", "d"] {
            bus.publish(heartbeat(agent));
        }

        let last_two = bus.recent(2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].kind, heartbeat("c"));
        assert_eq!(last_two[1].kind, heartbeat("d"));
    }

    #[test]
    fn full_queue_drops_for_that_subscriber_only() {
        let (_, bus) = bus_at(0);
        let mut slow = bus.subscribe();

        // Hello occupies one slot; overflow the rest without draining.
        for i in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            bus.publish(heartbeat(&format!("a{i}")));
        }

        // A fresh subscriber still gets everything published after it joins.
        let mut fast = bus.subscribe();
        bus.publish(heartbeat("late"));

        let mut received = 0;
        while slow.rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_CAPACITY);

        assert_eq!(fast.rx.try_recv().unwrap().kind, EventKind::Hello {});
        assert_eq!(fast.rx.try_recv().unwrap().kind, heartbeat("late"));
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn dropped_receiver_is_pruned_on_next_publish() {
        let (_, bus) = bus_at(0);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        bus.publish(heartbeat("a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_immediately() {
        let (_, bus) = bus_at(0);
        let sub = bus.subscribe();
        bus.unsubscribe(sub.id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_dotted_type_tag() {
        let (_, bus) = bus_at(42);
        let event = bus.publish(EventKind::ClaimConflict {
            agent_id: "a".into(),
            files: vec!["src/x.rs".into()],
            conflicts_with: vec!["b".into()],
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "claim.conflict");
        assert_eq!(value["ts"], 42);
        assert_eq!(value["agentId"], "a");
        assert_eq!(value["conflictsWith"][0], "b");

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
