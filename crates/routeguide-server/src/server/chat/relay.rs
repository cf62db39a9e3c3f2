//! Location-keyed broadcast registry for `RouteChat`.
//!
//! Every open `RouteChat` call [`join`](ChatRelay::join)s the relay with the
//! sending half of its outbound channel and gets a [`Subscription`] back. A
//! participant is "at" the location of the most recent note it published;
//! publishing a note at point `P`:
//!
//! 1. moves the publisher to `P`,
//! 2. appends the note to `P`'s bounded history,
//! 3. delivers the note to every *other* participant currently at `P`.
//!
//! Participants only see notes published after they arrived; history is
//! never replayed. All three steps run under one lock, so notes at a given
//! point are observed by every receiver in relay arrival order.
//!
//! Outbound channels are unbounded, so delivery never blocks under the lock
//! and a slow reader still receives every note. Sending only fails once the
//! recipient's stream is gone, which evicts it. Dropping a [`Subscription`]
//! removes the participant, and a location is forgotten, history included,
//! as soon as nobody is left there.

use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use routeguide_core::proto::{Point, RouteNote};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::Status;

/// Outbound half of a `RouteChat` response stream.
pub type NoteSender = mpsc::UnboundedSender<Result<RouteNote, Status>>;

/// Opaque handle identifying one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Outcome of a single [`Subscription::publish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients that accepted the note.
    pub delivered: usize,
    /// Recipients removed because their stream had gone away.
    pub evicted: usize,
}

struct Member {
    sender: NoteSender,
    at: Option<Point>,
}

#[derive(Default)]
struct Room {
    // Join order at this point.
    subscribers: Vec<SubscriberId>,
    history: VecDeque<RouteNote>,
}

impl Room {
    fn remove(&mut self, id: SubscriberId) {
        self.subscribers.retain(|s| *s != id);
    }

    fn is_vacant(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    members: HashMap<SubscriberId, Member>,
    rooms: HashMap<Point, Room>,
}

impl Registry {
    fn leave_room(&mut self, id: SubscriberId, at: Point) {
        if let Some(room) = self.rooms.get_mut(&at) {
            room.remove(id);
            if room.is_vacant() {
                self.rooms.remove(&at);
            }
        }
    }
}

struct Inner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    history_limit: usize,
}

/// Shared chat registry. Cloning is cheap and every clone refers to the same
/// registry.
#[derive(Clone)]
pub struct ChatRelay {
    inner: Arc<Inner>,
}

impl ChatRelay {
    /// Creates an empty relay retaining up to `history_limit` notes per
    /// location (`0` keeps none).
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(0),
                history_limit,
            }),
        }
    }

    /// Registers a new participant whose notes will be written to `sender`.
    ///
    /// The participant is not at any location until it publishes.
    pub fn join(&self, sender: NoteSender) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .registry
            .lock()
            .members
            .insert(id, Member { sender, at: None });

        Subscription {
            relay: self.clone(),
            id,
        }
    }

    /// Number of live participants.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().members.len()
    }

    /// Number of participants currently at `point`.
    pub fn subscribers_at(&self, point: &Point) -> usize {
        self.inner
            .registry
            .lock()
            .rooms
            .get(point)
            .map_or(0, |room| room.subscribers.len())
    }

    /// Number of locations with at least one participant.
    pub fn occupied_locations(&self) -> usize {
        self.inner.registry.lock().rooms.len()
    }

    /// Retained notes at `point`, oldest first. Empty once everyone has left
    /// `point`.
    pub fn history(&self, point: &Point) -> Vec<RouteNote> {
        self.inner
            .registry
            .lock()
            .rooms
            .get(point)
            .map(|room| room.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn publish(&self, id: SubscriberId, note: RouteNote) -> Delivery {
        let key = note.location.unwrap_or_default();
        let mut guard = self.inner.registry.lock();
        let registry = &mut *guard;

        let previous = match registry.members.get_mut(&id) {
            Some(member) => member.at.replace(key),
            // Already evicted; the call is on its way out.
            None => return Delivery::default(),
        };

        if previous != Some(key) {
            if let Some(previous) = previous {
                registry.leave_room(id, previous);
            }
            registry.rooms.entry(key).or_default().subscribers.push(id);
        }

        let Registry { members, rooms } = registry;
        let room = rooms.entry(key).or_default();

        if self.inner.history_limit > 0 {
            if room.history.len() >= self.inner.history_limit {
                room.history.pop_front();
            }
            room.history.push_back(note.clone());
        }

        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        for peer in room.subscribers.iter().copied().filter(|peer| *peer != id) {
            let Some(member) = members.get(&peer) else {
                continue;
            };
            match member.sender.send(Ok(note.clone())) {
                Ok(()) => delivery.delivered += 1,
                Err(_) => closed.push(peer),
            }
        }

        for peer in closed {
            members.remove(&peer);
            room.remove(peer);
            delivery.evicted += 1;
        }

        delivery
    }

    fn leave(&self, id: SubscriberId) {
        let mut registry = self.inner.registry.lock();
        if let Some(Member { at: Some(at), .. }) = registry.members.remove(&id) {
            registry.leave_room(id, at);
        }
    }
}

/// Membership of one `RouteChat` call in the relay. Dropping it leaves the
/// relay.
pub struct Subscription {
    relay: ChatRelay,
    id: SubscriberId,
}

impl Subscription {
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Publishes a note from this participant at the note's location.
    ///
    /// A note without a location is treated as sent from `(0, 0)`.
    pub fn publish(&self, note: RouteNote) -> Delivery {
        self.relay.publish(self.id, note)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.relay.leave(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

    type Inbox = UnboundedReceiver<Result<RouteNote, Status>>;

    fn point(latitude: i32, longitude: i32) -> Point {
        Point {
            latitude,
            longitude,
        }
    }

    fn note(at: Point, message: &str) -> RouteNote {
        RouteNote {
            location: Some(at),
            message: message.to_string(),
        }
    }

    fn participant(relay: &ChatRelay) -> (Subscription, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (relay.join(tx), rx)
    }

    fn drain(inbox: &mut Inbox) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(msg) = inbox.try_recv() {
            messages.push(msg.unwrap().message);
        }
        messages
    }

    #[test]
    fn note_reaches_peers_but_not_sender() {
        let relay = ChatRelay::new(16);
        let p = point(1, 1);
        let (a, mut a_rx) = participant(&relay);
        let (b, mut b_rx) = participant(&relay);

        // B arrives first; A is nowhere yet so nothing is delivered.
        assert_eq!(b.publish(note(p, "b arrives")).delivered, 0);

        let delivery = a.publish(note(p, "hello from a"));
        assert_eq!(delivery.delivered, 1);

        assert_eq!(drain(&mut b_rx), vec!["hello from a"]);
        assert!(matches!(a_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn late_joiner_gets_no_backfill() {
        let relay = ChatRelay::new(16);
        let p = point(2, 2);
        let (a, mut a_rx) = participant(&relay);
        let (b, mut b_rx) = participant(&relay);
        b.publish(note(p, "b"));
        a.publish(note(p, "a"));

        let (c, mut c_rx) = participant(&relay);
        assert!(drain(&mut c_rx).is_empty());

        let delivery = c.publish(note(p, "c"));
        assert_eq!(delivery.delivered, 2);
        assert!(drain(&mut c_rx).is_empty());
        assert_eq!(drain(&mut a_rx), vec!["c"]);
        assert_eq!(drain(&mut b_rx), vec!["a", "c"]);
    }

    #[test]
    fn locations_are_isolated() {
        let relay = ChatRelay::new(16);
        let (a, mut a_rx) = participant(&relay);
        let (b, mut b_rx) = participant(&relay);
        a.publish(note(point(1, 0), "a"));
        b.publish(note(point(0, 1), "b"));

        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(relay.subscribers_at(&point(1, 0)), 1);
        assert_eq!(relay.subscribers_at(&point(0, 1)), 1);
    }

    #[test]
    fn publishing_elsewhere_moves_the_participant() {
        let relay = ChatRelay::new(16);
        let p = point(5, 5);
        let q = point(6, 6);
        let (a, mut a_rx) = participant(&relay);
        let (b, _b_rx) = participant(&relay);

        a.publish(note(p, "a at p"));
        a.publish(note(q, "a at q"));
        assert_eq!(relay.subscribers_at(&p), 0);
        assert_eq!(relay.subscribers_at(&q), 1);

        b.publish(note(p, "b at p"));
        assert!(drain(&mut a_rx).is_empty());
    }

    #[test]
    fn notes_without_location_use_origin() {
        let relay = ChatRelay::new(16);
        let (a, _a_rx) = participant(&relay);
        let (b, mut b_rx) = participant(&relay);
        b.publish(note(point(0, 0), "b"));
        a.publish(RouteNote {
            location: None,
            message: "nowhere".to_string(),
        });
        assert_eq!(drain(&mut b_rx), vec!["nowhere"]);
    }

    #[test]
    fn dropping_subscription_leaves_relay() {
        let relay = ChatRelay::new(0);
        let p = point(3, 3);
        let (a, _a_rx) = participant(&relay);
        let (b, _b_rx) = participant(&relay);
        a.publish(note(p, "a"));
        b.publish(note(p, "b"));
        assert_eq!(relay.subscriber_count(), 2);
        assert_eq!(relay.subscribers_at(&p), 2);

        drop(a);
        assert_eq!(relay.subscriber_count(), 1);
        assert_eq!(relay.subscribers_at(&p), 1);

        drop(b);
        assert_eq!(relay.subscriber_count(), 0);
        assert_eq!(relay.subscribers_at(&p), 0);
    }

    #[test]
    fn closed_peer_is_evicted_without_disturbing_others() {
        let relay = ChatRelay::new(16);
        let p = point(4, 4);
        let (a, _a_rx) = participant(&relay);
        let (b, b_rx) = participant(&relay);
        let (c, mut c_rx) = participant(&relay);
        b.publish(note(p, "b"));
        c.publish(note(p, "c"));

        drop(b_rx);
        let delivery = a.publish(note(p, "a"));
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.evicted, 1);
        assert_eq!(drain(&mut c_rx), vec!["a"]);
        assert_eq!(relay.subscriber_count(), 2);

        // Evicted participant can still drop its subscription safely, and its
        // further publishes go nowhere.
        assert_eq!(b.publish(note(p, "ghost")), Delivery::default());
        drop(b);
        assert_eq!(relay.subscriber_count(), 2);
        assert!(drain(&mut c_rx).is_empty());
    }

    #[test]
    fn slow_reader_receives_every_note() {
        let relay = ChatRelay::new(16);
        let p = point(7, 7);
        let (a, _a_rx) = participant(&relay);
        let (b, mut b_rx) = participant(&relay);
        b.publish(note(p, "b"));

        for i in 0..1_000 {
            assert_eq!(a.publish(note(p, &format!("note-{i}"))).delivered, 1);
        }

        // B only starts reading after the burst.
        let received = drain(&mut b_rx);
        assert_eq!(received.len(), 1_000);
        assert_eq!(received.first().map(String::as_str), Some("note-0"));
        assert_eq!(received.last().map(String::as_str), Some("note-999"));
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let relay = ChatRelay::new(2);
        let p = point(8, 8);
        let (a, _a_rx) = participant(&relay);
        for msg in ["first", "second", "third"] {
            a.publish(note(p, msg));
        }
        let history: Vec<_> = relay.history(&p).into_iter().map(|n| n.message).collect();
        assert_eq!(history, vec!["second", "third"]);

        // The location is forgotten once its last participant leaves.
        drop(a);
        assert!(relay.history(&p).is_empty());
        assert_eq!(relay.occupied_locations(), 0);
    }

    #[test]
    fn abandoned_locations_are_freed() {
        let relay = ChatRelay::new(256);
        for i in 0..10_000 {
            let (sub, _rx) = participant(&relay);
            sub.publish(note(point(i, -i), &"x".repeat(1024)));
        }

        assert_eq!(relay.subscriber_count(), 0);
        assert_eq!(relay.occupied_locations(), 0);

        // Moving away frees the previous location too.
        let (a, _a_rx) = participant(&relay);
        a.publish(note(point(1, 1), "here"));
        a.publish(note(point(2, 2), "there"));
        assert_eq!(relay.occupied_locations(), 1);
        assert!(relay.history(&point(1, 1)).is_empty());
        assert_eq!(relay.history(&point(2, 2)).len(), 1);
    }

    #[test]
    fn zero_history_limit_keeps_nothing() {
        let relay = ChatRelay::new(0);
        let p = point(9, 9);
        let (a, _a_rx) = participant(&relay);
        a.publish(note(p, "gone"));
        assert!(relay.history(&p).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_join_publish_leave() {
        let relay = ChatRelay::new(4);
        let mut tasks = Vec::new();

        for task in 0..32 {
            let relay = relay.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let sub = relay.join(tx);
                for i in 0..100 {
                    sub.publish(note(point(i % 3, 0), &format!("{task}-{i}")));
                    while rx.try_recv().is_ok() {}
                    if i % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(relay.subscriber_count(), 0);
        assert_eq!(relay.occupied_locations(), 0);
        for lat in 0..3 {
            assert_eq!(relay.subscribers_at(&point(lat, 0)), 0);
        }
    }
}
