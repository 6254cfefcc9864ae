use std::{
    collections::{HashSet, VecDeque},
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::{Duration, Instant},
};

use axum::response::sse::Event;
use metrics::{counter, gauge};
use serde_json::{json, to_string};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::{debug, error, warn};

use hirehub_core::change::ChangeEvent;
use hirehub_core::types::Collection;
use hirehub_storage::{ChangeLogError, Database};

const CHANGE_EVENT: &str = "change";
const RESYNC_EVENT: &str = "resync";
const BROADCAST_BUFFER: usize = 256;

/// Fan-out of committed change events to live subscribers.
///
/// Recent events stay in a bounded ring so reconnecting clients can catch up
/// from `Last-Event-ID`; older gaps are filled from the change log.
#[derive(Clone)]
pub struct ChangeHub {
    database: Database,
    sender: broadcast::Sender<Arc<ChangeMessage>>,
    ring: Arc<Mutex<VecDeque<Arc<ChangeMessage>>>>,
    ring_max: usize,
    ring_ttl: Duration,
    clients: Arc<AtomicUsize>,
    /// Highest version published so far.
    latest: Arc<AtomicU64>,
}

impl ChangeHub {
    pub fn new(database: Database, ring_max: usize, ring_ttl: Duration) -> Self {
        Self::with_buffer(database, ring_max, ring_ttl, BROADCAST_BUFFER)
    }

    fn with_buffer(database: Database, ring_max: usize, ring_ttl: Duration, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            database,
            sender,
            ring: Arc::new(Mutex::new(VecDeque::new())),
            ring_max: ring_max.max(1),
            ring_ttl,
            clients: Arc::new(AtomicUsize::new(0)),
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Largest number of missed events replayed before a client is told to resync.
    pub fn replay_limit(&self) -> usize {
        self.ring_max
    }

    pub async fn current_version(&self) -> Result<u64, ChangeLogError> {
        self.database.change_log().current_version().await
    }

    /// Publishes committed events. Concurrent writers may publish out of
    /// version order; the ring stays sorted and replay checks it for gaps.
    pub async fn publish(&self, events: &[ChangeEvent]) {
        for event in events {
            let message = match ChangeMessage::from_event(event) {
                Ok(message) => Arc::new(message),
                Err(err) => {
                    error!(stage = "sse", version = event.version, error = %err, "failed to encode change");
                    continue;
                }
            };

            {
                let mut ring = self.ring.lock().await;
                let position = ring
                    .iter()
                    .rposition(|existing| existing.event.version < message.event.version)
                    .map(|idx| idx + 1)
                    .unwrap_or(0);
                ring.insert(position, message.clone());
                while ring.len() > self.ring_max {
                    ring.pop_front();
                }
                while let Some(front) = ring.front() {
                    if front.created_at.elapsed() > self.ring_ttl {
                        ring.pop_front();
                    } else {
                        break;
                    }
                }
            }

            self.latest.fetch_max(event.version, Ordering::SeqCst);
            debug!(stage = "sse", version = event.version, kind = %event.kind(), "change published");
            let _ = self.sender.send(message);
        }
    }

    /// Opens a subscription, replaying everything after `since` that the ring
    /// or the change log can still provide.
    pub async fn subscribe(
        &self,
        since: Option<u64>,
        collections: Option<HashSet<Collection>>,
    ) -> Result<Subscription, SseError> {
        let filter = collections.map(Arc::new);
        // Subscribe before reading history so nothing committed in between is lost.
        let receiver = self.sender.subscribe();

        let replay = match since {
            Some(since) => self.replay_after(since).await?,
            None => Replay::Events(Vec::new()),
        };

        let guard = ClientGuard::new(self.clients.clone());
        Ok(Subscription {
            since: since.unwrap_or(0),
            replay,
            receiver,
            filter,
            latest: self.latest.clone(),
            _guard: guard,
        })
    }

    async fn replay_after(&self, since: u64) -> Result<Replay, SseError> {
        let ring_snapshot: Vec<Arc<ChangeMessage>> = {
            let ring = self.ring.lock().await;
            ring.iter().cloned().collect()
        };
        let reaches_back = ring_snapshot
            .first()
            .map(|first| first.event.version <= since.saturating_add(1))
            .unwrap_or(false);
        if reaches_back {
            let missed: Vec<Arc<ChangeMessage>> = ring_snapshot
                .into_iter()
                .filter(|msg| msg.event.version > since)
                .collect();
            // A version still being published leaves a hole; the log has it.
            let contiguous = missed
                .iter()
                .zip(since.saturating_add(1)..)
                .all(|(msg, expected)| msg.event.version == expected);
            if contiguous {
                return Ok(Replay::Events(missed));
            }
        }

        let current = self.current_version().await?;
        if current <= since {
            return Ok(Replay::Events(Vec::new()));
        }
        counter!("sse_ring_miss_total").increment(1);

        let limit = self.replay_limit();
        if current - since > limit as u64 {
            return Ok(self.resync(current));
        }
        let events = self
            .database
            .change_log()
            .list_since(since, limit as i64)
            .await?;
        match events.first() {
            Some(first) if first.version == since.saturating_add(1) => {}
            _ => return Ok(self.resync(current)),
        }

        let messages = events
            .iter()
            .map(|event| ChangeMessage::from_event(event).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Replay::Events(messages))
    }

    fn resync(&self, current: u64) -> Replay {
        counter!("sse_resync_total").increment(1);
        Replay::Resync(current)
    }
}

enum Replay {
    Events(Vec<Arc<ChangeMessage>>),
    /// Too much history is missing; the client must reload from this version.
    Resync(u64),
}

pub struct Subscription {
    since: u64,
    replay: Replay,
    receiver: broadcast::Receiver<Arc<ChangeMessage>>,
    filter: Option<Arc<HashSet<Collection>>>,
    latest: Arc<AtomicU64>,
    _guard: ClientGuard,
}

impl Subscription {
    pub fn is_resync(&self) -> bool {
        matches!(self.replay, Replay::Resync(_))
    }

    /// Converts the subscription into SSE frames: replayed history first, then live events.
    pub fn into_stream(self) -> SseStream {
        let (frames, guard) = self.into_frames();
        SseStream {
            inner: Box::pin(frames.map(|frame| Ok(frame.to_event()))),
            _guard: guard,
        }
    }

    fn into_frames(self) -> (Pin<Box<dyn Stream<Item = Frame> + Send>>, ClientGuard) {
        let Subscription {
            since,
            replay,
            receiver,
            filter,
            latest,
            _guard,
        } = self;

        let (initial, floor, delivered) = match replay {
            Replay::Events(messages) => {
                let delivered: HashSet<u64> = messages.iter().map(|msg| msg.event.version).collect();
                let frames: Vec<Frame> = messages
                    .into_iter()
                    .filter(|msg| allows(&filter, msg))
                    .map(Frame::Change)
                    .collect();
                (frames, since, delivered)
            }
            Replay::Resync(version) => (vec![Frame::Resync(version)], version, HashSet::new()),
        };

        let live = LiveFrames {
            inner: Box::pin(BroadcastStream::new(receiver)),
            floor,
            delivered,
            filter,
            latest,
            finished: false,
        };
        (Box::pin(tokio_stream::iter(initial).chain(live)), _guard)
    }

    /// Replayed events followed by whatever has already been delivered live.
    #[cfg(test)]
    pub fn drain_live(&mut self) -> Vec<ChangeEvent> {
        let mut events = match &self.replay {
            Replay::Events(messages) => messages.iter().map(|msg| msg.event.clone()).collect(),
            Replay::Resync(_) => Vec::new(),
        };
        while let Ok(msg) = self.receiver.try_recv() {
            if allows(&self.filter, &msg) {
                events.push(msg.event.clone());
            }
        }
        events
    }
}

fn allows(filter: &Option<Arc<HashSet<Collection>>>, message: &ChangeMessage) -> bool {
    filter
        .as_ref()
        .map(|set| set.contains(&message.event.collection))
        .unwrap_or(true)
}

enum Frame {
    Change(Arc<ChangeMessage>),
    Resync(u64),
}

impl Frame {
    fn to_event(&self) -> Event {
        match self {
            Frame::Change(message) => message.to_event(),
            Frame::Resync(version) => Event::default()
                .id(version.to_string())
                .event(RESYNC_EVENT)
                .data(json!({ "version": version }).to_string()),
        }
    }
}

/// Live tail of a subscription. Skips anything the replay already sent and
/// ends with a resync frame once the receiver has fallen behind the channel.
struct LiveFrames {
    inner: Pin<Box<BroadcastStream<Arc<ChangeMessage>>>>,
    floor: u64,
    delivered: HashSet<u64>,
    filter: Option<Arc<HashSet<Collection>>>,
    latest: Arc<AtomicU64>,
    finished: bool,
}

impl Stream for LiveFrames {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(msg))) => {
                    let version = msg.event.version;
                    if version <= this.floor
                        || this.delivered.remove(&version)
                        || !allows(&this.filter, &msg)
                    {
                        continue;
                    }
                    return Poll::Ready(Some(Frame::Change(msg)));
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    this.finished = true;
                    let version = this.latest.load(Ordering::SeqCst);
                    counter!("sse_resync_total").increment(1);
                    warn!(stage = "sse", skipped, version, "subscriber lagged, sending resync");
                    return Poll::Ready(Some(Frame::Resync(version)));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>,
    _guard: ClientGuard,
}

impl Stream for SseStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.as_mut().poll_next(cx)
    }
}

struct ChangeMessage {
    event: ChangeEvent,
    data: String,
    created_at: Instant,
}

impl ChangeMessage {
    fn from_event(event: &ChangeEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.clone(),
            data: to_string(event)?,
            created_at: Instant::now(),
        })
    }

    fn to_event(&self) -> Event {
        Event::default()
            .id(self.event.version.to_string())
            .event(CHANGE_EVENT)
            .data(self.data.clone())
    }
}

struct ClientGuard {
    clients: Arc<AtomicUsize>,
}

impl ClientGuard {
    fn new(clients: Arc<AtomicUsize>) -> Self {
        let value = clients.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("sse_clients").set(value as f64);
        Self { clients }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let value = self.clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("sse_clients").set(value as f64);
    }
}

#[derive(Debug, Error)]
pub enum SseError {
    #[error("failed to serialize change: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("change log error: {0}")]
    ChangeLog(#[from] ChangeLogError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hirehub_core::document::create_document;
    use hirehub_core::types::{Candidate, Job};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup(ring_max: usize) -> (ChangeHub, Database, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("sse.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");
        let hub = ChangeHub::new(database.clone(), ring_max, Duration::from_secs(60));
        (hub, database, dir)
    }

    async fn write_candidate(database: &Database, id: &str) -> ChangeEvent {
        let doc: Candidate = create_document(id, json!({ "name": id }), Utc::now()).expect("doc");
        let mut tx = database.begin().await.expect("begin");
        let event = database
            .candidates()
            .insert(&mut tx, &doc, Utc::now())
            .await
            .expect("insert");
        tx.commit().await.expect("commit");
        event
    }

    async fn write_job(database: &Database, id: &str) -> ChangeEvent {
        let doc: Job = create_document(id, json!({ "title": "Cashier", "client": "MegaMart" }), Utc::now())
            .expect("doc");
        let mut tx = database.begin().await.expect("begin");
        let event = database.jobs().insert(&mut tx, &doc, Utc::now()).await.expect("insert");
        tx.commit().await.expect("commit");
        event
    }

    fn versions(events: &[ChangeEvent]) -> Vec<u64> {
        events.iter().map(|event| event.version).collect()
    }

    #[tokio::test]
    async fn reconnect_replays_from_ring() {
        let (hub, database, _dir) = setup(16).await;
        for id in ["c-1", "c-2", "c-3"] {
            let event = write_candidate(&database, id).await;
            hub.publish(&[event]).await;
        }

        let mut sub = hub.subscribe(Some(1), None).await.expect("subscribe");
        assert!(!sub.is_resync());
        assert_eq!(versions(&sub.drain_live()), vec![2, 3]);
    }

    #[tokio::test]
    async fn ring_miss_falls_back_to_change_log() {
        // Events committed before this hub started never reached its ring.
        let (hub, database, _dir) = setup(4).await;
        write_candidate(&database, "c-1").await;
        write_candidate(&database, "c-2").await;
        write_candidate(&database, "c-3").await;

        let mut sub = hub.subscribe(Some(1), None).await.expect("subscribe");
        assert!(!sub.is_resync());
        assert_eq!(versions(&sub.drain_live()), vec![2, 3]);

        let mut sub = hub.subscribe(Some(3), None).await.expect("subscribe");
        assert!(sub.drain_live().is_empty());
    }

    #[tokio::test]
    async fn too_many_missed_events_trigger_resync() {
        let (hub, database, _dir) = setup(2).await;
        for id in ["c-1", "c-2", "c-3", "c-4"] {
            write_candidate(&database, id).await;
        }
        let sub = hub.subscribe(Some(0), None).await.expect("subscribe");
        assert!(sub.is_resync());
    }

    #[tokio::test]
    async fn pruned_history_triggers_resync() {
        let (hub, database, _dir) = setup(8).await;
        write_candidate(&database, "c-1").await;
        write_candidate(&database, "c-2").await;
        database
            .change_log()
            .delete_older_than_batch(Utc::now() + chrono::Duration::hours(1), 1)
            .await
            .expect("prune");

        let sub = hub.subscribe(Some(0), None).await.expect("subscribe");
        assert!(sub.is_resync());
    }

    #[tokio::test]
    async fn collection_filter_applies_to_live_events() {
        let (hub, database, _dir) = setup(8).await;
        let only_jobs = HashSet::from([Collection::Jobs]);
        let mut sub = hub.subscribe(None, Some(only_jobs)).await.expect("subscribe");

        let candidate = write_candidate(&database, "c-1").await;
        let job = write_job(&database, "j-1").await;
        hub.publish(&[candidate, job]).await;

        let events = sub.drain_live();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].collection, Collection::Jobs);
    }

    #[tokio::test]
    async fn out_of_order_publishes_keep_ring_sorted() {
        let (hub, database, _dir) = setup(8).await;
        let first = write_candidate(&database, "c-1").await;
        let second = write_candidate(&database, "c-2").await;
        hub.publish(&[second]).await;
        hub.publish(&[first]).await;

        let mut sub = hub.subscribe(Some(0), None).await.expect("subscribe");
        assert_eq!(versions(&sub.drain_live()), vec![1, 2]);
    }

    async fn next_frame(frames: &mut Pin<Box<dyn Stream<Item = Frame> + Send>>) -> Option<Frame> {
        tokio::time::timeout(Duration::from_millis(200), frames.next())
            .await
            .ok()
            .flatten()
    }

    fn frame_version(frame: &Frame) -> u64 {
        match frame {
            Frame::Change(message) => message.event.version,
            Frame::Resync(version) => *version,
        }
    }

    #[tokio::test]
    async fn gap_in_ring_is_filled_from_change_log() {
        let (hub, database, _dir) = setup(16).await;
        let first = write_candidate(&database, "c-1").await;
        let second = write_candidate(&database, "c-2").await;
        let third = write_candidate(&database, "c-3").await;
        // The writer of version 2 has committed but not published yet.
        hub.publish(&[first]).await;
        hub.publish(&[third]).await;

        let sub = hub.subscribe(Some(1), None).await.expect("subscribe");
        assert!(!sub.is_resync());
        let (mut frames, _guard) = sub.into_frames();

        hub.publish(&[second]).await;
        let fourth = write_candidate(&database, "c-4").await;
        hub.publish(&[fourth]).await;

        let mut seen = Vec::new();
        while let Some(frame) = next_frame(&mut frames).await {
            assert!(matches!(frame, Frame::Change(_)));
            seen.push(frame_version(&frame));
        }
        assert_eq!(seen, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn lagging_subscriber_receives_resync_and_stream_ends() {
        let (_, database, _dir) = setup(16).await;
        let hub = ChangeHub::with_buffer(database.clone(), 16, Duration::from_secs(60), 2);
        let sub = hub.subscribe(None, None).await.expect("subscribe");
        let (mut frames, _guard) = sub.into_frames();

        for id in ["c-1", "c-2", "c-3", "c-4", "c-5"] {
            let event = write_candidate(&database, id).await;
            hub.publish(&[event]).await;
        }

        let frame = next_frame(&mut frames).await.expect("resync frame");
        assert!(matches!(frame, Frame::Resync(5)));
        assert!(next_frame(&mut frames).await.is_none());
    }
}
