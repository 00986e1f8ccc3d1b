use crate::event::Event;
use crate::filter::Filter;
use crate::minion::{Minion, MinionExitReason, Subscription, ToPoolMessage};
use crate::relay_url::RelayUrl;
use crate::settings::Settings;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

/// How a pool query ended. A query ends exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolTermination {
    /// Every relay closed its subscription (completed, failed or cancelled)
    AllCompleted,
    /// The deadline passed first
    TimedOut,
}

/// A set of relays to query together, under one deadline.
///
/// A pool is built for one sync and thrown away afterwards; nothing is shared
/// between pools.
#[derive(Debug, Clone)]
pub struct RelayPool {
    relays: Vec<RelayUrl>,
    timeout: Duration,
    settings: Settings,
}

impl RelayPool {
    pub fn new(relays: Vec<RelayUrl>, timeout: Duration, settings: &Settings) -> RelayPool {
        let mut deduped: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        for relay in relays {
            if !deduped.contains(&relay) {
                deduped.push(relay);
            }
        }
        RelayPool {
            relays: deduped,
            timeout,
            settings: settings.clone(),
        }
    }

    pub fn relays(&self) -> &[RelayUrl] {
        &self.relays
    }

    /// Open `filter` on every relay at once. The deadline starts now.
    pub fn query(&self, filter: Filter) -> PoolQuery {
        let (to_pool, from_minions) = tokio::sync::mpsc::unbounded_channel();
        let subscriptions: Vec<Subscription> = self
            .relays
            .iter()
            .map(|url| Minion::subscribe(url.clone(), filter.clone(), to_pool.clone(), &self.settings))
            .collect();

        tracing::debug!(
            "Querying {} relays for {}",
            subscriptions.len(),
            serde_json::to_string(&filter).unwrap_or_default()
        );

        PoolQuery {
            open: subscriptions.len(),
            subscriptions,
            from_minions,
            deadline: Instant::now() + self.timeout,
            seen: HashSet::new(),
            termination: None,
        }
    }
}

/// The merged, deduplicated event stream of one pool query
pub struct PoolQuery {
    subscriptions: Vec<Subscription>,
    from_minions: UnboundedReceiver<ToPoolMessage>,
    open: usize,
    deadline: Instant,
    seen: HashSet<String>,
    termination: Option<PoolTermination>,
}

impl PoolQuery {
    /// The next event in arrival order, or `None` once the query has ended
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if self.termination.is_some() {
                return None;
            }
            if self.open == 0 {
                self.terminate(PoolTermination::AllCompleted);
                continue;
            }

            match tokio::time::timeout_at(self.deadline, self.from_minions.recv()).await {
                Err(_) => self.terminate(PoolTermination::TimedOut),
                Ok(None) => self.terminate(PoolTermination::AllCompleted),
                Ok(Some(ToPoolMessage::Event(url, event))) => {
                    if self.seen.insert(event.id.clone()) {
                        tracing::trace!("{}: event {}", url, event.id);
                        return Some(*event);
                    }
                }
                Ok(Some(ToPoolMessage::Closed(url, reason))) => {
                    self.open = self.open.saturating_sub(1);
                    match reason {
                        MinionExitReason::Error => {
                            tracing::debug!("{}: relay failed, {} still open", url, self.open)
                        }
                        _ => tracing::debug!("{}: {:?}, {} still open", url, reason, self.open),
                    }
                }
            }
        }
    }

    /// Drain the query to its end
    pub async fn collect(mut self) -> (Vec<Event>, PoolTermination) {
        let mut events: Vec<Event> = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        let termination = self.termination.unwrap_or(PoolTermination::AllCompleted);
        (events, termination)
    }

    pub fn termination(&self) -> Option<PoolTermination> {
        self.termination
    }

    fn terminate(&mut self, termination: PoolTermination) {
        if self.termination.is_some() {
            return;
        }
        tracing::debug!("Pool query ended: {:?}", termination);
        self.termination = Some(termination);
        for sub in &self.subscriptions {
            sub.cancel();
        }
    }
}

impl Drop for PoolQuery {
    fn drop(&mut self) {
        for sub in &self.subscriptions {
            sub.cancel();
        }
    }
}

/// Something that can run one bounded query over a set of relays
#[async_trait]
pub trait EventFetcher: Send + Sync {
    async fn fetch(&self, filter: Filter, relays: Vec<RelayUrl>, timeout: Duration) -> Vec<Event>;
}

/// Fetches from live relays with a fresh [`RelayPool`] per call
#[derive(Debug, Clone)]
pub struct RelayFetcher {
    settings: Settings,
}

impl RelayFetcher {
    pub fn new(settings: &Settings) -> RelayFetcher {
        RelayFetcher {
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl EventFetcher for RelayFetcher {
    async fn fetch(&self, filter: Filter, relays: Vec<RelayUrl>, timeout: Duration) -> Vec<Event> {
        let pool = RelayPool::new(relays, timeout, &self.settings);
        let (events, termination) = pool.query(filter).collect().await;
        if termination == PoolTermination::TimedOut {
            tracing::debug!(
                "Pool timed out after {:?} with {} events",
                timeout,
                events.len()
            );
        }
        events
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{
        contact_list, metadata_event, spawn_relay, unreachable_relay, RelayBehavior, TestKeys,
    };

    #[tokio::test]
    async fn test_merges_and_dedups() {
        let alice = TestKeys::new(1);
        let shared = metadata_event(&alice, 100, r#"{"name":"a"}"#);
        let only_one = metadata_event(&alice, 200, r#"{"name":"b"}"#);
        let only_two = metadata_event(&alice, 300, r#"{"name":"c"}"#);

        let one = spawn_relay(vec![shared.clone(), only_one.clone()], RelayBehavior::Complete).await;
        let two = spawn_relay(vec![shared.clone(), only_two.clone()], RelayBehavior::Complete).await;
        let one_again = RelayUrl::try_from_str(&one.as_str().to_uppercase()).unwrap();

        let pool = RelayPool::new(
            vec![one.clone(), two, one_again],
            Duration::from_secs(5),
            &Settings::default(),
        );
        assert_eq!(pool.relays().len(), 2);

        let (mut events, termination) = pool
            .query(Filter::metadata_of(alice.public_key()))
            .collect()
            .await;
        assert_eq!(termination, PoolTermination::AllCompleted);
        events.sort_by_key(|e| e.created_at);
        assert_eq!(events, vec![shared, only_one, only_two]);
    }

    #[tokio::test]
    async fn test_times_out_on_hanging_relay() {
        let alice = TestKeys::new(1);
        let event = metadata_event(&alice, 100, "{}");
        let hang = spawn_relay(vec![event.clone()], RelayBehavior::Hang).await;
        let done = spawn_relay(vec![], RelayBehavior::Complete).await;

        let pool = RelayPool::new(
            vec![hang, done],
            Duration::from_millis(500),
            &Settings::default(),
        );
        let started = std::time::Instant::now();
        let mut query = pool.query(Filter::metadata_of(alice.public_key()));
        assert_eq!(query.next_event().await, Some(event));
        assert_eq!(query.next_event().await, None);
        assert_eq!(query.termination(), Some(PoolTermination::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(3));

        // terminal signal is sticky
        assert_eq!(query.next_event().await, None);
        assert_eq!(query.termination(), Some(PoolTermination::TimedOut));
    }

    #[tokio::test]
    async fn test_unreachable_relay_does_not_abort() {
        let bob = TestKeys::new(2);
        let alice = TestKeys::new(1);
        let follows = contact_list(&bob, 100, &[alice.public_key()]);
        let good = spawn_relay(vec![follows.clone()], RelayBehavior::Complete).await;
        let bad = unreachable_relay().await;

        let pool = RelayPool::new(vec![bad, good], Duration::from_secs(5), &Settings::default());
        let (events, termination) = pool
            .query(Filter::contact_lists_tagging(alice.public_key()))
            .collect()
            .await;
        assert_eq!(termination, PoolTermination::AllCompleted);
        assert_eq!(events, vec![follows]);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = RelayPool::new(vec![], Duration::from_secs(5), &Settings::default());
        let (events, termination) = pool.query(Filter::new()).collect().await;
        assert!(events.is_empty());
        assert_eq!(termination, PoolTermination::AllCompleted);
    }

    #[tokio::test]
    async fn test_relay_fetcher() {
        let alice = TestKeys::new(1);
        let event = metadata_event(&alice, 100, "{}");
        let relay = spawn_relay(vec![event.clone()], RelayBehavior::Complete).await;
        let fetcher = RelayFetcher::new(&Settings::default());
        let events = fetcher
            .fetch(
                Filter::metadata_of(alice.public_key()),
                vec![relay],
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(events, vec![event]);
    }
}
