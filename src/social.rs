use crate::event::{Event, EventKind};
use crate::filter::Filter;
use crate::keys::PublicKey;
use crate::metadata::select_canonical;
use crate::pool::EventFetcher;
use crate::relay_url::RelayUrl;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocialCounts {
    pub followers: u64,
    pub following: u64,
}

/// Count followers and followings of `pubkey` from contact lists.
///
/// Both queries run at once over the same relays. Relays that fail just
/// contribute nothing.
pub async fn count_social_graph(
    fetcher: &dyn EventFetcher,
    pubkey: PublicKey,
    relays: Vec<RelayUrl>,
    timeout: Duration,
) -> SocialCounts {
    let (own, tagging) = tokio::join!(
        fetcher.fetch(Filter::contact_list_of(pubkey), relays.clone(), timeout),
        fetcher.fetch(Filter::contact_lists_tagging(pubkey), relays, timeout),
    );

    let counts = SocialCounts {
        followers: count_followers(pubkey, &tagging),
        following: count_following(pubkey, &own),
    };
    tracing::debug!(
        "{}: {} followers, {} following",
        pubkey,
        counts.followers,
        counts.following
    );
    counts
}

/// Distinct keys tagged in the newest contact list of `pubkey`
pub fn count_following(pubkey: PublicKey, events: &[Event]) -> u64 {
    let newest = select_canonical(
        events
            .iter()
            .filter(|e| e.kind == EventKind::ContactList && e.pubkey == pubkey),
    );
    match newest {
        Some(event) => event.tagged_pubkeys().collect::<HashSet<PublicKey>>().len() as u64,
        None => 0,
    }
}

/// Distinct other authors whose newest contact list tags `pubkey`.
///
/// Only the lists among `events` are compared. Fetched with a `#p` filter,
/// an author's newer list that no longer tags `pubkey` is not returned, so
/// an unfollow is only seen when such a list arrives by other means. Under
/// that query this is a count of distinct tagging authors.
pub fn count_followers(pubkey: PublicKey, events: &[Event]) -> u64 {
    let mut newest_by_author: HashMap<PublicKey, &Event> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| e.kind == EventKind::ContactList && e.pubkey != pubkey)
    {
        let newest = newest_by_author.entry(event.pubkey).or_insert(event);
        if (event.created_at, &event.id) > (newest.created_at, &newest.id) {
            *newest = event;
        }
    }

    newest_by_author
        .values()
        .filter(|e| e.tagged_pubkeys().any(|pk| pk == pubkey))
        .count() as u64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{contact_list, metadata_event, CountingFetcher, TestKeys};

    #[test]
    fn test_following_uses_newest_list() {
        let alice = TestKeys::new(1);
        let bob = TestKeys::new(2).public_key();
        let carol = TestKeys::new(3).public_key();
        let dave = TestKeys::new(4).public_key();

        let events = vec![
            contact_list(&alice, 100, &[bob, carol, dave]),
            contact_list(&alice, 200, &[bob, carol, carol]),
        ];
        assert_eq!(count_following(alice.public_key(), &events), 2);
        assert_eq!(count_following(bob, &events), 0);
    }

    #[test]
    fn test_followers() {
        let alice = TestKeys::new(1);
        let bob = TestKeys::new(2);
        let carol = TestKeys::new(3);
        let dave = TestKeys::new(4);
        let a = alice.public_key();

        let events = vec![
            contact_list(&bob, 100, &[a]),
            contact_list(&bob, 150, &[a, carol.public_key()]),
            contact_list(&carol, 100, &[a]),
            // dave followed and then unfollowed
            contact_list(&dave, 100, &[a]),
            contact_list(&dave, 200, &[bob.public_key()]),
            // self-follows don't count
            contact_list(&alice, 100, &[a]),
            metadata_event(&bob, 300, "{}"),
        ];
        assert_eq!(count_followers(a, &events), 2);
    }

    #[tokio::test]
    async fn test_count() {
        let alice = TestKeys::new(1);
        let bob = TestKeys::new(2);
        let carol = TestKeys::new(3);
        let a = alice.public_key();

        let fetcher = CountingFetcher::new(vec![
            contact_list(&alice, 100, &[bob.public_key()]),
            contact_list(&bob, 100, &[a]),
            contact_list(&carol, 100, &[a]),
        ]);
        let counts = count_social_graph(&fetcher, a, vec![], Duration::from_secs(1)).await;
        assert_eq!(
            counts,
            SocialCounts {
                followers: 2,
                following: 1
            }
        );
        assert_eq!(fetcher.query_count(), 2);
    }
}
