//! Live vote tallies.
//!
//! Accepted ballots are published as [`VoteEvent`]s whose `seq` is the
//! ballot's autoincrement key, so the ballot table itself is the ordered event log. A
//! subscriber starts from a [`Tally`] snapshot of the aggregate view and folds
//! events into it with [`Tally::apply`]. Delivery may reorder or repeat
//! events; `apply` counts each sequence number at most once.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub seq: i64,
    pub election_id: String,
    pub candidate_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub election_id: String,
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
    /// Every event with `seq <= applied_through` is already counted.
    #[serde(skip)]
    applied_through: i64,
    #[serde(skip)]
    applied: BTreeSet<i64>,
}

impl Tally {
    pub fn new(election_id: impl Into<String>, applied_through: i64) -> Self {
        Self {
            election_id: election_id.into(),
            counts: BTreeMap::new(),
            total: 0,
            applied_through,
            applied: BTreeSet::new(),
        }
    }

    /// Counts from the aggregate view together with the log position they cover.
    pub async fn snapshot(db_pool: &SqlitePool, election_id: &str) -> AppResult<Tally> {
        let mut tx = db_pool.begin().await?;
        let (applied_through,): (i64,) = sqlx::query_as("SELECT COALESCE((SELECT seq FROM sqlite_sequence WHERE name='votes'),0)")
            .fetch_one(&mut *tx)
            .await?;
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT candidate_id,vote_count FROM vote_counts WHERE election_id=?")
            .bind(election_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut tally = Tally::new(election_id, applied_through);
        for (candidate_id, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            tally.total += count;
            tally.counts.insert(candidate_id, count);
        }
        Ok(tally)
    }

    pub fn count(&self, candidate_id: &str) -> u64 {
        self.counts.get(candidate_id).copied().unwrap_or_default()
    }

    /// Folds one event in. Events for other elections only advance the log position.
    pub fn apply(mut self, event: &VoteEvent) -> Tally {
        if event.seq <= self.applied_through || !self.applied.insert(event.seq) {
            return self;
        }
        while self.applied.remove(&(self.applied_through + 1)) {
            self.applied_through += 1;
        }

        if event.election_id == self.election_id {
            *self.counts.entry(event.candidate_id.clone()).or_default() += 1;
            self.total += 1;
        }
        self
    }
}

pub fn replay<'a>(tally: Tally, events: impl IntoIterator<Item = &'a VoteEvent>) -> Tally {
    events.into_iter().fold(tally, Tally::apply)
}

/// Fan-out of accepted ballots to live subscribers.
#[derive(Clone)]
pub struct VoteFeed {
    tx: broadcast::Sender<VoteEvent>,
}

impl VoteFeed {
    pub fn new(capacity: usize) -> Self {
        Self { tx: broadcast::channel(capacity).0 }
    }

    pub fn publish(&self, event: VoteEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoteEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(seq: i64, election_id: &str, candidate_id: &str) -> VoteEvent {
        VoteEvent { seq, election_id: election_id.to_owned(), candidate_id: candidate_id.to_owned() }
    }

    #[test]
    fn counts_votes_for_its_election() {
        let tally = replay(Tally::new("e1", 0), &[
            vote(1, "e1", "alice"),
            vote(2, "e2", "carol"),
            vote(3, "e1", "bob"),
            vote(4, "e1", "alice"),
        ]);
        assert_eq!(tally.count("alice"), 2);
        assert_eq!(tally.count("bob"), 1);
        assert_eq!(tally.count("carol"), 0);
        assert_eq!(tally.total, 3);
    }

    #[test]
    fn duplicates_and_snapshot_covered_events_are_ignored() {
        let tally = replay(Tally::new("e1", 5), &[
            vote(5, "e1", "alice"),
            vote(6, "e1", "alice"),
            vote(6, "e1", "alice"),
        ]);
        assert_eq!(tally.total, 1);
    }

    #[test]
    fn out_of_order_delivery_converges() {
        let events = [vote(1, "e1", "a"), vote(2, "e1", "b"), vote(3, "e1", "a"), vote(4, "e1", "c")];
        let in_order = replay(Tally::new("e1", 0), &events);
        let shuffled = replay(Tally::new("e1", 0), [&events[2], &events[0], &events[3], &events[1], &events[2]]);
        assert_eq!(in_order, shuffled);
        assert_eq!(shuffled.applied_through, 4);
        assert!(shuffled.applied.is_empty());
    }

    #[tokio::test]
    async fn feed_delivers_to_subscribers() {
        let feed = VoteFeed::new(8);
        feed.publish(vote(1, "e1", "a"));

        let mut rx = feed.subscribe();
        feed.publish(vote(2, "e1", "a"));
        assert_eq!(rx.recv().await.unwrap().seq, 2);
    }
}
