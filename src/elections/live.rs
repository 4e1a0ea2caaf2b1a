use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::AppResult;

use super::{Election, Tally, VoteEvent, VoteFeed};

/// Streams a snapshot of the election's tally, then the tally after every new ballot.
#[debug_handler(state = crate::AppState)]
pub async fn live_tally(
    Path(election_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(feed): State<VoteFeed>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let election = Election::fetch(&db_pool, &election_id.to_string()).await?;

    Ok(ws.on_upgrade(async move |stream| stream_tally(stream, db_pool, feed, election.id).await))
}

async fn stream_tally(stream: WebSocket, db_pool: SqlitePool, feed: VoteFeed, election_id: String) {
    // subscribe before the snapshot so nothing falls between the two
    let rx = feed.subscribe();
    let (sender, mut receiver) = stream.split();

    let mut forward_task = tokio::spawn(forward_tally(sender, rx, db_pool, election_id));

    // the client only ever closes; anything else it sends is ignored
    loop {
        tokio::select! {
            _ = &mut forward_task => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    forward_task.abort();
                    break;
                }
                Some(Ok(_)) => continue,
            },
        }
    }
}

/// Sends a snapshot frame, then a tally frame per ballot in `election_id`,
/// until the feed closes or the sink refuses a frame. Hands the sink back.
pub(crate) async fn forward_tally<S>(
    mut sender: S,
    mut rx: broadcast::Receiver<VoteEvent>,
    db_pool: SqlitePool,
    election_id: String,
) -> S
where
    S: Sink<Message> + Unpin,
{
    let mut tally = match Tally::snapshot(&db_pool, &election_id).await {
        Ok(tally) => tally,
        Err(err) => {
            tracing::warn!("live tally snapshot failed: {err}");
            return sender;
        }
    };
    if sender.send(frame("snapshot", &tally)).await.is_err() {
        return sender;
    }

    loop {
        let msg = match rx.recv().await {
            Ok(event) if event.election_id == election_id => {
                tally = tally.apply(&event);
                frame("tally", &tally)
            }
            Ok(event) => {
                tally = tally.apply(&event);
                continue;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "live tally lagged, resynchronising");
                match Tally::snapshot(&db_pool, &election_id).await {
                    Ok(fresh) => tally = fresh,
                    Err(err) => {
                        tracing::warn!("live tally resync failed: {err}");
                        break;
                    }
                }
                frame("snapshot", &tally)
            }
            Err(RecvError::Closed) => break,
        };
        if sender.send(msg).await.is_err() {
            break;
        }
    }
    sender
}

fn frame(kind: &str, tally: &Tally) -> Message {
    Message::text(json!({ "type": kind, "tally": tally }).to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::db;

    use super::*;

    fn decode(msg: &Message) -> Value {
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    fn vote(seq: i64, election_id: &str, candidate_id: &str) -> VoteEvent {
        VoteEvent { seq, election_id: election_id.to_owned(), candidate_id: candidate_id.to_owned() }
    }

    #[tokio::test]
    async fn snapshot_then_a_tally_per_ballot() {
        let db_pool = db::memory_pool().await.unwrap();
        let feed = VoteFeed::new(16);
        let rx = feed.subscribe();

        feed.publish(vote(1, "e1", "ada"));
        feed.publish(vote(2, "e2", "grace"));
        feed.publish(vote(3, "e1", "ada"));
        feed.publish(vote(3, "e1", "ada"));
        drop(feed);

        let frames = forward_tally(Vec::<Message>::new(), rx, db_pool, "e1".to_owned()).await;
        let frames: Vec<Value> = frames.iter().map(decode).collect();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["type"], "snapshot");
        assert_eq!(frames[0]["tally"]["total"], 0);
        assert_eq!(frames[1]["type"], "tally");
        assert_eq!(frames[1]["tally"]["counts"]["ada"], 1);
        // a repeated event is framed but not counted twice
        assert_eq!(frames[2]["tally"]["total"], 2);
        assert_eq!(frames[3]["tally"]["total"], 2);
    }

    #[tokio::test]
    async fn lagging_receivers_resynchronise_from_storage() {
        let db_pool = db::memory_pool().await.unwrap();
        let feed = VoteFeed::new(1);
        let rx = feed.subscribe();

        feed.publish(vote(1, "e1", "ada"));
        feed.publish(vote(2, "e1", "ada"));
        drop(feed);

        let frames = forward_tally(Vec::<Message>::new(), rx, db_pool, "e1".to_owned()).await;
        let kinds: Vec<Value> = frames.iter().map(|msg| decode(msg)["type"].clone()).collect();
        assert_eq!(kinds, ["snapshot", "snapshot", "tally"]);
    }
}
