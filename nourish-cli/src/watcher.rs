//! Background question watcher.
//!
//! Polls the store on a fixed interval and hands every record the cursor has
//! not delivered yet to a callback, oldest first. Store reads run on the
//! blocking pool. A failed poll is logged and retried on the next tick from
//! the same cursor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nourish_core::{PollCursor, Question, Store, StoreError, WatchKind};

pub struct QuestionWatcher<S> {
    store: Arc<S>,
    kind: WatchKind,
    every: Duration,
}

impl<S: Store + 'static> QuestionWatcher<S> {
    pub fn new(store: Arc<S>, kind: WatchKind, every: Duration) -> Self {
        Self { store, kind, every }
    }

    async fn poll_once(&self, cursor: &PollCursor) -> Result<(Vec<Question>, PollCursor), StoreError> {
        let store = Arc::clone(&self.store);
        let kind = self.kind;
        let mut next = cursor.clone();
        tokio::task::spawn_blocking(move || next.poll(store.as_ref(), kind).map(|found| (found, next)))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    /// Run until `cancel` fires; resolves to the final cursor.
    pub async fn run<F>(self, mut cursor: PollCursor, cancel: CancellationToken, mut on_new: F) -> PollCursor
    where
        F: FnMut(&Question),
    {
        while !cancel.is_cancelled() {
            match self.poll_once(&cursor).await {
                Ok((found, next)) => {
                    for q in &found {
                        on_new(q);
                    }
                    if !found.is_empty() {
                        debug!(kind = ?self.kind, count = found.len(), mark = %next.mark(), "questions delivered");
                    }
                    cursor = next;
                }
                Err(e) => warn!(kind = ?self.kind, error = %e, "question poll failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.every) => {}
            }
        }
        cursor
    }

    pub fn spawn<F>(self, cursor: PollCursor, cancel: CancellationToken, on_new: F) -> JoinHandle<PollCursor>
    where
        F: FnMut(&Question) + Send + 'static,
    {
        tokio::spawn(self.run(cursor, cancel, on_new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use nourish_core::{MemoryStore, Query, Record};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Memory store whose first `failures` queries fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    impl Store for FlakyStore {
        fn insert<R: Record>(&self, rows: Vec<R>) -> Result<Vec<R>, StoreError> {
            self.inner.insert(rows)
        }

        fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>, StoreError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.query(query)
        }

        fn update<R: Record>(&self, query: &Query, patch: &dyn Fn(&mut R)) -> Result<usize, StoreError> {
            self.inner.update(query, patch)
        }

        fn delete<R: Record>(&self, query: &Query) -> Result<usize, StoreError> {
            self.inner.delete::<R>(query)
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_does_not_skip_records() {
        let store = Arc::new(FlakyStore {
            failures: AtomicUsize::new(1),
            ..FlakyStore::default()
        });
        let caregiver = Uuid::new_v4();
        let q = Question::ask(Uuid::new_v4(), caregiver, Some("Fruit?"), None, at(9, 0));
        store.insert_one(q.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cancel = CancellationToken::new();
        let handle = QuestionWatcher::new(Arc::clone(&store), WatchKind::NewFor(caregiver), Duration::from_secs(15))
            .spawn(PollCursor::new(at(8, 50)), cancel.clone(), move |q| sink.lock().unwrap().push(q.id));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(*seen.lock().unwrap(), vec![q.id]);

        // Later ticks do not redeliver.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        cancel.cancel();
        assert_eq!(handle.await.unwrap().mark(), at(9, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_in_order_and_stops_on_cancel() {
        let store = Arc::new(FlakyStore::default());
        let subject = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = QuestionWatcher::new(Arc::clone(&store), WatchKind::AnsweredFor(subject), Duration::from_secs(15))
            .spawn(PollCursor::new(at(8, 0)), cancel.clone(), move |q| {
                sink.lock().unwrap().push(q.answer_text.clone().unwrap_or_default())
            });

        let mut late = Question::ask(subject, Uuid::new_v4(), Some("b"), None, at(8, 30));
        late.answer("second", at(10, 0));
        let mut early = Question::ask(subject, Uuid::new_v4(), Some("a"), None, at(8, 10));
        early.answer("first", at(9, 0));
        store.insert(vec![late, early]).unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["first".to_string(), "second".to_string()]);

        cancel.cancel();
        let cursor = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(cursor.mark(), at(10, 0));
    }
}
