//! Bounded-concurrency dispatch (§5): member/team tasks run truly in
//! parallel up to a limit via a semaphore-bounded `tokio::task::JoinSet`,
//! with results reassembled by index so the caller sees input order
//! regardless of completion order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub async fn run_with_concurrency_limit<T, Fut, R, F>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let f = Arc::new(f);
    let mut set = JoinSet::new();
    let total = items.len();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed while tasks are outstanding");
            let result = f(item).await;
            (index, result)
        });
    }

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.expect("dispatch task panicked");
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .map(|slot| slot.expect("every index populated before join_next exhausts"))
        .collect()
}
