use async_trait::async_trait;
use futures::{stream::FuturesUnordered, StreamExt};

/// Wait for the first of a set of tasks and abort all others
#[async_trait]
pub(super) trait FirstFinished<T> {
    /// Result of the first task to finish, `None` if there were no tasks
    async fn first_finished(self) -> Option<Result<T, tokio::task::JoinError>>;
}

#[async_trait]
impl<T> FirstFinished<T> for FuturesUnordered<tokio::task::JoinHandle<T>>
where
    T: Send,
{
    async fn first_finished(mut self) -> Option<Result<T, tokio::task::JoinError>> {
        let first = self.next().await;
        for task in self.into_iter() {
            task.abort();
            // the task is cancelled, awaiting only ensures it is gone
            let _ = task.await;
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn aborts_slower_tasks() {
        let tasks = FuturesUnordered::new();
        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            1
        });
        let slow_abort = slow.abort_handle();
        tasks.push(slow);
        tasks.push(tokio::spawn(async { 2 }));

        assert_eq!(tasks.first_finished().await.unwrap().unwrap(), 2);
        assert!(slow_abort.is_finished());
    }

    #[tokio::test]
    async fn empty_set() {
        let tasks: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();
        assert!(tasks.first_finished().await.is_none());
    }
}
