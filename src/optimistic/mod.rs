//! Optimistic local updates with rollback.
//!
//! The local copy changes first, the remote write runs, and the change is
//! reverted if the write fails.

use std::future::Future;

#[derive(Debug, Clone)]
pub struct Optimistic<T: Clone> {
    confirmed: T,
    current: T,
}

impl<T: Clone> Optimistic<T> {
    pub fn new(value: T) -> Self {
        Self {
            confirmed: value.clone(),
            current: value,
        }
    }

    /// The value including any unconfirmed change.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Apply a local change ahead of the remote write.
    pub fn apply(&mut self, change: impl FnOnce(&mut T)) {
        change(&mut self.current);
    }

    /// Accept the authoritative value returned by the remote side.
    pub fn confirm(&mut self, value: T) {
        self.confirmed = value.clone();
        self.current = value;
    }

    pub fn rollback(&mut self) {
        self.current = self.confirmed.clone();
    }

    /// Apply `change`, await `remote`, then confirm with its result or roll back.
    ///
    /// `publish` sees the optimistic value immediately and the final value
    /// after the remote call settles.
    pub async fn run<E, Fut, P, PFut>(
        &mut self,
        change: impl FnOnce(&mut T),
        remote: Fut,
        mut publish: P,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(T) -> PFut,
        PFut: Future<Output = ()>,
    {
        self.apply(change);
        publish(self.current.clone()).await;

        match remote.await {
            Ok(value) => {
                self.confirm(value);
                publish(self.current.clone()).await;
                Ok(self.current.clone())
            }
            Err(e) => {
                self.rollback();
                publish(self.current.clone()).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_confirm_on_success() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut count = Optimistic::new(4_i64);

        let sink = seen.clone();
        let result: Result<i64, String> = count
            .run(|c| *c += 1, async { Ok(5) }, |v| {
                sink.lock().unwrap().push(v);
                async {}
            })
            .await;

        assert_eq!(result, Ok(5));
        assert_eq!(*count.current(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_rollback_on_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut liked = Optimistic::new(false);

        let sink = seen.clone();
        let result: Result<bool, &str> = liked
            .run(|l| *l = true, async { Err("offline") }, |v| {
                sink.lock().unwrap().push(v);
                async {}
            })
            .await;

        assert_eq!(result, Err("offline"));
        assert!(!*liked.current());
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}
