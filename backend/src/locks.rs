use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// One async mutex per game. Holding the guard serializes every
/// read-validate-write sequence for that game; other games are unaffected.
/// An entry lives only while someone holds or waits for it.
#[derive(Clone, Default)]
pub struct GameLocks {
    inner: Arc<Mutex<LockMap>>,
}

pub struct GameGuard {
    guard: Option<OwnedMutexGuard<()>>,
    game_id: String,
    locks: Arc<Mutex<LockMap>>,
}

impl GameLocks {
    pub async fn acquire(&self, game_id: &str) -> GameGuard {
        let lock = lock_map(&self.inner)
            .entry(game_id.to_string())
            .or_default()
            .clone();
        GameGuard {
            guard: Some(lock.lock_owned().await),
            game_id: game_id.to_string(),
            locks: self.inner.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock_map(&self.inner).len()
    }
}

impl Drop for GameGuard {
    fn drop(&mut self) {
        let mut locks = lock_map(&self.locks);
        // Release while the map is held so a new caller cannot slip in on a
        // fresh entry before the old guard is gone.
        self.guard.take();
        let idle = locks
            .get(&self.game_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.game_id);
        }
    }
}

fn lock_map(inner: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
