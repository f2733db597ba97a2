//! MS queue: chunk-slot credits flowing from the muxer back to the
//! splitter, capping how many input chunks can be in flight at once.

use std::sync::{Condvar, Mutex};

pub struct MsQueue {
    free: Mutex<u32>,
    cv: Condvar,
}

impl MsQueue {
    pub fn new(initial_slots: u32) -> Self {
        Self {
            free: Mutex::new(initial_slots),
            cv: Condvar::new(),
        }
    }

    /// Block until a slot is available, then claim it.
    pub fn acquire(&self) {
        let mut free = self.free.lock().unwrap();
        while *free == 0 {
            free = self.cv.wait(free).unwrap();
        }
        *free -= 1;
    }

    /// Return `n` credits (n=0 is a no-op). Signals once if the pool was
    /// empty before this refund, matching the "signal iff 0 -> nonzero"
    /// minimal-wake rule used by every queue in this crate.
    pub fn release(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut free = self.free.lock().unwrap();
        let was_empty = *free == 0;
        *free += n;
        if was_empty {
            self.cv.notify_one();
        }
    }

    #[cfg(test)]
    pub fn available(&self) -> u32 {
        *self.free.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_release_roundtrip() {
        let q = MsQueue::new(2);
        q.acquire();
        q.acquire();
        assert_eq!(q.available(), 0);
        q.release(1);
        assert_eq!(q.available(), 1);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let q = Arc::new(MsQueue::new(0));
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            q2.acquire();
        });
        thread::sleep(Duration::from_millis(50));
        q.release(1);
        handle.join().unwrap();
    }
}
