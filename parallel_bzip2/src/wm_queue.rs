//! WM queue: workers publish decoded sub-blocks here; the muxer drains it
//! whenever the specific sub-block it's waiting for has arrived, or when
//! there are chunk credits to refund, or when every worker has exited.

use std::sync::{Condvar, Mutex};

use crate::block::{DecompressedSubBlock, SubBlockKey};

struct WmState {
    pending: Vec<DecompressedSubBlock>,
    needed: SubBlockKey,
    working: u32,
    num_rel: u32,
}

pub struct Drained {
    pub subs: Vec<DecompressedSubBlock>,
    pub credits: u32,
    pub working: u32,
}

pub struct WmQueue {
    state: Mutex<WmState>,
    cv: Condvar,
}

impl WmQueue {
    pub fn new(num_workers: u32, initial_needed: SubBlockKey) -> Self {
        Self {
            state: Mutex::new(WmState {
                pending: Vec::new(),
                needed: initial_needed,
                working: num_workers,
                num_rel: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// A worker finished decoding a slice; hand it to the muxer.
    pub fn publish(&self, sub: DecompressedSubBlock) {
        let mut st = self.state.lock().unwrap();
        let is_needed = st.num_rel == 0 && sub.key == st.needed;
        st.pending.push(sub);
        if is_needed {
            self.cv.notify_one();
        }
    }

    /// A worker released one or more chunks' refcounts to zero (`n` may be
    /// more than one when a release cascades through a run of already-spent
    /// predecessors); that many slot credits are owed back to the splitter.
    /// A no-op for `n == 0`.
    pub fn release_credit(&self, n: u32) {
        if n == 0 {
            return;
        }
        let mut st = self.state.lock().unwrap();
        let was_zero = st.num_rel == 0;
        st.num_rel += n;
        if was_zero {
            self.cv.notify_one();
        }
    }

    /// A worker thread has exited for good.
    pub fn worker_exited(&self) {
        let mut st = self.state.lock().unwrap();
        st.working -= 1;
        if st.working == 0 && st.num_rel == 0 && st.pending.is_empty() {
            self.cv.notify_one();
        }
    }

    /// Block until there is something to do, then atomically take
    /// everything pending.
    pub fn wait_and_drain(&self) -> Drained {
        let mut st = self.state.lock().unwrap();
        loop {
            let has_needed = st.pending.iter().any(|s| s.key == st.needed);
            if has_needed || st.num_rel > 0 || st.working == 0 {
                let subs = std::mem::take(&mut st.pending);
                let credits = std::mem::take(&mut st.num_rel);
                return Drained {
                    subs,
                    credits,
                    working: st.working,
                };
            }
            st = self.cv.wait(st).unwrap();
        }
    }

    /// Muxer records the next key it's waiting for, so future `publish`
    /// calls know whether to wake it.
    pub fn set_needed(&self, needed: SubBlockKey) {
        let mut st = self.state.lock().unwrap();
        st.needed = needed;
    }
}
