//! Background teardown of detached subtrees.
//!
//! Dropping a large subtree walks every node in it. After a tree reuse the
//! parts of the old tree that are no longer reachable are handed to a
//! [`Reclaimer`], whose thread drops them while the next search runs.
//! [`Reclaimer::wait_idle`] is the join point: once it returns, every
//! subtree sent so far has been freed and [`crate::node::tree_size`] is
//! accurate again.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::node::UctNode;

struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn finish_one(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// A thread that drops subtrees sent to it.
pub struct Reclaimer {
    sender: Option<Sender<Box<UctNode>>>,
    pending: Arc<Pending>,
    handle: Option<JoinHandle<()>>,
}

impl Reclaimer {
    pub fn new() -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Box<UctNode>>();
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });

        let worker_pending = Arc::clone(&pending);
        let handle = std::thread::Builder::new()
            .name("tree-reclaimer".to_string())
            .spawn(move || {
                for subtree in receiver {
                    drop(subtree);
                    worker_pending.finish_one();
                }
            })?;

        Ok(Reclaimer {
            sender: Some(sender),
            pending,
            handle: Some(handle),
        })
    }

    /// Queue `subtree` for dropping.
    pub fn reclaim(&self, subtree: Box<UctNode>) {
        *self.pending.count.lock() += 1;
        let Some(sender) = &self.sender else {
            self.pending.finish_one();
            return;
        };
        if let Err(mpsc::SendError(subtree)) = sender.send(subtree) {
            // Reclaimer thread is gone: drop it here instead.
            drop(subtree);
            self.pending.finish_one();
        }
    }

    /// Subtrees queued but not yet dropped.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Block until every queued subtree has been dropped.
    pub fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            trace!(pending = *count, "waiting for tree reclaimer");
            self.pending.idle.wait(&mut count);
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        // Closing the channel ends the thread once the queue is drained.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_idle_drains_queue() {
        let reclaimer = Reclaimer::new().unwrap();
        for _ in 0..16 {
            reclaimer.reclaim(Box::new(UctNode::new_root()));
        }
        reclaimer.wait_idle();
        assert_eq!(reclaimer.pending(), 0);
    }

    #[test]
    fn test_wait_idle_without_work_returns() {
        let reclaimer = Reclaimer::new().unwrap();
        reclaimer.wait_idle();
        assert_eq!(reclaimer.pending(), 0);
    }

    #[test]
    fn test_drop_finishes_queued_work() {
        let reclaimer = Reclaimer::new().unwrap();
        let node = UctNode::new_root();
        node.update(1.0);
        reclaimer.reclaim(Box::new(node));
        drop(reclaimer);
    }
}
