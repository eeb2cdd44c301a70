use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// What a [`ShardQueue::fold_scan`] visitor decides for one queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Keep,
    Remove,
    Stop,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Blocking FIFO feeding one worker, or the listing workers of a group.
///
/// A capacity of zero means unbounded.
pub struct ShardQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> ShardQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append unless the queue is full or closed; the item comes back then.
    pub fn offer(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.closed || (self.capacity > 0 && state.items.len() >= self.capacity) {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Wait for the next item. `None` once the queue is closed.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Stop accepting and handing out items; returns what was still queued.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let rest = state.items.drain(..).collect();
        drop(state);
        self.available.notify_all();
        rest
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Render every queued item, front first.
    pub fn snapshot<R>(&self, mut render: impl FnMut(&T) -> R) -> Vec<R> {
        self.state.lock().items.iter().map(|item| render(item)).collect()
    }

    /// Visit queued items front to back under the queue lock and pull out
    /// those the visitor marks [`ScanStep::Remove`]. The scan ends at the
    /// first [`ScanStep::Stop`], which leaves that item queued.
    pub fn fold_scan(&self, mut visit: impl FnMut(&mut T) -> ScanStep) -> Vec<T> {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        let mut index = 0;
        while index < state.items.len() {
            let step = match state.items.get_mut(index) {
                Some(item) => visit(item),
                None => break,
            };
            match step {
                ScanStep::Keep => index += 1,
                ScanStep::Stop => break,
                ScanStep::Remove => {
                    if let Some(item) = state.items.remove(index) {
                        removed.push(item);
                    }
                }
            }
        }
        removed
    }
}
