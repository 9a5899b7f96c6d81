//! A minimal work-distribution primitive: `P` worker threads pull indices
//! `0..N` from a shared counter and call `f(i)` for each. Kept as a direct
//! translation of `lib/parallel/parallel_iter.c` rather than handed off to
//! a general-purpose pool, since the contract (shared counter behind a
//! mutex, every call joined before returning, the last non-zero return
//! code wins) is itself part of what gets tested.

use std::sync::Mutex;
use std::thread;

/// Call `f(i)` for every `i` in `0..n`, using up to `p` worker threads.
/// Returns the last non-zero value any call to `f` returned, or `0` if
/// every call returned `0`.
pub fn for_each<F>(p: usize, n: usize, f: F) -> i32
where
    F: Fn(usize) -> i32 + Sync,
{
    assert!(p > 0, "parallel::for_each requires at least one worker");

    let next = Mutex::new(0usize);
    let rc = Mutex::new(0i32);

    thread::scope(|scope| {
        for _ in 0..p.min(n.max(1)) {
            scope.spawn(|| loop {
                let i = {
                    let mut guard = next.lock().unwrap();
                    if *guard >= n {
                        break;
                    }
                    let i = *guard;
                    *guard += 1;
                    i
                };

                let r = f(i);
                if r != 0 {
                    *rc.lock().unwrap() = r;
                }
            });
        }
    });

    *rc.lock().unwrap()
}

/// A fixed-size array of `Option<T>` slots that multiple threads may write
/// to concurrently, each to a disjoint index. Each slot is its own `Mutex`,
/// so concurrent `set` calls to different indices never contend; callers
/// must fill every index before calling [`SlotVec::into_inner`].
pub struct SlotVec<T> {
    cells: Vec<Mutex<Option<T>>>,
}

impl<T> SlotVec<T> {
    pub fn new(n: usize) -> Self {
        let mut cells = Vec::with_capacity(n);
        cells.resize_with(n, || Mutex::new(None));
        SlotVec { cells }
    }

    pub fn set(&self, i: usize, value: T) {
        *self.cells[i].lock().unwrap() = Some(value);
    }

    pub fn into_inner(self) -> Vec<Option<T>> {
        self.cells.into_iter().map(|cell| cell.into_inner().unwrap()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn visits_every_index_exactly_once() {
        let seen = SlotVec::new(100);
        for_each(4, 100, |i| {
            seen.set(i, true);
            0
        });
        let out = seen.into_inner();
        assert!(out.iter().all(|x| x == &Some(true)));
    }

    #[test]
    fn reports_last_nonzero_return_code() {
        let rc = for_each(3, 10, |i| if i == 5 { 7 } else { 0 });
        assert_eq!(rc, 7);
    }

    #[test]
    fn zero_items_returns_zero() {
        let rc = for_each(4, 0, |_| 1);
        assert_eq!(rc, 0);
    }

    #[test]
    fn single_worker_matches_many_workers() {
        let counter = AtomicUsize::new(0);
        for_each(1, 50, |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        });
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
