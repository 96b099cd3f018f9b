pub mod hash;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore. The renderer uses it with capacity 1 to keep at most one
/// sample pass in its encode/submit cycle.
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        *permits -= 1;
        SemaphorePermit { sem: self }
    }
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        *self.sem.permits.lock() += 1;
        self.sem.cond.notify_one();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn permit_released_on_drop() {
        let sem = Semaphore::new(1);
        {
            let _p = sem.acquire();
            assert_eq!(sem.available(), 0);
        }
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn serializes_holders() {
        let sem = Arc::new(Semaphore::new(1));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let (sem, inside, max_seen) = (sem.clone(), inside.clone(), max_seen.clone());
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _p = sem.acquire();
                        let n = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(n, Ordering::SeqCst);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
