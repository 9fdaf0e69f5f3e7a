// src/driver.rs
//
// Periodic driver thread.
//
// Calls `pump` on a shared target at a fixed interval until dropped. The
// target decides what a pump does; the sequencer commits everything due
// inside its look-ahead window.

use std::io;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::host::AudioHost;
use crate::sequencer::Sequencer;

/// Something that can be advanced by the driver.
pub trait Pump: Send {
    /// Do one round of work. Returns how many items were handled.
    fn pump(&mut self) -> usize;
}

impl<H: AudioHost> Pump for Sequencer<H> {
    fn pump(&mut self) -> usize {
        Sequencer::pump(self)
    }
}

/// Handle to a running driver thread. Dropping it stops and joins the thread.
pub struct Driver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    pub fn spawn<P: Pump + 'static>(target: Arc<Mutex<P>>, interval: Duration) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("nesdaw-driver".into())
            .spawn(move || {
                log::debug!("driver started ({:?} interval)", interval);
                while flag.load(Ordering::Acquire) {
                    match target.lock() {
                        Ok(mut guard) => {
                            guard.pump();
                        }
                        Err(_) => {
                            log::error!("driver target lock poisoned; stopping");
                            break;
                        }
                    }
                    thread::sleep(interval);
                }
                log::debug!("driver stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("driver thread panicked");
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    impl Pump for Counter {
        fn pump(&mut self) -> usize {
            self.0 += 1;
            1
        }
    }

    #[test]
    fn test_pumps_until_stopped() {
        let target = Arc::new(Mutex::new(Counter(0)));
        let mut driver = Driver::spawn(Arc::clone(&target), Duration::from_millis(1)).unwrap();
        assert!(driver.is_running());

        thread::sleep(Duration::from_millis(30));
        driver.stop();
        assert!(!driver.is_running());

        let count = target.lock().unwrap().0;
        assert!(count > 0);

        thread::sleep(Duration::from_millis(10));
        assert_eq!(target.lock().unwrap().0, count);
    }

    #[test]
    fn test_drop_joins() {
        let target = Arc::new(Mutex::new(Counter(0)));
        {
            let _driver = Driver::spawn(Arc::clone(&target), Duration::from_millis(1)).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        let count = target.lock().unwrap().0;
        thread::sleep(Duration::from_millis(10));
        assert_eq!(target.lock().unwrap().0, count);
    }
}
