//! Background, real-time-paced simulation driver.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sim::engine::SimulationEngine;

/// Drives a [`SimulationEngine`] from a background thread, pacing wall
/// clock against simulation time.
///
/// The engine is shared behind a mutex that the driver holds for exactly
/// one full iteration, so a foreground caller using [`engine`] always
/// observes the simulation at an iteration boundary, never mid-propagation.
///
/// A target real-time factor of `1.0` tracks wall-clock time; `2.0` runs
/// twice as fast. Non-positive targets disable pacing entirely.
///
/// [`engine`]: SimulationRunner::engine
pub struct SimulationRunner {
    engine: Arc<Mutex<SimulationEngine>>,
    stop: Arc<AtomicBool>,
    target_rtf: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<Error>>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulationRunner {
    /// Takes ownership of `engine`; access it afterwards through
    /// [`SimulationRunner::engine`].
    pub fn new(engine: SimulationEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            stop: Arc::new(AtomicBool::new(false)),
            target_rtf: Arc::new(AtomicU64::new(1.0_f64.to_bits())),
            failure: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    /// Shared handle to the driven engine, for foreground inspection and
    /// mutation between iterations.
    pub fn engine(&self) -> Arc<Mutex<SimulationEngine>> {
        Arc::clone(&self.engine)
    }

    /// Target real-time factor currently in effect.
    pub fn real_time_factor(&self) -> f64 {
        f64::from_bits(self.target_rtf.load(Ordering::Relaxed))
    }

    /// Rescales the wall-clock pacing, effective from the next iteration.
    /// Non-positive values disable pacing.
    pub fn set_real_time_factor(&self, factor: f64) {
        let target = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            f64::INFINITY
        };
        self.target_rtf.store(target.to_bits(), Ordering::Relaxed);
    }

    /// Launches the driving loop on a separate thread.
    ///
    /// # Errors
    ///
    /// Fails if the runner is already started.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::InvalidState {
                operation: "start runner",
                state: "running",
            });
        }
        self.stop.store(false, Ordering::Relaxed);

        let engine = Arc::clone(&self.engine);
        let stop = Arc::clone(&self.stop);
        let target_rtf = Arc::clone(&self.target_rtf);
        let failure = Arc::clone(&self.failure);

        self.handle = Some(thread::spawn(move || {
            let wall_start = Instant::now();
            let sim_start = lock(&engine).time();
            debug!(sim_start, "simulation runner started");

            while !stop.load(Ordering::Relaxed) {
                // One full iteration under the lock; the pacing sleep
                // happens with the lock released.
                let result = lock(&engine).step(1);

                match result {
                    Ok(now) => {
                        let factor = f64::from_bits(target_rtf.load(Ordering::Relaxed));
                        if factor.is_finite() {
                            let target =
                                Duration::from_secs_f64(((now - sim_start) / factor).max(0.0));
                            let elapsed = wall_start.elapsed();
                            if target > elapsed {
                                thread::sleep(target - elapsed);
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "runner iteration failed, stopping");
                        *lock(&failure) = Some(err);
                        break;
                    }
                }
            }
            debug!("simulation runner stopped");
        }));
        Ok(())
    }

    /// Requests cooperative termination and waits for the loop to exit.
    ///
    /// An iteration already in progress completes first. Returns the error
    /// that stopped the loop, if one did.
    pub fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        match lock(&self.failure).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether the driver thread is currently alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Retrieves (and clears) the error that stopped the loop, if any.
    pub fn take_error(&self) -> Option<Error> {
        lock(&self.failure).take()
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Locks a mutex, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
