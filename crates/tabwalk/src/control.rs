//! Pause gate and stop flag for a running traversal.
//!
//! The worker only looks at the signal at node boundaries via
//! [`RunControl::checkpoint`]; control callers flip it from any task.

use tokio::sync::watch;

/// Signal observed by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Keep going
    Running,
    /// Block at the next boundary until resumed
    Paused,
    /// Halt at the next boundary; one-way for the rest of the run
    Stopped,
}

/// What the worker should do at a boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Process the next node
    Continue,
    /// Stop traversal
    Stop,
}

/// Shared pause/stop control for one run
#[derive(Debug, Clone)]
pub struct RunControl {
    tx: std::sync::Arc<watch::Sender<ControlSignal>>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    /// Create a control in the running state
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlSignal::Running);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Current signal
    #[must_use]
    pub fn signal(&self) -> ControlSignal {
        *self.tx.borrow()
    }

    /// Whether stop has been requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.signal() == ControlSignal::Stopped
    }

    /// Whether the gate is closed
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.signal() == ControlSignal::Paused
    }

    /// Close the gate. Returns false unless the run was running.
    pub fn pause(&self) -> bool {
        self.tx.send_if_modified(|signal| {
            if *signal == ControlSignal::Running {
                *signal = ControlSignal::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Open the gate. Returns false unless the run was paused.
    pub fn resume(&self) -> bool {
        self.tx.send_if_modified(|signal| {
            if *signal == ControlSignal::Paused {
                *signal = ControlSignal::Running;
                true
            } else {
                false
            }
        })
    }

    /// Pause when running, resume when paused; returns the new signal
    pub fn toggle(&self) -> ControlSignal {
        self.tx.send_if_modified(|signal| match *signal {
            ControlSignal::Running => {
                *signal = ControlSignal::Paused;
                true
            }
            ControlSignal::Paused => {
                *signal = ControlSignal::Running;
                true
            }
            ControlSignal::Stopped => false,
        });
        self.signal()
    }

    /// Request stop. Also releases a paused worker.
    pub fn stop(&self) {
        self.tx.send_replace(ControlSignal::Stopped);
    }

    /// Node boundary: wait while paused, then report whether to continue
    pub async fn checkpoint(&self) -> Flow {
        let mut rx = self.tx.subscribe();
        let mut announced = false;
        loop {
            match *rx.borrow_and_update() {
                ControlSignal::Running => {
                    if announced {
                        tracing::info!("validation resumed");
                    }
                    return Flow::Continue;
                }
                ControlSignal::Stopped => {
                    tracing::info!("stop requested, halting traversal");
                    return Flow::Stop;
                }
                ControlSignal::Paused => {
                    if !announced {
                        tracing::info!("validation paused at node boundary");
                        announced = true;
                    }
                }
            }
            if rx.changed().await.is_err() {
                return Flow::Stop;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_toggle_cycle() {
        let control = RunControl::new();
        assert_eq!(control.toggle(), ControlSignal::Paused);
        assert!(control.is_paused());
        assert_eq!(control.toggle(), ControlSignal::Running);
    }

    #[test]
    fn test_pause_resume_guards() {
        let control = RunControl::new();
        assert!(!control.resume());
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.resume());
    }

    #[test]
    fn test_stop_is_one_way() {
        let control = RunControl::new();
        control.stop();
        assert!(!control.pause());
        assert!(!control.resume());
        assert_eq!(control.toggle(), ControlSignal::Stopped);
        assert!(control.is_stopped());
    }

    #[tokio::test]
    async fn test_checkpoint_running() {
        assert_eq!(RunControl::new().checkpoint().await, Flow::Continue);
    }

    #[tokio::test]
    async fn test_checkpoint_waits_for_resume() {
        let control = RunControl::new();
        control.pause();
        let worker = {
            let control = control.clone();
            tokio::spawn(async move { control.checkpoint().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!worker.is_finished());
        control.resume();
        assert_eq!(worker.await.unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn test_stop_releases_paused_worker() {
        let control = RunControl::new();
        control.pause();
        let worker = {
            let control = control.clone();
            tokio::spawn(async move { control.checkpoint().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.stop();
        let flow = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(flow, Flow::Stop);
    }
}
