use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// Creates a linked trigger/signal pair. Every clone of the signal observes
/// the trigger firing.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = crossbeam_channel::bounded::<()>(1);
    (ShutdownTrigger { tx: Some(tx) }, ShutdownSignal { rx })
}

/// Owner side of a shutdown signal. Firing drops the only sender, which
/// disconnects every receiver at once.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: Option<Sender<()>>,
}

impl ShutdownTrigger {
    pub fn trigger(&mut self) {
        self.tx.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.is_none()
    }
}

/// Observer side handed to every blocking loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Receiver that becomes ready once shutdown fires, for use in `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_shutdown_reaches_every_clone() {
        let (mut trigger, signal) = shutdown_channel();
        let other = signal.clone();
        assert!(!signal.is_shutdown());
        assert!(!trigger.is_triggered());

        let waiter = thread::spawn(move || other.receiver().recv_timeout(Duration::from_secs(5)));

        trigger.trigger();
        assert!(trigger.is_triggered());
        assert!(signal.is_shutdown());

        let res = waiter.join().map_err(|_| "waiter panicked");
        assert!(matches!(
            res,
            Ok(Err(crossbeam_channel::RecvTimeoutError::Disconnected))
        ));
    }

    #[test]
    fn test_dropping_trigger_fires() {
        let (trigger, signal) = shutdown_channel();
        drop(trigger);
        assert!(signal.is_shutdown());
    }
}
