use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Qué temporizador de la sesión disparó
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogKind {
    /// Sin eventos de reproducción del nodo
    Inactivity,
    /// Canal de voz sin oyentes
    EmptyChannel,
}

struct Armed {
    epoch: u64,
    cancel: CancellationToken,
}

/// Temporizador de un solo disparo, reiniciable.
///
/// Reiniciar cancela el temporizador anterior y crea uno nuevo con su propio
/// token. El callback recibe el `epoch` con el que fue armado; quien lo
/// ejecute debe llamar a [`Watchdog::claim`] bajo el mismo lock que protege
/// `cancel`, así una cancelación ya aplicada siempre gana.
pub struct Watchdog {
    kind: WatchdogKind,
    timeout: Duration,
    epoch: u64,
    armed: Option<Armed>,
}

impl Watchdog {
    pub fn new(kind: WatchdogKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            epoch: 0,
            armed: None,
        }
    }

    pub fn kind(&self) -> WatchdogKind {
        self.kind
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Cancela el temporizador vigente (si hay) y arma uno nuevo
    pub fn restart<F, Fut>(&mut self, on_expire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.epoch += 1;

        let epoch = self.epoch;
        let timeout = self.timeout;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let kind = self.kind;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    trace!("⏹️ Watchdog {:?}#{} cancelado", kind, epoch);
                }
                _ = tokio::time::sleep(timeout) => {
                    on_expire(epoch).await;
                }
            }
        });

        self.armed = Some(Armed {
            epoch,
            cancel: token,
        });
        epoch
    }

    /// Cancela el temporizador vigente; devuelve si había uno armado
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Consume el disparo si `epoch` sigue siendo el temporizador vigente.
    /// Falso si fue cancelado o reemplazado después de armarse.
    pub fn claim(&mut self, epoch: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.epoch == epoch && !armed.cancel.is_cancelled() => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn counting(
        watchdog: &Arc<Mutex<Watchdog>>,
        fired: &Arc<AtomicUsize>,
    ) -> u64 {
        let shared = watchdog.clone();
        let fired = fired.clone();
        watchdog.lock().restart(move |epoch| async move {
            if shared.lock().claim(epoch) {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_timeout() {
        let watchdog = Arc::new(Mutex::new(Watchdog::new(
            WatchdogKind::EmptyChannel,
            Duration::from_secs(60),
        )));
        let fired = Arc::new(AtomicUsize::new(0));
        counting(&watchdog, &fired);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watchdog.lock().is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let watchdog = Arc::new(Mutex::new(Watchdog::new(
            WatchdogKind::EmptyChannel,
            Duration::from_secs(60),
        )));
        let fired = Arc::new(AtomicUsize::new(0));
        counting(&watchdog, &fired);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(watchdog.lock().cancel());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_timer() {
        let watchdog = Arc::new(Mutex::new(Watchdog::new(
            WatchdogKind::Inactivity,
            Duration::from_secs(180),
        )));
        let fired = Arc::new(AtomicUsize::new(0));

        let first = counting(&watchdog, &fired);
        tokio::time::sleep(Duration::from_secs(120)).await;
        let second = counting(&watchdog, &fired);
        assert_ne!(first, second);

        // El primero habría vencido aquí
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_claim_rejects_stale_epoch() {
        let mut watchdog = Watchdog::new(WatchdogKind::Inactivity, Duration::from_secs(1));
        assert!(!watchdog.claim(1));
        assert!(!watchdog.cancel());
    }
}
