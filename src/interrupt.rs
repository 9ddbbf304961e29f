//! User interrupt delivery.
//!
//! An [`Interrupt`] resolves once the user asks the run to stop. A second
//! request forces the run to give up on cleanup as well. Production code wires
//! it to Ctrl-C; tests trigger it by hand through [`InterruptTrigger`].

use tokio::sync::watch;
use tracing::{info, warn};

/// Receiving side of an interrupt signal.
#[derive(Clone, Debug)]
pub struct Interrupt {
    receiver: Option<watch::Receiver<u8>>,
}

/// Sending side used to fire an [`Interrupt`].
#[derive(Debug)]
pub struct InterruptTrigger {
    sender: watch::Sender<u8>,
}

impl InterruptTrigger {
    /// Fires the paired interrupt. The second firing also forces it.
    pub fn fire(&self) {
        self.sender.send_modify(|count| *count = count.saturating_add(1));
    }
}

impl Interrupt {
    /// Interrupt that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self { receiver: None }
    }

    /// Creates an interrupt together with the trigger that fires it.
    #[must_use]
    pub fn pair() -> (InterruptTrigger, Self) {
        let (sender, receiver) = watch::channel(0);
        (
            InterruptTrigger { sender },
            Self {
                receiver: Some(receiver),
            },
        )
    }

    /// Fires on the first Ctrl-C delivered to the process and forces on the
    /// second.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn from_ctrl_c() -> Self {
        let (trigger, interrupt) = Self::pair();
        tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "failed to listen for Ctrl-C");
                    return;
                }
                trigger.fire();
                if *trigger.sender.borrow() == 1 {
                    info!("interrupted; cleaning up, press Ctrl-C again to abandon cleanup");
                } else {
                    warn!("interrupted again; abandoning cleanup");
                }
            }
        });
        interrupt
    }

    /// Returns `true` when the interrupt has already fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.count() >= 1
    }

    /// Returns `true` when the interrupt has fired at least twice.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.count() >= 2
    }

    fn count(&self) -> u8 {
        self.receiver
            .as_ref()
            .map_or(0, |receiver| *receiver.borrow())
    }

    /// Resolves once the interrupt fires; pends forever otherwise.
    pub async fn fired(&mut self) {
        self.reaches(1).await;
    }

    /// Resolves once the interrupt fires a second time; pends forever
    /// otherwise.
    pub async fn forced(&mut self) {
        self.reaches(2).await;
    }

    async fn reaches(&mut self, times: u8) {
        let Some(receiver) = self.receiver.as_mut() else {
            return std::future::pending().await;
        };
        if receiver.wait_for(|count| *count >= times).await.is_err() {
            // Trigger dropped before reaching `times`.
            std::future::pending::<()>().await;
        }
    }
}
