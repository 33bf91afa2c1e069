//! Cooperative cancellation shared between the caller and channel passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{ChannelId, ContractError};

/// Cloneable cancellation flag, polled once per processed raw event
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the flag has been raised
    #[inline]
    pub fn check(&self, channel: ChannelId) -> Result<(), ContractError> {
        if self.is_cancelled() {
            Err(ContractError::Cancelled { channel })
        } else {
            Ok(())
        }
    }
}
