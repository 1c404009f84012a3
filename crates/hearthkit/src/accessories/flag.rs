use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Marks that a client write is in flight for one characteristic.
///
/// Raised by the setter before the hub call is made, consulted during the
/// next reconciliation pass, and cleared at the end of it. If the hub never
/// reports back, the flag stays raised until the next update clears it, so
/// at most one hub update is ever suppressed.
#[derive(Debug, Default)]
pub struct EchoFlag(AtomicBool);

impl EchoFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}
