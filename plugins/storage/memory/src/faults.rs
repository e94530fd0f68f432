use std::sync::Mutex;

use queue_api::StoreError;

/// Store operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Put,
    Update,
    Delete,
    Scan,
    Increment,
    BlobPut,
    BlobGet,
    BlobDelete,
}

struct Fault {
    op: StoreOp,
    key_prefix: String,
    error: StoreError,
}

/// One-shot failures for exercising partial-failure paths in tests.
///
/// Each injected fault fires once, on the first matching operation.
#[derive(Default)]
pub struct FaultPlan {
    faults: Mutex<Vec<Fault>>,
}

impl FaultPlan {
    pub fn inject(&self, op: StoreOp, key_prefix: impl Into<String>, error: StoreError) {
        let mut guard = match self.faults.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(Fault { op, key_prefix: key_prefix.into(), error });
    }

    /// Consume the first fault matching `op` and `key`.
    pub(crate) fn take(&self, op: StoreOp, key: &str) -> Result<(), StoreError> {
        let mut guard = match self.faults.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.iter().position(|f| f.op == op && key.starts_with(&f.key_prefix)) {
            Some(i) => Err(guard.remove(i).error),
            None => Ok(()),
        }
    }
}
