//! Named rendez-vous objects on which operations wait and others signal.
//!
//! The waiter/resource relationship is modelled as plain integer-id sets
//! owned by the scheduler, not as cross-owning references.

use std::collections::BTreeSet;

use crate::operation::OperationId;

pub type ResourceId = u64;

/// A named resource and the set of operations currently parked on it.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub waiters: BTreeSet<OperationId>,
}

impl Resource {
    pub fn new(id: ResourceId) -> Self {
        Resource {
            id,
            waiters: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_resource_has_no_waiters() {
        let resource = Resource::new(1);
        assert!(resource.waiters.is_empty());
    }
}
