//! Resource Pool
//!
//! The coordinator owns the declared streams and hands exactly one to each
//! worker for that worker's whole lifetime. Streams are never returned.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ResourceId, WorkerId};

use crate::error::{HarnessError, HarnessResult};

/// Which end of the declared list the next assignment comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOrder {
    /// First declared stream goes to the first worker
    #[default]
    Declared,
    /// Pop from the tail: first worker gets the last declared stream
    Tail,
}

/// One worker's exclusive stream, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerAssignment {
    worker: WorkerId,
    resource: ResourceId,
    assigned_at: DateTime<Utc>,
}

impl WorkerAssignment {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }
}

#[derive(Debug)]
pub struct ResourcePool {
    available: Mutex<VecDeque<ResourceId>>,
    capacity: usize,
    order: AssignmentOrder,
}

impl ResourcePool {
    /// Called once by the coordinator before any worker starts
    pub fn initialize(resources: Vec<ResourceId>, order: AssignmentOrder) -> HarnessResult<Self> {
        if resources.is_empty() {
            return Err(HarnessError::configuration("resource pool is empty"));
        }

        let mut seen = HashSet::with_capacity(resources.len());
        if let Some(dup) = resources.iter().find(|id| !seen.insert(*id)) {
            return Err(HarnessError::configuration(format!(
                "stream '{dup}' is declared more than once"
            )));
        }

        tracing::info!("📦 Resource pool initialized with {} streams ({:?} order)", resources.len(), order);

        Ok(Self {
            capacity: resources.len(),
            available: Mutex::new(resources.into()),
            order,
        })
    }

    /// Atomically remove one stream and bind it to `worker`
    pub fn assign(&self, worker: WorkerId) -> HarnessResult<WorkerAssignment> {
        let mut available = self.available.lock().unwrap_or_else(PoisonError::into_inner);

        let next = match self.order {
            AssignmentOrder::Declared => available.pop_front(),
            AssignmentOrder::Tail => available.pop_back(),
        };
        let remaining = available.len();
        drop(available);

        let resource = next.ok_or(HarnessError::ResourceExhausted {
            worker,
            capacity: self.capacity,
        })?;

        tracing::info!("🔗 Worker {} bound to stream {} ({} left)", worker, resource, remaining);

        Ok(WorkerAssignment {
            worker,
            resource,
            assigned_at: Utc::now(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.available.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn order(&self) -> AssignmentOrder {
        self.order
    }
}
