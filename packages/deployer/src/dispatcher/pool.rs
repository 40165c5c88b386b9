use std::collections::BTreeMap;

use deployer_types::{JobId, WorkerId, WorkerRequest, WorkerState, WorkerStatus};
use tokio::task::AbortHandle;

use super::launcher::WorkerHandle;

pub struct WorkerSlot {
    pub id: WorkerId,
    pub state: WorkerState,
    pub job: Option<JobId>,
    handle: WorkerHandle,
    deadline: Option<AbortHandle>,
}

impl WorkerSlot {
    pub fn new(id: WorkerId, handle: WorkerHandle) -> Self {
        Self {
            id,
            state: WorkerState::Starting,
            job: None,
            handle,
            deadline: None,
        }
    }

    pub fn send(&self, request: WorkerRequest) -> bool {
        self.handle.send(request)
    }

    /// Marks the worker as going away and kills it.
    /// The slot stays in the pool until its exit is observed.
    pub fn kill(&mut self) {
        self.state = WorkerState::Stopping;
        self.clear_deadline();
        self.handle.kill();
    }

    pub fn set_deadline(&mut self, deadline: AbortHandle) {
        self.clear_deadline();
        self.deadline = Some(deadline);
    }

    pub fn clear_deadline(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            state: self.state,
            job_id: self.job,
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.clear_deadline();
    }
}

/// Workers by id. Iteration order is id order, so the first idle worker is the lowest id.
#[derive(Default)]
pub struct WorkerPool {
    slots: BTreeMap<WorkerId, WorkerSlot>,
}

impl WorkerPool {
    pub fn insert(&mut self, slot: WorkerSlot) {
        self.slots.insert(slot.id, slot);
    }

    pub fn remove(&mut self, id: WorkerId) -> Option<WorkerSlot> {
        self.slots.remove(&id)
    }

    pub fn get_mut(&mut self, id: WorkerId) -> Option<&mut WorkerSlot> {
        self.slots.get_mut(&id)
    }

    pub fn first_idle(&self) -> Option<WorkerId> {
        self.slots
            .values()
            .find(|slot| slot.state == WorkerState::Idle)
            .map(|slot| slot.id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorkerSlot> {
        self.slots.values_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.slots.values().map(WorkerSlot::status).collect()
    }
}
