//! Indexed collection mapping correlation id -> Operation and client handle
//! -> set of Operations. Pure data structure; the manager is the sole
//! mutator.
//!
//! Invariants (held after every public mutation):
//! - `id` is unique across the table.
//! - every Operation's `client` appears in the client index iff the
//!   Operation is in the table.
//! - the primary index and the client multimap agree.

use std::collections::{HashMap, HashSet};

use crate::client::ClientHandle;
use crate::correlation::CorrelationId;
use crate::operation::Operation;

#[derive(Default)]
pub struct OperationTable {
    by_id: HashMap<CorrelationId, Box<dyn Operation>>,
    by_client: HashMap<ClientHandle, HashSet<CorrelationId>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: CorrelationId) -> Option<&dyn Operation> {
        self.by_id.get(&id).map(|op| op.as_ref())
    }

    /// Insert or replace the operation at its own correlation id, updating
    /// both indices atomically.
    pub fn insert(&mut self, op: Box<dyn Operation>) {
        let id = op.id();
        let client = op.client();
        if let Some(previous) = self.by_id.insert(id, op) {
            let previous_client = previous.client();
            if previous_client != client {
                Self::unindex_client(&mut self.by_client, previous_client, id);
            }
        }
        self.by_client.entry(client).or_default().insert(id);
    }

    /// Remove the operation at `id`, if any, updating both indices.
    pub fn remove(&mut self, id: CorrelationId) -> Option<Box<dyn Operation>> {
        let op = self.by_id.remove(&id)?;
        Self::unindex_client(&mut self.by_client, op.client(), id);
        Some(op)
    }

    /// Replace the entry at `id` according to the result of a state
    /// transition: `Some(op)` re-inserts (possibly under a new id if the
    /// operation changed it), `None` removes.
    pub fn apply(&mut self, id: CorrelationId, next: Option<Box<dyn Operation>>) {
        match next {
            Some(op) => {
                if op.id() != id {
                    self.remove(id);
                }
                self.insert(op);
            }
            None => {
                self.remove(id);
            }
        }
    }

    /// Every correlation id currently in the table, in no particular order.
    pub fn ids(&self) -> Vec<CorrelationId> {
        self.by_id.keys().copied().collect()
    }

    /// All correlation ids owned by `client`, in no particular order.
    pub fn ids_for_client(&self, client: ClientHandle) -> Vec<CorrelationId> {
        self.by_client
            .get(&client)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove and return every operation owned by `client`.
    pub fn remove_all_for_client(&mut self, client: ClientHandle) -> Vec<Box<dyn Operation>> {
        let ids = self.ids_for_client(client);
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Drain the whole table, e.g. to fail every remaining operation on
    /// terminal reconnect failure.
    pub fn drain(&mut self) -> Vec<Box<dyn Operation>> {
        self.by_client.clear();
        self.by_id.drain().map(|(_, op)| op).collect()
    }

    fn unindex_client(by_client: &mut HashMap<ClientHandle, HashSet<CorrelationId>>, client: ClientHandle, id: CorrelationId) {
        if let Some(ids) = by_client.get_mut(&client) {
            ids.remove(&id);
            if ids.is_empty() {
                by_client.remove(&client);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn client_index_len(&self, client: ClientHandle) -> usize {
        self.by_client.get(&client).map(HashSet::len).unwrap_or(0)
    }
}
