//! Mock implementations for testing.

use crate::{Error, ObjectRef};
use commonware_cryptography::sha256::Digest;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct State {
    pieces: HashMap<ObjectRef, Vec<Digest>>,
    deleted: HashSet<ObjectRef>,
    failing: HashSet<ObjectRef>,
    loads: HashMap<ObjectRef, usize>,
    updates: HashMap<ObjectRef, usize>,
}

/// An in-memory [crate::Availability] service that records every call.
#[derive(Clone, Default)]
pub struct Availability {
    state: Arc<Mutex<State>>,
}

impl Availability {
    /// Register `object` with the given `pieces`.
    pub fn insert(&self, object: ObjectRef, pieces: Vec<Digest>) {
        let mut state = self.state.lock().unwrap();
        state.deleted.remove(&object);
        state.pieces.insert(object, pieces);
    }

    /// Report `object` as deleted from now on.
    pub fn delete(&self, object: ObjectRef) {
        let mut state = self.state.lock().unwrap();
        state.pieces.remove(&object);
        state.deleted.insert(object);
    }

    /// Fail every call for `object` while `failing` is set.
    pub fn fail(&self, object: ObjectRef, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing.insert(object);
        } else {
            state.failing.remove(&object);
        }
    }

    /// Number of times the pieces of `object` were enumerated.
    pub fn loads(&self, object: ObjectRef) -> usize {
        let state = self.state.lock().unwrap();
        state.loads.get(&object).copied().unwrap_or_default()
    }

    /// Number of times the availability of `object` was recomputed.
    pub fn updates(&self, object: ObjectRef) -> usize {
        let state = self.state.lock().unwrap();
        state.updates.get(&object).copied().unwrap_or_default()
    }
}

impl crate::Availability for Availability {
    async fn pieces(&self, object: ObjectRef) -> Result<Vec<Digest>, Error> {
        let mut state = self.state.lock().unwrap();
        *state.loads.entry(object).or_default() += 1;
        if state.failing.contains(&object) {
            return Err(Error::Availability(format!("pieces of {object} unavailable")));
        }
        Ok(state.pieces.get(&object).cloned().unwrap_or_default())
    }

    async fn update(&self, object: ObjectRef) -> Result<bool, Error> {
        let mut state = self.state.lock().unwrap();
        *state.updates.entry(object).or_default() += 1;
        if state.failing.contains(&object) {
            return Err(Error::Availability(format!("update of {object} failed")));
        }
        Ok(!state.deleted.contains(&object))
    }
}
