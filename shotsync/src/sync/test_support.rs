use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::remote::{RemoteObjectRecord, RemoteStore, StoreError};

/// In-memory store that records every call. Successful creates make the name
/// visible to later listings and existence queries.
#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    listing: Vec<RemoteObjectRecord>,
    names: HashSet<String>,
    list_error: Option<StoreError>,
    create_failures: VecDeque<StoreError>,
    create_always_fails: Option<StoreError>,
    list_calls: usize,
    exists_calls: usize,
    create_calls: usize,
    created: Vec<(String, String, Vec<u8>)>,
}

impl FakeStore {
    pub(crate) fn with_existing(self, name: &str) -> Self {
        {
            let mut state = self.inner.lock().unwrap();
            let id = format!("existing-{}", state.listing.len());
            state.listing.push(RemoteObjectRecord {
                name: name.to_string(),
                id,
                created_time: None,
                size: Some(1),
            });
            state.names.insert(name.to_string());
        }
        self
    }

    pub(crate) fn with_list_error(self, err: StoreError) -> Self {
        self.inner.lock().unwrap().list_error = Some(err);
        self
    }

    /// The next `errors.len()` creates fail in order, later ones succeed.
    pub(crate) fn failing_creates(self, errors: impl IntoIterator<Item = StoreError>) -> Self {
        self.inner.lock().unwrap().create_failures.extend(errors);
        self
    }

    pub(crate) fn always_failing_creates(self, err: StoreError) -> Self {
        self.inner.lock().unwrap().create_always_fails = Some(err);
        self
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }

    pub(crate) fn exists_calls(&self) -> usize {
        self.inner.lock().unwrap().exists_calls
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }

    pub(crate) fn created(&self) -> Vec<(String, String, Vec<u8>)> {
        self.inner.lock().unwrap().created.clone()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_objects(&self, _parent_id: &str) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        let mut state = self.inner.lock().unwrap();
        state.list_calls += 1;
        match &state.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.listing.clone()),
        }
    }

    async fn create_object(
        &self,
        name: &str,
        _parent_id: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.inner.lock().unwrap();
        state.create_calls += 1;
        if let Some(err) = &state.create_always_fails {
            return Err(err.clone());
        }
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }
        let id = format!("created-{}", state.created.len());
        state
            .created
            .push((name.to_string(), mime_type.to_string(), content));
        state.listing.push(RemoteObjectRecord {
            name: name.to_string(),
            id: id.clone(),
            created_time: None,
            size: None,
        });
        state.names.insert(name.to_string());
        Ok(id)
    }

    async fn query_exists(&self, _parent_id: &str, name: &str) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().unwrap();
        state.exists_calls += 1;
        Ok(state.names.contains(name))
    }
}
