//! Recording in-memory responder for tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::avahi::publisher::{AliasRecord, Responder};
use crate::error::{PublishStep, ResponderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    New(u32),
    AddRecord(u32, AliasRecord),
    Commit(u32),
    Reset(u32),
    Free(u32),
}

#[derive(Default)]
struct FakeInner {
    next_group: u32,
    calls: Vec<Call>,
    /// group -> owner hostname, set by AddRecord
    owners: HashMap<u32, String>,
    live: HashSet<u32>,
    published: HashSet<u32>,
    failures: Vec<(PublishStep, String)>,
    fail_allocate: bool,
}

#[derive(Clone, Default)]
pub struct FakeResponder {
    inner: Arc<Mutex<FakeInner>>,
}

impl FakeResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `step` on groups owned by `hostname` until cleared.
    pub fn fail(&self, step: PublishStep, hostname: &str) {
        self.inner.lock().unwrap().failures.push((step, hostname.to_string()));
    }

    pub fn fail_next_allocate(&self) {
        self.inner.lock().unwrap().fail_allocate = true;
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.clear();
        inner.fail_allocate = false;
    }

    /// Successful calls, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Successful calls on groups owned by `hostname`.
    pub fn calls_for(&self, hostname: &str) -> Vec<Call> {
        let inner = self.inner.lock().unwrap();
        let owned = |group: &u32| inner.owners.get(group).map(String::as_str) == Some(hostname);
        inner
            .calls
            .iter()
            .filter(|call| match call {
                Call::New(g) | Call::Commit(g) | Call::Reset(g) | Call::Free(g) => owned(g),
                Call::AddRecord(g, _) => owned(g),
            })
            .cloned()
            .collect()
    }

    /// Groups allocated and not yet freed.
    pub fn live_groups(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    /// Hostnames whose records are currently committed.
    pub fn published(&self) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .published
            .iter()
            .filter_map(|group| inner.owners.get(group).cloned())
            .collect()
    }

    fn check(inner: &FakeInner, step: PublishStep, hostname: Option<&str>) -> Result<(), ResponderError> {
        let failing = inner
            .failures
            .iter()
            .any(|(s, h)| *s == step && Some(h.as_str()) == hostname);
        if failing {
            return Err(format!("injected {} failure", step).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Responder for FakeResponder {
    type Group = u32;

    async fn entry_group_new(&self) -> Result<u32, ResponderError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_allocate {
            inner.fail_allocate = false;
            return Err("injected allocate failure".into());
        }
        inner.next_group += 1;
        let group = inner.next_group;
        inner.live.insert(group);
        inner.calls.push(Call::New(group));
        Ok(group)
    }

    async fn add_record(&self, group: &u32, record: &AliasRecord) -> Result<(), ResponderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.owners.insert(*group, record.name.clone());
        Self::check(&inner, PublishStep::Populate, Some(&record.name))?;
        inner.calls.push(Call::AddRecord(*group, record.clone()));
        Ok(())
    }

    async fn commit(&self, group: &u32) -> Result<(), ResponderError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check(&inner, PublishStep::Commit, inner.owners.get(group).map(String::as_str))?;
        inner.published.insert(*group);
        inner.calls.push(Call::Commit(*group));
        Ok(())
    }

    async fn reset(&self, group: &u32) -> Result<(), ResponderError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check(&inner, PublishStep::Reset, inner.owners.get(group).map(String::as_str))?;
        inner.published.remove(group);
        inner.calls.push(Call::Reset(*group));
        Ok(())
    }

    async fn free(&self, group: &u32) -> Result<(), ResponderError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check(&inner, PublishStep::Release, inner.owners.get(group).map(String::as_str))?;
        inner.live.remove(group);
        inner.published.remove(group);
        inner.calls.push(Call::Free(*group));
        Ok(())
    }
}
