//! In-memory collaborators for tests and dry runs.
//!
//! - [`MemoryReconciler`]: level-triggered object store that converges
//! - [`ScriptedReconciler`]: answers from a fixed script, records calls
//! - [`StaticReplicaCount`] / [`FailingReplicaCount`]: replica providers

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    CollaboratorError, DesiredState, FleetLoggingContext, ManagedResourceDescriptor,
    RequeueHint, ResourceKind,
};
use crate::reconcile::{ReplicaCountProvider, ResourceReconciler};

/// Stores objects keyed by kind and `namespace/name`.
///
/// Any write reports an immediate requeue, so a fleet converges after one
/// pass per submitted object plus a final quiet pass.
#[derive(Debug, Default)]
pub struct MemoryReconciler {
    objects: Mutex<BTreeMap<(ResourceKind, String), Value>>,
}

impl MemoryReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind, identity: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind, identity.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored object, ordered by kind then identity.
    pub fn objects(&self) -> Vec<(ResourceKind, String, Value)> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|((kind, id), object)| (*kind, id.clone(), object.clone()))
            .collect()
    }
}

#[async_trait]
impl ResourceReconciler for MemoryReconciler {
    async fn reconcile_resource(
        &self,
        descriptor: &ManagedResourceDescriptor,
    ) -> Result<Option<RequeueHint>, CollaboratorError> {
        let key = (descriptor.kind, descriptor.identity());
        let mut objects = self.objects.lock().unwrap();
        match descriptor.state {
            DesiredState::Present => {
                if objects.get(&key) == Some(&descriptor.object) {
                    return Ok(None);
                }
                objects.insert(key, descriptor.object.clone());
                Ok(Some(RequeueHint::immediate()))
            }
            DesiredState::Absent => match objects.remove(&key) {
                Some(_) => Ok(Some(RequeueHint::immediate())),
                None => Ok(None),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Pending(RequeueHint),
    Fail(CollaboratorError),
}

/// Answers "no change" except on one scripted call (1-based).
#[derive(Debug, Default)]
pub struct ScriptedReconciler {
    script: Option<(usize, Scripted)>,
    calls: Mutex<Vec<ManagedResourceDescriptor>>,
}

impl ScriptedReconciler {
    pub fn converged() -> Self {
        Self::default()
    }

    pub fn pending_at(call: usize, hint: RequeueHint) -> Self {
        Self {
            script: Some((call, Scripted::Pending(hint))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(call: usize, error: CollaboratorError) -> Self {
        Self {
            script: Some((call, Scripted::Fail(error))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ManagedResourceDescriptor> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceReconciler for ScriptedReconciler {
    async fn reconcile_resource(
        &self,
        descriptor: &ManagedResourceDescriptor,
    ) -> Result<Option<RequeueHint>, CollaboratorError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(descriptor.clone());
            calls.len()
        };
        match &self.script {
            Some((at, Scripted::Pending(hint))) if *at == call => Ok(Some(*hint)),
            Some((at, Scripted::Fail(error))) if *at == call => Err(error.clone()),
            _ => Ok(None),
        }
    }
}

/// Always reports the same replica count.
#[derive(Debug, Clone, Copy)]
pub struct StaticReplicaCount(Option<i32>);

impl StaticReplicaCount {
    pub fn new(count: Option<i32>) -> Self {
        Self(count)
    }
}

#[async_trait]
impl ReplicaCountProvider for StaticReplicaCount {
    async fn replica_count(
        &self,
        _fleet: &FleetLoggingContext,
    ) -> Result<Option<i32>, CollaboratorError> {
        Ok(self.0)
    }
}

/// Always fails with [`CollaboratorError::Unavailable`].
#[derive(Debug, Clone, Copy)]
pub struct FailingReplicaCount;

#[async_trait]
impl ReplicaCountProvider for FailingReplicaCount {
    async fn replica_count(
        &self,
        fleet: &FleetLoggingContext,
    ) -> Result<Option<i32>, CollaboratorError> {
        Err(CollaboratorError::Unavailable(format!(
            "aggregator for fleet `{}` not found",
            fleet.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret(data: &str) -> ManagedResourceDescriptor {
        ManagedResourceDescriptor::present(
            ResourceKind::Secret,
            json!({"metadata": {"name": "s", "namespace": "ns"}, "stringData": {"k": data}}),
        )
    }

    #[tokio::test]
    async fn test_memory_reconciler_is_level_triggered() {
        let store = MemoryReconciler::new();
        assert!(store.reconcile_resource(&secret("a")).await.unwrap().is_some());
        assert!(store.reconcile_resource(&secret("a")).await.unwrap().is_none());
        assert!(store.reconcile_resource(&secret("b")).await.unwrap().is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(ResourceKind::Secret, "ns/s").unwrap()["stringData"]["k"],
            "b"
        );
    }

    #[tokio::test]
    async fn test_memory_reconciler_deletes_absent() {
        let store = MemoryReconciler::new();
        store.reconcile_resource(&secret("a")).await.unwrap();
        let gone = ManagedResourceDescriptor::absent(
            ResourceKind::Secret,
            json!({"metadata": {"name": "s", "namespace": "ns"}}),
        );
        assert!(store.reconcile_resource(&gone).await.unwrap().is_some());
        assert!(store.reconcile_resource(&gone).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_reconciler_fires_once() {
        let fake = ScriptedReconciler::pending_at(2, RequeueHint::immediate());
        assert_eq!(fake.reconcile_resource(&secret("a")).await, Ok(None));
        assert_eq!(
            fake.reconcile_resource(&secret("a")).await,
            Ok(Some(RequeueHint::immediate()))
        );
        assert_eq!(fake.reconcile_resource(&secret("a")).await, Ok(None));
        assert_eq!(fake.call_count(), 3);
    }
}
