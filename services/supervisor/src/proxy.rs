//! Broadcast method proxies.
//!
//! Every declared operation of a clustered node gets a [`MethodProxy`].
//! Calling it serializes the argument list once and enqueues a `call`
//! message on every worker of the node. There is no reply.

use blitz_codec::{Array, Callback, Value};
use tracing::{debug, warn};

use crate::error::{Result, SupervisorError};
use crate::node::Node;
use crate::pool::{WorkerId, WorkerList};
use crate::protocol::WorkerMessage;
use crate::state::Context;

/// Operation names that are never proxied.
const RESERVED: &[&str] = &["constructor", "new"];

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Workers the call was enqueued for.
    pub delivered: Vec<WorkerId>,
    /// Dead workers left out.
    pub skipped: Vec<WorkerId>,
    /// Live workers whose channel was already closed.
    pub failed: Vec<SupervisorError>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// A callable standing in for one operation of a node.
#[derive(Debug, Clone)]
pub struct MethodProxy {
    node_id: String,
    method: String,
    arity: Option<usize>,
    workers: WorkerList,
}

impl MethodProxy {
    pub fn new(
        node_id: impl Into<String>,
        method: impl Into<String>,
        arity: Option<usize>,
        workers: WorkerList,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            method: method.into(),
            arity,
            workers,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Broadcast a call to every live worker currently in the list.
    ///
    /// Fails before sending anything on an arity mismatch or when the
    /// arguments cannot be serialized. A closed channel is recorded in the
    /// report and the broadcast goes on.
    pub fn call(&self, args: Vec<Value>) -> Result<BroadcastReport> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(SupervisorError::Arity {
                    node_id: self.node_id.clone(),
                    method: self.method.clone(),
                    expected,
                    actual: args.len(),
                });
            }
        }

        let payload = blitz_codec::serialize(&Value::Array(Array::from_vec(args)))?;
        let mut report = BroadcastReport::default();

        for handle in self.workers.handles() {
            if !handle.is_alive() {
                report.skipped.push(handle.id());
                continue;
            }
            match handle.send(WorkerMessage::call(self.method.clone(), payload.clone())) {
                Ok(()) => report.delivered.push(handle.id()),
                Err(e) => {
                    warn!(node_id = %self.node_id, method = %self.method, error = %e, "call not delivered");
                    report.failed.push(e);
                }
            }
        }

        debug!(
            node_id = %self.node_id,
            method = %self.method,
            delivered = report.delivered.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "call broadcast"
        );
        Ok(report)
    }

    /// The proxy as a codec callback.
    ///
    /// Invoking it broadcasts and returns the number of workers reached, or
    /// the error text.
    pub fn to_callback(&self) -> Callback {
        let proxy = self.clone();
        let source = format!("proxy {}.{}", self.node_id, self.method);
        Callback::new(source, move |args| match proxy.call(args.to_vec()) {
            Ok(report) => Value::Int(report.delivered.len() as i64),
            Err(e) => Value::String(e.to_string()),
        })
    }
}

/// Installs proxies for a node's declared operations.
pub struct MethodProxyBuilder;

impl MethodProxyBuilder {
    /// Install one proxy per declared operation of `node` under `id`, bound
    /// to `workers`. Existing proxies of the same name are replaced.
    ///
    /// Returns the installed names.
    pub fn expose_methods(
        ctx: &Context,
        node: &dyn Node,
        id: &str,
        workers: &WorkerList,
    ) -> Vec<String> {
        let mut installed = Vec::new();
        for op in node.capabilities().operations() {
            if RESERVED.contains(&op.name.as_str()) {
                continue;
            }
            ctx.install_method(id, MethodProxy::new(id, &op.name, op.arity, workers.clone()));
            installed.push(op.name.clone());
        }
        debug!(node_id = %id, methods = ?installed, "methods exposed");
        installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeSpec;
    use crate::pool::{WorkerHandle, WorkerState};
    use tokio::sync::mpsc;

    #[test]
    fn test_expose_skips_reserved_names() {
        let ctx = Context::new();
        let node = NodeSpec::new("Core", "core.js")
            .with_operation("constructor")
            .with_operation("foo")
            .with_operation("new")
            .with_operation("bar");

        let installed = MethodProxyBuilder::expose_methods(&ctx, &node, "core", &WorkerList::new());
        assert_eq!(installed, vec!["foo", "bar"]);
        assert_eq!(ctx.methods("core"), vec!["bar", "foo"]);
    }

    #[test]
    fn test_dead_and_closed_handles_are_reported() {
        let workers = WorkerList::new();

        let (tx, mut live_rx) = mpsc::unbounded_channel();
        let (live, _live_state) = WorkerHandle::new("core", None, tx, None);
        workers.push(live.clone());

        let (tx, _dead_rx) = mpsc::unbounded_channel();
        let (dead, dead_state) = WorkerHandle::new("core", None, tx, None);
        dead_state.send_replace(WorkerState::Replaced);
        workers.push(dead.clone());

        let (tx, closed_rx) = mpsc::unbounded_channel();
        let (closed, _closed_state) = WorkerHandle::new("core", None, tx, None);
        drop(closed_rx);
        workers.push(closed);

        let report = MethodProxy::new("core", "foo", None, workers)
            .call(vec![Value::Int(1)])
            .unwrap();

        assert_eq!(report.delivered, vec![live.id()]);
        assert_eq!(report.skipped, vec![dead.id()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason_code(), "channel_closed");
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_arity_checked_before_sending() {
        let workers = WorkerList::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _state) = WorkerHandle::new("core", None, tx, None);
        workers.push(handle);

        let err = MethodProxy::new("core", "foo", Some(2), workers)
            .call(vec![Value::Int(1)])
            .unwrap_err();

        assert_eq!(err.reason_code(), "arity_mismatch");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unserializable_args_send_nothing() {
        let workers = WorkerList::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _state) = WorkerHandle::new("core", None, tx, None);
        workers.push(handle);

        let err = MethodProxy::new("core", "foo", None, workers)
            .call(vec![Value::Float(f64::NAN)])
            .unwrap_err();

        assert_eq!(err.reason_code(), "serialization_failed");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_callback_broadcasts() {
        let workers = WorkerList::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _state) = WorkerHandle::new("core", None, tx, None);
        workers.push(handle);

        let callback = MethodProxy::new("core", "foo", None, workers).to_callback();
        assert_eq!(callback.source(), "proxy core.foo");
        assert!(matches!(callback.call(&[Value::Int(1)]), Value::Int(1)));
        assert!(rx.try_recv().is_ok());
    }
}
