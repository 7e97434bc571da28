//! Table of in-flight requests awaiting a response, keyed by request id.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    serde_json::Value,
    tokio::sync::{Mutex, oneshot},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    types::JsonRpcResponse,
};

type Settlement = Result<Value>;

struct PendingEntry {
    method: String,
    tx: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<u64, PendingEntry>,
    /// Set once the peer is gone; carries the exit code when known.
    closed: Option<Option<i32>>,
}

/// Shared between the sending side and the reader task. Every mutation goes
/// through the mutex.
#[derive(Clone, Default)]
pub(crate) struct PendingRequests {
    table: Arc<Mutex<Table>>,
}

impl PendingRequests {
    /// Register `id` and return the receiver its settlement will arrive on.
    pub async fn register(&self, id: u64, method: &str) -> Result<oneshot::Receiver<Settlement>> {
        let mut table = self.table.lock().await;
        if let Some(code) = table.closed {
            return Err(Error::ProcessClosed { code });
        }
        if table.entries.contains_key(&id) {
            return Err(Error::message(format!(
                "request id {id} is already pending ('{method}')"
            )));
        }
        let (tx, rx) = oneshot::channel();
        table.entries.insert(id, PendingEntry {
            method: method.into(),
            tx,
        });
        Ok(rx)
    }

    /// Settle the entry matching `response`. Returns `false` if no request
    /// with that id is outstanding.
    pub async fn settle(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.numeric_id() else {
            return false;
        };
        let entry = self.table.lock().await.entries.remove(&id);
        let Some(entry) = entry else {
            return false;
        };
        let outcome = response.into_result(&entry.method);
        // The caller may already have given up (timeout); nothing to do then.
        let _ = entry.tx.send(outcome);
        true
    }

    pub async fn forget(&self, id: u64) {
        self.table.lock().await.entries.remove(&id);
    }

    /// Reject every outstanding entry with `ProcessClosed` and refuse new
    /// registrations. Returns how many entries were rejected.
    pub async fn close_all(&self, code: Option<i32>) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut table = self.table.lock().await;
            if table.closed.is_none() {
                table.closed = Some(code);
            }
            table.entries.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            debug!(method = %entry.method, ?code, "rejecting pending MCP request");
            let _ = entry.tx.send(Err(Error::ProcessClosed { code }));
        }
        count
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.table.lock().await.entries.len()
    }
}

/// Wait for a registered request to settle, removing it on timeout.
pub(crate) async fn await_settlement(
    pending: &PendingRequests,
    id: u64,
    method: &str,
    rx: oneshot::Receiver<Settlement>,
    timeout: Duration,
) -> Result<Value> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(settlement)) => settlement,
        // Sender dropped without settling: the table was torn down.
        Ok(Err(_)) => Err(Error::ProcessClosed { code: None }),
        Err(_) => {
            pending.forget(id).await;
            Err(Error::RequestTimeout {
                method: method.into(),
                timeout,
            })
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, tokio::time::Instant};

    fn response(id: u64, result: Value) -> JsonRpcResponse {
        serde_json::from_value(json!({"jsonrpc": "2.0", "id": id, "result": result})).unwrap()
    }

    #[tokio::test]
    async fn settles_by_id_regardless_of_order() {
        let pending = PendingRequests::default();
        let rx1 = pending.register(1, "a").await.unwrap();
        let rx2 = pending.register(2, "b").await.unwrap();

        assert!(pending.settle(response(2, json!("two"))).await);
        assert!(pending.settle(response(1, json!("one"))).await);

        assert_eq!(rx1.await.unwrap().unwrap(), json!("one"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("two"));
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_settled() {
        let pending = PendingRequests::default();
        let _rx = pending.register(1, "a").await.unwrap();
        assert!(!pending.settle(response(5, json!(null))).await);
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let pending = PendingRequests::default();
        let _rx = pending.register(1, "a").await.unwrap();
        assert!(pending.register(1, "b").await.is_err());
    }

    #[tokio::test]
    async fn error_member_settles_as_rpc_error() {
        let pending = PendingRequests::default();
        let rx = pending.register(1, "resources/list").await.unwrap();
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();
        pending.settle(resp).await;
        assert!(rx.await.unwrap().unwrap_err().is_method_not_found());
    }

    #[tokio::test]
    async fn close_all_rejects_everything_and_blocks_new_entries() {
        let pending = PendingRequests::default();
        let receivers = vec![
            pending.register(1, "a").await.unwrap(),
            pending.register(2, "b").await.unwrap(),
            pending.register(3, "c").await.unwrap(),
        ];

        assert_eq!(pending.close_all(Some(1)).await, 3);
        for rx in receivers {
            assert!(matches!(
                rx.await.unwrap(),
                Err(Error::ProcessClosed { code: Some(1) })
            ));
        }
        assert!(matches!(
            pending.register(4, "d").await,
            Err(Error::ProcessClosed { code: Some(1) })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_after_exactly_the_configured_duration() {
        let pending = PendingRequests::default();
        let rx = pending.register(1, "tools/call").await.unwrap();
        let start = Instant::now();

        let err = await_settlement(&pending, 1, "tools/call", rx, Duration::from_secs(30))
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert!(err.is_timeout());
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settlement_before_deadline_wins() {
        let pending = PendingRequests::default();
        let rx = pending.register(1, "ping").await.unwrap();

        let settler = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(29)).await;
            settler.settle(response(1, json!({"ok": true}))).await;
        });

        let value = await_settlement(&pending, 1, "ping", rx, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }
}
