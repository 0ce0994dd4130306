//! Disk list reconciliation
//!
//! A server's disks are identified only by their position. Going from a prior
//! list of sizes to a desired one is expressed as trailing additions or
//! trailing removals, plus in-place resizes of the shared positions.

use crate::command::CommandWaiter;
use crate::error::{KamateraError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Positional add/remove/resize plan between two disk lists
///
/// `add` and `remove` are never both non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskOperations {
    /// Sizes (GB) to append, in order
    pub add: Vec<f64>,

    /// Positions to delete, ascending
    pub remove: Vec<usize>,

    /// Position -> new size (GB)
    pub update: BTreeMap<usize, f64>,
}

impl DiskOperations {
    /// Plan for two already-parsed size lists
    pub fn between(prior: &[f64], desired: &[f64]) -> Self {
        let mut ops = DiskOperations::default();

        if prior.len() > desired.len() {
            ops.remove = (desired.len()..prior.len()).collect();
        } else if prior.len() < desired.len() {
            ops.add = desired[prior.len()..].to_vec();
        }

        for (position, (old, new)) in prior.iter().zip(desired).enumerate() {
            if old != new {
                ops.update.insert(position, *new);
            }
        }

        ops
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }

    /// Number of remote calls needed to apply the plan
    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len() + self.update.len()
    }
}

impl fmt::Display for DiskOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No disk changes");
        }

        let mut parts = Vec::new();
        if !self.add.is_empty() {
            parts.push(format!("{} to add", self.add.len()));
        }
        if !self.remove.is_empty() {
            parts.push(format!("{} to remove", self.remove.len()));
        }
        if !self.update.is_empty() {
            parts.push(format!("{} to resize", self.update.len()));
        }
        write!(f, "Disks: {}", parts.join(", "))
    }
}

/// Compute the plan from raw attribute values
///
/// Both values must be non-empty lists whose elements are finite, positive
/// numbers (or strings holding one).
pub fn compute_disk_diff(prior: &Value, desired: &Value) -> Result<DiskOperations> {
    let unparseable = || KamateraError::UnparseableDiskValues {
        prior: prior.clone(),
        desired: desired.clone(),
    };

    let old = parse_sizes(prior).ok_or_else(unparseable)?;
    let new = parse_sizes(desired).ok_or_else(unparseable)?;

    Ok(DiskOperations::between(&old, &new))
}

fn parse_sizes(value: &Value) -> Option<Vec<f64>> {
    let sizes = value
        .as_array()?
        .iter()
        .map(parse_size)
        .collect::<Option<Vec<f64>>>()?;
    if sizes.is_empty() { None } else { Some(sizes) }
}

fn parse_size(value: &Value) -> Option<f64> {
    let size = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (size.is_finite() && size > 0.0).then_some(size)
}

/// `10.0` renders as `10gb`, `10.5` as `10.5gb`
pub fn format_size_gb(size: f64) -> String {
    format!("{}gb", size)
}

/// Body of `POST server/disk`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskChangeRequest {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl DiskChangeRequest {
    pub fn add(server_id: &str, size: f64) -> Self {
        Self {
            add: Some(format_size_gb(size)),
            ..Self::empty(server_id)
        }
    }

    pub fn remove(server_id: &str, position: usize) -> Self {
        Self {
            remove: Some(position.to_string()),
            ..Self::empty(server_id)
        }
    }

    pub fn resize(server_id: &str, position: usize, size: f64) -> Self {
        Self {
            resize: Some(position.to_string()),
            size: Some(format_size_gb(size)),
            ..Self::empty(server_id)
        }
    }

    fn empty(server_id: &str) -> Self {
        Self {
            id: server_id.to_string(),
            add: None,
            remove: None,
            resize: None,
            size: None,
        }
    }
}

/// Request list in execution order: adds, removes, then resizes
pub fn disk_change_requests(server_id: &str, ops: &DiskOperations) -> Vec<DiskChangeRequest> {
    let adds = ops.add.iter().map(|size| DiskChangeRequest::add(server_id, *size));
    let removes = ops
        .remove
        .iter()
        .map(|position| DiskChangeRequest::remove(server_id, *position));
    let resizes = ops
        .update
        .iter()
        .map(|(position, size)| DiskChangeRequest::resize(server_id, *position, *size));

    adds.chain(removes).chain(resizes).collect()
}

/// Apply a plan to a server, one awaited command at a time
///
/// Stops at the first failure; operations already applied stay applied.
pub async fn apply_disk_operations(
    waiter: &CommandWaiter<'_>,
    server_id: &str,
    ops: &DiskOperations,
) -> Result<()> {
    if ops.is_empty() {
        tracing::debug!("No disk changes for server {}", server_id);
        return Ok(());
    }

    tracing::info!("Applying disk changes to server {} ({})", server_id, ops);
    for request in disk_change_requests(server_id, ops) {
        tracing::info!("Changing disk: {:?}", request);
        waiter.execute("server/disk", &request).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedApi;
    use serde_json::json;

    fn diff(prior: Value, desired: Value) -> DiskOperations {
        compute_disk_diff(&prior, &desired).unwrap()
    }

    fn updates(pairs: &[(usize, f64)]) -> BTreeMap<usize, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_update_only() {
        let ops = diff(json!([123.0, 456.0]), json!([123.0, 457.0]));
        assert_eq!(
            ops,
            DiskOperations {
                update: updates(&[(1, 457.0)]),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_remove_only() {
        let ops = diff(json!([123, 456]), json!([123]));
        assert_eq!(ops.remove, vec![1]);
        assert!(ops.add.is_empty());
        assert!(ops.update.is_empty());
    }

    #[test]
    fn test_add_only() {
        let ops = diff(json!([123]), json!([123, 456]));
        assert_eq!(ops.add, vec![456.0]);
        assert!(ops.remove.is_empty());
        assert!(ops.update.is_empty());
    }

    #[test]
    fn test_update_and_add() {
        let ops = diff(json!([123]), json!([124, 456]));
        assert_eq!(ops.add, vec![456.0]);
        assert_eq!(ops.update, updates(&[(0, 124.0)]));
    }

    #[test]
    fn test_update_and_remove() {
        let ops = diff(json!([123, 456]), json!([124]));
        assert_eq!(ops.remove, vec![1]);
        assert_eq!(ops.update, updates(&[(0, 124.0)]));
    }

    #[test]
    fn test_same_size_disks_resize_one() {
        let ops = diff(json!([123, 123]), json!([123, 456]));
        assert_eq!(ops.update, updates(&[(1, 456.0)]));
        assert!(ops.add.is_empty() && ops.remove.is_empty());
    }

    #[test]
    fn test_update_all_disks() {
        let ops = diff(json!([1, 2, 3, 4]), json!([2, 3, 4, 5]));
        assert_eq!(
            ops.update,
            updates(&[(0, 2.0), (1, 3.0), (2, 4.0), (3, 5.0)])
        );
    }

    #[test]
    fn test_remove_several_trailing() {
        let ops = diff(json!([10, 20, 30, 40]), json!([10]));
        assert_eq!(ops.remove, vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_lists_is_empty() {
        let ops = diff(json!([10, 20]), json!([10, 20]));
        assert!(ops.is_empty());
        assert_eq!(ops.to_string(), "No disk changes");
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let ops = diff(json!(["10", 20]), json!([10, "30.5"]));
        assert_eq!(ops.update, updates(&[(1, 30.5)]));
    }

    #[test]
    fn test_unparseable_values_carry_both_inputs() {
        let prior = json!(["a", 123.0]);
        let desired = json!([123.0]);

        let err = compute_disk_diff(&prior, &desired).unwrap_err();

        match err {
            KamateraError::UnparseableDiskValues {
                prior: p,
                desired: d,
            } => {
                assert_eq!(p, prior);
                assert_eq!(d, desired);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_or_non_list_is_unparseable() {
        for (prior, desired) in [
            (json!([]), json!([10])),
            (json!([10]), json!([])),
            (json!(10), json!([10])),
            (json!([10]), json!(null)),
            (json!([true]), json!([10])),
            (json!([10]), json!([10, -5])),
            (json!([0]), json!([10])),
            (json!([10]), json!(["-1.5"])),
        ] {
            assert!(matches!(
                compute_disk_diff(&prior, &desired),
                Err(KamateraError::UnparseableDiskValues { .. })
            ));
        }
    }

    #[test]
    fn test_add_and_remove_are_exclusive() {
        let lists: [&[f64]; 4] = [&[1.0], &[1.0, 2.0], &[3.0, 2.0, 1.0], &[5.0, 5.0, 5.0, 5.0]];
        for prior in lists {
            for desired in lists {
                let ops = DiskOperations::between(prior, desired);
                assert!(ops.add.is_empty() || ops.remove.is_empty());
            }
        }
    }

    #[test]
    fn test_summary() {
        let ops = DiskOperations::between(&[10.0], &[20.0, 30.0, 40.0]);
        assert_eq!(ops.to_string(), "Disks: 2 to add, 1 to resize");
        assert_eq!(ops.len(), 3);
    }

    #[test]
    fn test_format_size_gb() {
        assert_eq!(format_size_gb(10.0), "10gb");
        assert_eq!(format_size_gb(10.5), "10.5gb");
    }

    #[test]
    fn test_request_payload_shapes() {
        assert_eq!(
            serde_json::to_value(DiskChangeRequest::add("srv", 10.0)).unwrap(),
            json!({"id": "srv", "add": "10gb"})
        );
        assert_eq!(
            serde_json::to_value(DiskChangeRequest::remove("srv", 2)).unwrap(),
            json!({"id": "srv", "remove": "2"})
        );
        assert_eq!(
            serde_json::to_value(DiskChangeRequest::resize("srv", 0, 50.0)).unwrap(),
            json!({"id": "srv", "resize": "0", "size": "50gb"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_order_adds_then_resizes() {
        let api = ScriptedApi::completing();
        let waiter = CommandWaiter::new(&api);
        let ops = DiskOperations::between(&[10.0, 20.0], &[15.0, 25.0, 30.0, 40.0]);

        apply_disk_operations(&waiter, "srv-1", &ops).await.unwrap();

        assert_eq!(
            api.bodies(),
            vec![
                json!({"id": "srv-1", "add": "30gb"}),
                json!({"id": "srv-1", "add": "40gb"}),
                json!({"id": "srv-1", "resize": "0", "size": "15gb"}),
                json!({"id": "srv-1", "resize": "1", "size": "25gb"}),
            ]
        );
        assert!(api.requests().iter().all(|c| c.path == "server/disk"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_order_removes_then_resizes() {
        let api = ScriptedApi::completing();
        let waiter = CommandWaiter::new(&api);
        let ops = DiskOperations::between(&[10.0, 20.0, 30.0], &[11.0]);

        apply_disk_operations(&waiter, "srv-1", &ops).await.unwrap();

        assert_eq!(
            api.bodies(),
            vec![
                json!({"id": "srv-1", "remove": "1"}),
                json!({"id": "srv-1", "remove": "2"}),
                json!({"id": "srv-1", "resize": "0", "size": "11gb"}),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_waits_for_each_command() {
        let api = ScriptedApi::completing();
        let waiter = CommandWaiter::new(&api);
        let ops = DiskOperations::between(&[10.0], &[10.0, 20.0, 30.0]);

        apply_disk_operations(&waiter, "srv-1", &ops).await.unwrap();

        let calls = api.calls();
        let kinds: Vec<bool> = calls.iter().map(|c| c.is_queue_poll()).collect();
        assert_eq!(kinds, vec![false, true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_stops_at_first_failure() {
        let api = ScriptedApi::new(|call| {
            if call.is_queue_poll() {
                Ok(json!([{"status": "error", "log": "no space"}]))
            } else {
                Ok(json!(["cmd-1"]))
            }
        });
        let waiter = CommandWaiter::new(&api);
        let ops = DiskOperations::between(&[10.0], &[10.0, 20.0, 30.0]);

        let err = apply_disk_operations(&waiter, "srv-1", &ops)
            .await
            .unwrap_err();

        assert!(matches!(err, KamateraError::CommandFailed(ref log) if log == "no space"));
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_stops_when_disk_call_is_rejected() {
        let api = ScriptedApi::new(|call| {
            if call.is_queue_poll() {
                Ok(json!([{"status": "complete"}]))
            } else {
                Err(KamateraError::Api {
                    status: 500,
                    message: "disk quota exceeded".into(),
                })
            }
        });
        let waiter = CommandWaiter::new(&api);
        let ops = DiskOperations::between(&[10.0], &[10.0, 20.0, 30.0]);

        let err = apply_disk_operations(&waiter, "srv-1", &ops)
            .await
            .unwrap_err();

        assert!(matches!(err, KamateraError::Api { status: 500, .. }));
        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].is_queue_poll());
        assert_eq!(calls[0].body, Some(json!({"id": "srv-1", "add": "20gb"})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_failure_midway_keeps_earlier_changes() {
        let api = ScriptedApi::new(|call| match call.path.as_str() {
            "service/queue?id=cmd-1" => Ok(json!([{"status": "complete", "log": "added"}])),
            "service/queue?id=cmd-2" => Ok(json!([{"status": "error", "log": "disk busy"}])),
            _ => {
                let next = match call.body.as_ref().and_then(|b| b.get("add")) {
                    Some(size) if size == "20gb" => "cmd-1",
                    Some(size) if size == "30gb" => "cmd-2",
                    _ => "cmd-3",
                };
                Ok(json!([next]))
            }
        });
        let waiter = CommandWaiter::new(&api);
        let ops = DiskOperations::between(&[10.0], &[10.0, 20.0, 30.0, 40.0]);

        let err = apply_disk_operations(&waiter, "srv-1", &ops)
            .await
            .unwrap_err();

        assert!(matches!(err, KamateraError::CommandFailed(ref log) if log == "disk busy"));
        assert_eq!(
            api.bodies(),
            vec![
                json!({"id": "srv-1", "add": "20gb"}),
                json!({"id": "srv-1", "add": "30gb"}),
            ]
        );
        let paths: Vec<String> = api.calls().into_iter().map(|c| c.path).collect();
        assert_eq!(
            paths,
            vec![
                "server/disk",
                "service/queue?id=cmd-1",
                "server/disk",
                "service/queue?id=cmd-2",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_empty_plan_makes_no_calls() {
        let api = ScriptedApi::completing();
        let waiter = CommandWaiter::new(&api);

        apply_disk_operations(&waiter, "srv-1", &DiskOperations::default())
            .await
            .unwrap();

        assert!(api.calls().is_empty());
    }
}
