//! Concurrent trace tree construction.
//!
//! Field resolutions running in parallel report into one shared
//! [`TraceTree`]. `begin_field` takes the path index lock only long enough to
//! link a new node under its parent; `end_field` writes to its own node under
//! that node's mutex and shares the index lock with every other writer.
//! `seal` takes the index lock exclusively, so it observes every write that
//! completed before it and rejects every write that comes after.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, TraceError};
use crate::logging::structured::LogContext;
use crate::{log_debug, log_error};
use crate::redaction::errors::ErrorPolicy;

use super::node::{FieldError, TraceNode};
use super::path::{PathSegment, ResponsePath};

#[derive(Debug)]
struct NodeRecord {
    segment: Option<PathSegment>,
    type_name: Option<String>,
    parent_type: Option<String>,
    start_offset_ns: u64,
    end_offset_ns: Option<u64>,
    errors: Vec<FieldError>,
    /// False for parents created implicitly ahead of their own `begin_field`.
    claimed: bool,
}

#[derive(Debug)]
struct NodeCell {
    record: Mutex<NodeRecord>,
    children: Mutex<Vec<Arc<NodeCell>>>,
}

impl NodeCell {
    fn new(record: NodeRecord) -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(record),
            children: Mutex::new(Vec::new()),
        })
    }

    fn snapshot(&self) -> TraceNode {
        let record = self.record.lock();
        let children = self
            .children
            .lock()
            .iter()
            .map(|child| child.snapshot())
            .collect();

        TraceNode {
            segment: record.segment.clone(),
            type_name: record.type_name.clone(),
            parent_type: record.parent_type.clone(),
            start_offset_ns: record.start_offset_ns,
            end_offset_ns: record.end_offset_ns,
            errors: record.errors.clone(),
            children,
            implicit: !record.claimed,
        }
    }
}

/// Exclusive handle to one field's node, returned by
/// [`TraceTree::begin_field`] and consumed by [`TraceTree::end_field`].
#[derive(Debug)]
#[must_use = "a field node must be ended with TraceTree::end_field"]
pub struct NodeHandle {
    path: ResponsePath,
    cell: Arc<NodeCell>,
}

impl NodeHandle {
    pub fn path(&self) -> &ResponsePath {
        &self.path
    }
}

/// Append-only tree of one operation's field resolutions.
#[derive(Debug)]
pub struct TraceTree {
    ctx: LogContext,
    epoch: Instant,
    start_time: DateTime<Utc>,
    root: Arc<NodeCell>,
    index: RwLock<HashMap<ResponsePath, Arc<NodeCell>>>,
    sealed: AtomicBool,
    fields: AtomicUsize,
    error_policy: ErrorPolicy,
}

impl TraceTree {
    pub fn new(ctx: LogContext, error_policy: ErrorPolicy) -> Self {
        let root = NodeCell::new(NodeRecord {
            segment: None,
            type_name: None,
            parent_type: None,
            start_offset_ns: 0,
            end_offset_ns: None,
            errors: Vec::new(),
            claimed: true,
        });

        let mut index = HashMap::new();
        index.insert(ResponsePath::root(), Arc::clone(&root));

        Self {
            ctx,
            epoch: Instant::now(),
            start_time: Utc::now(),
            root,
            index: RwLock::new(index),
            sealed: AtomicBool::new(false),
            fields: AtomicUsize::new(0),
            error_policy,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Number of `begin_field` calls accepted so far.
    pub fn field_count(&self) -> usize {
        self.fields.load(Ordering::Acquire)
    }

    /// Nanoseconds since the tree was opened.
    pub fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Record the start of a field resolution at `path`.
    ///
    /// The last segment of `path` must be a field name. Missing ancestors
    /// (list-index nodes in particular) are created on the way down.
    pub fn begin_field(
        &self,
        path: ResponsePath,
        type_name: &str,
        parent_type: Option<&str>,
    ) -> Result<NodeHandle> {
        let segment = match path.last() {
            Some(segment @ PathSegment::Field(_)) => segment.clone(),
            Some(PathSegment::Index(_)) => {
                return Err(self.invalid(path, "last segment must be a field name"));
            }
            None => return Err(self.invalid(path, "path is empty")),
        };

        let mut index = self.index.write();

        if self.is_sealed() {
            return Err(self.write_after_seal("begin field", path));
        }

        let start = self.elapsed_ns();

        if let Some(existing) = index.get(&path) {
            let mut record = existing.record.lock();
            if record.claimed {
                log_error!(self.ctx, "TRACE_DUPLICATE_PATH", path = path);
                return Err(TraceError::DuplicatePath(path));
            }
            record.claimed = true;
            record.type_name = Some(type_name.to_string());
            record.parent_type = parent_type.map(str::to_string);
            record.start_offset_ns = start;
            drop(record);

            self.fields.fetch_add(1, Ordering::AcqRel);
            return Ok(NodeHandle {
                cell: Arc::clone(existing),
                path,
            });
        }

        let parent = Self::ensure_node(&mut index, path.parent().unwrap_or_default(), start);
        let cell = NodeCell::new(NodeRecord {
            segment: Some(segment),
            type_name: Some(type_name.to_string()),
            parent_type: parent_type.map(str::to_string),
            start_offset_ns: start,
            end_offset_ns: None,
            errors: Vec::new(),
            claimed: true,
        });
        parent.children.lock().push(Arc::clone(&cell));
        index.insert(path.clone(), Arc::clone(&cell));
        drop(index);

        self.fields.fetch_add(1, Ordering::AcqRel);
        log_debug!(self.ctx, "FIELD_BEGIN", path = path, type_name = type_name);

        Ok(NodeHandle { path, cell })
    }

    /// Record the end of a field resolution, with its error if it failed.
    ///
    /// The error passes through the tree's [`ErrorPolicy`] first.
    pub fn end_field(&self, handle: NodeHandle, error: Option<FieldError>) -> Result<()> {
        let _index = self.index.read();

        if self.is_sealed() {
            return Err(self.write_after_seal("end field", handle.path));
        }

        let end = self.elapsed_ns();
        let error = error.and_then(|e| self.error_policy.apply(e));

        let mut record = handle.cell.record.lock();
        record.end_offset_ns = Some(end);
        if let Some(error) = error {
            log_debug!(self.ctx, "FIELD_ERROR", path = handle.path);
            record.errors.push(error);
        }

        Ok(())
    }

    /// Attach an error that belongs to the operation as a whole.
    pub fn add_root_error(&self, error: FieldError) -> Result<()> {
        let _index = self.index.read();

        if self.is_sealed() {
            return Err(self.write_after_seal("add root error", ResponsePath::root()));
        }

        if let Some(error) = self.error_policy.apply(error) {
            self.root.record.lock().errors.push(error);
        }
        Ok(())
    }

    /// Close the tree and return its root. May be called once.
    pub fn seal(&self) -> Result<TraceNode> {
        if self.sealed.swap(true, Ordering::AcqRel) {
            log_error!(self.ctx, "TRACE_DOUBLE_SEAL");
            return Err(TraceError::AlreadySealed);
        }

        // Wait out writers that passed their sealed check before the swap.
        let index = self.index.write();
        let end = self.elapsed_ns();
        self.root.record.lock().end_offset_ns = Some(end);

        let root = self.root.snapshot();
        log_debug!(
            self.ctx,
            "TRACE_SEALED",
            nodes = index.len() - 1,
            fields = self.field_count(),
            duration_ns = end,
        );

        Ok(root)
    }

    fn ensure_node(
        index: &mut HashMap<ResponsePath, Arc<NodeCell>>,
        path: ResponsePath,
        start: u64,
    ) -> Arc<NodeCell> {
        if let Some(cell) = index.get(&path) {
            return Arc::clone(cell);
        }

        // Only the root has no last segment, and the root is always indexed.
        let segment = path.last().cloned();
        let parent = Self::ensure_node(index, path.parent().unwrap_or_default(), start);
        let cell = NodeCell::new(NodeRecord {
            segment,
            type_name: None,
            parent_type: None,
            start_offset_ns: start,
            end_offset_ns: None,
            errors: Vec::new(),
            claimed: false,
        });
        parent.children.lock().push(Arc::clone(&cell));
        index.insert(path, Arc::clone(&cell));
        cell
    }

    fn invalid(&self, path: ResponsePath, reason: &'static str) -> TraceError {
        log_error!(self.ctx, "TRACE_INVALID_PATH", path = path, reason = reason);
        TraceError::InvalidPath { path, reason }
    }

    fn write_after_seal(&self, operation: &'static str, path: ResponsePath) -> TraceError {
        log_error!(
            self.ctx,
            "TRACE_WRITE_AFTER_SEAL",
            operation = operation,
            path = path,
        );
        TraceError::Sealed { operation, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response_path;

    fn tree() -> TraceTree {
        TraceTree::new(LogContext::new("test-request"), ErrorPolicy::Unmodified)
    }

    #[test]
    fn test_nested_fields_build_tree() {
        let tree = tree();
        let user = tree.begin_field(response_path!["user"], "User", Some("Query")).unwrap();
        let name = tree
            .begin_field(response_path!["user", "name"], "String", Some("User"))
            .unwrap();
        tree.end_field(name, None).unwrap();
        tree.end_field(user, None).unwrap();

        let root = tree.seal().unwrap();
        assert_eq!(root.field_count(), 2);

        let name = root.find(&response_path!["user", "name"]).unwrap();
        assert_eq!(name.type_name.as_deref(), Some("String"));
        assert_eq!(name.parent_type.as_deref(), Some("User"));
        assert!(name.end_offset_ns.is_some());
        assert!(root.end_offset_ns.is_some());
    }

    #[test]
    fn test_list_index_nodes_are_implicit() {
        let tree = tree();
        let users = tree.begin_field(response_path!["users"], "[User]", None).unwrap();
        for i in 0..3usize {
            let h = tree
                .begin_field(response_path!["users", i, "id"], "ID", Some("User"))
                .unwrap();
            tree.end_field(h, None).unwrap();
        }
        tree.end_field(users, None).unwrap();

        let root = tree.seal().unwrap();
        assert_eq!(root.field_count(), 4);
        let users = root.find(&response_path!["users"]).unwrap();
        assert_eq!(users.children.len(), 3);
        assert_eq!(users.children[1].segment, Some(PathSegment::Index(1)));
        assert!(users.children[1].type_name.is_none());
    }

    #[test]
    fn test_parent_created_ahead_is_claimed_later() {
        let tree = tree();
        let child = tree.begin_field(response_path!["a", "b"], "Int", None).unwrap();
        let parent = tree.begin_field(response_path!["a"], "A", None).unwrap();
        tree.end_field(child, None).unwrap();
        tree.end_field(parent, None).unwrap();

        let root = tree.seal().unwrap();
        assert_eq!(root.field_count(), 2);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].type_name.as_deref(), Some("A"));
    }

    #[test]
    fn test_unclaimed_parent_not_counted_as_field() {
        let tree = tree();
        let child = tree.begin_field(response_path!["a", "b"], "Int", None).unwrap();
        tree.end_field(child, None).unwrap();

        let root = tree.seal().unwrap();
        assert_eq!(tree.field_count(), 1);
        assert_eq!(root.field_count(), 1);

        let parent = root.find(&response_path!["a"]).unwrap();
        assert!(parent.implicit);
        assert!(parent.type_name.is_none());
        assert!(!root.find(&response_path!["a", "b"]).unwrap().implicit);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let tree = tree();
        let _first = tree.begin_field(response_path!["x"], "Int", None).unwrap();
        let err = tree.begin_field(response_path!["x"], "Int", None).unwrap_err();
        assert_eq!(err, TraceError::DuplicatePath(response_path!["x"]));
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let tree = tree();
        assert!(matches!(
            tree.begin_field(ResponsePath::root(), "Query", None),
            Err(TraceError::InvalidPath { .. })
        ));
        assert!(matches!(
            tree.begin_field(response_path!["list", 0usize], "Item", None),
            Err(TraceError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_errors_recorded_through_policy() {
        let tree = TraceTree::new(LogContext::new("test-request"), ErrorPolicy::Masked);
        let path = response_path!["boom"];
        let h = tree.begin_field(path.clone(), "String", None).unwrap();
        tree.end_field(h, Some(FieldError::new("secret detail", path.clone())))
            .unwrap();
        tree.add_root_error(FieldError::new("validation", ResponsePath::root()))
            .unwrap();

        let root = tree.seal().unwrap();
        let node = root.find(&path).unwrap();
        assert_eq!(node.errors.len(), 1);
        assert_eq!(node.errors[0].message, "<masked>");
        assert_eq!(node.errors[0].path, path);
        assert_eq!(root.errors.len(), 1);
        assert_eq!(root.error_count(), 2);
    }

    #[test]
    fn test_writes_after_seal_fail() {
        let tree = tree();
        let open = tree.begin_field(response_path!["slow"], "Int", None).unwrap();
        tree.seal().unwrap();

        assert!(matches!(
            tree.end_field(open, None),
            Err(TraceError::Sealed { .. })
        ));
        assert!(matches!(
            tree.begin_field(response_path!["late"], "Int", None),
            Err(TraceError::Sealed { .. })
        ));
        assert!(matches!(
            tree.add_root_error(FieldError::new("late", ResponsePath::root())),
            Err(TraceError::Sealed { .. })
        ));
        assert_eq!(tree.seal(), Err(TraceError::AlreadySealed));
    }

    #[test]
    fn test_unfinished_node_kept_in_partial_trace() {
        let tree = tree();
        let _never_ended = tree.begin_field(response_path!["hang"], "Int", None).unwrap();
        let root = tree.seal().unwrap();

        let node = root.find(&response_path!["hang"]).unwrap();
        assert!(node.end_offset_ns.is_none());
    }

    #[test]
    fn test_concurrent_disjoint_writers() {
        let tree = Arc::new(tree());
        let list = tree.begin_field(response_path!["items"], "[Item]", None).unwrap();

        std::thread::scope(|scope| {
            for i in 0..16usize {
                let tree = Arc::clone(&tree);
                scope.spawn(move || {
                    let item = tree
                        .begin_field(response_path!["items", i, "id"], "ID", Some("Item"))
                        .unwrap();
                    let name = tree
                        .begin_field(response_path!["items", i, "name"], "String", Some("Item"))
                        .unwrap();
                    tree.end_field(name, None).unwrap();
                    tree.end_field(item, None).unwrap();
                });
            }
        });

        tree.end_field(list, None).unwrap();
        let root = tree.seal().unwrap();

        assert_eq!(root.field_count(), 1 + 16 * 2);
        assert_eq!(root.field_count(), tree.field_count());

        let items = root.find(&response_path!["items"]).unwrap();
        assert_eq!(items.children.len(), 16);
        for item in &items.children {
            assert_eq!(item.children.len(), 2);
            assert!(item.children.iter().all(|c| c.end_offset_ns.is_some()));
        }
    }
}
