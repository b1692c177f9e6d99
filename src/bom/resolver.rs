//! bom::resolver
//!
//! Materializes a configuration tree from the backing store.
//!
//! # Design
//!
//! A [`Resolver`] is one resolution session. It owns two caches:
//! - a record cache holding one `OnceCell` per identity, so every identity is
//!   looked up at most once per session even when several resolves ask for it
//!   concurrently
//! - a node cache of fully built unfiltered subtrees, so repeated resolves
//!   hand back the same `Arc`
//! - a node cache per libtype filter; filtered builds also reuse cached
//!   leaves and unfiltered subtrees the filter leaves untouched
//!
//! Resolution runs in two phases:
//!
//! 1. **Fetch**: breadth-first walk of the reachable identities with at most
//!    `max_concurrency` lookups in flight. Each identity is scheduled once, so
//!    the walk terminates on cyclic data.
//! 2. **Build**: synchronous depth-first construction over the fetched
//!    records with an explicit frame stack. The frames on the stack are the
//!    in-progress path and detect cycles; a memo gives shared sub-variants a
//!    single node.
//!
//! Any error aborts the whole resolve. No partial tree is returned.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;

use super::flatten::unique_nodes;
use super::node::{ConfigNode, ShapeError};
use crate::core::config::ResolverSettings;
use crate::core::types::{ConfigId, LibtypeFilter};
use crate::store::{ConfigStore, StoreError, StoreRecord};

/// Errors from resolving a configuration tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// A referenced configuration does not exist in the store.
    #[error("configuration not found: {id} (via {})", render_path(.path))]
    NotFound { id: ConfigId, path: Vec<ConfigId> },

    /// A configuration references itself, directly or transitively.
    #[error("cycle detected at {id}: {}", render_path(.path))]
    CycleDetected { id: ConfigId, path: Vec<ConfigId> },

    /// The session deadline or a store request timed out.
    #[error("timed out resolving {id}: {reason}")]
    Timeout { id: ConfigId, reason: String },

    /// The store failed; the caller may retry.
    #[error("store error while resolving {id}: {source}")]
    Store {
        id: ConfigId,
        #[source]
        source: StoreError,
    },

    /// The store record contradicts the identity's shape.
    #[error("invalid store record for {id}: {reason}")]
    InvalidRecord { id: ConfigId, reason: String },
}

impl ResolveError {
    /// The identity the error is about.
    pub fn id(&self) -> &ConfigId {
        match self {
            ResolveError::NotFound { id, .. }
            | ResolveError::CycleDetected { id, .. }
            | ResolveError::Timeout { id, .. }
            | ResolveError::Store { id, .. }
            | ResolveError::InvalidRecord { id, .. } => id,
        }
    }

    /// Whether retrying the resolve later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolveError::Timeout { .. } | ResolveError::Store { .. }
        )
    }
}

fn render_path(path: &[ConfigId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

type RecordCell = Arc<OnceCell<StoreRecord>>;
type FetchResult = (ConfigId, Result<StoreRecord, StoreError>);
/// Built nodes by identity; `None` marks a composite pruned by the filter.
type Memo = HashMap<ConfigId, Option<Arc<ConfigNode>>>;

/// A resolution session.
///
/// Sessions share nothing: two resolvers over the same store keep separate
/// caches. A resolver is `Sync`, so one session may serve concurrent resolves.
///
/// # Example
///
/// ```
/// use bomtree::bom::Resolver;
/// use bomtree::core::types::ConfigId;
/// use bomtree::store::mock::MockStore;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let root = ConfigId::parse("i10/cpu/dev").unwrap();
/// let rtl = ConfigId::parse("i10/cpu/rtl/dev").unwrap();
/// let store = MockStore::new()
///     .with_composite(root.clone(), vec![rtl.clone()])
///     .with_leaf(rtl, "@1234");
///
/// let resolver = Resolver::with_defaults(Arc::new(store));
/// let first = resolver.resolve(&root).await.unwrap();
/// let second = resolver.resolve(&root).await.unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// # });
/// ```
pub struct Resolver {
    store: Arc<dyn ConfigStore>,
    settings: ResolverSettings,
    permits: Arc<Semaphore>,
    records: Mutex<HashMap<ConfigId, RecordCell>>,
    nodes: Mutex<HashMap<ConfigId, Arc<ConfigNode>>>,
    filtered: Mutex<HashMap<LibtypeFilter, Memo>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("store", &self.store.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Resolver {
    /// Open a session over `store`.
    pub fn new(store: Arc<dyn ConfigStore>, settings: ResolverSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            store,
            settings,
            permits,
            records: Mutex::new(HashMap::new()),
            nodes: Mutex::new(HashMap::new()),
            filtered: Mutex::new(HashMap::new()),
        }
    }

    /// Open a session with default settings.
    pub fn with_defaults(store: Arc<dyn ConfigStore>) -> Self {
        Self::new(store, ResolverSettings::default())
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Number of identities whose store record has been fetched.
    pub fn cached_records(&self) -> usize {
        lock(&self.records)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Number of nodes usable by unfiltered resolves: complete subtrees and
    /// leaves.
    pub fn cached_nodes(&self) -> usize {
        lock(&self.nodes).len()
    }

    /// Resolve `id` into a full tree.
    ///
    /// # Errors
    ///
    /// - `NotFound` if any reachable identity is missing
    /// - `CycleDetected` if an identity reaches itself
    /// - `Timeout` if the session deadline or a store request times out
    /// - `Store` on other store failures
    /// - `InvalidRecord` if a record contradicts its identity
    pub async fn resolve(&self, id: &ConfigId) -> Result<Arc<ConfigNode>, ResolveError> {
        if let Some(node) = lock(&self.nodes).get(id) {
            tracing::debug!(%id, "node cache hit");
            return Ok(Arc::clone(node));
        }
        self.with_deadline(id, self.resolve_inner(id, None)).await
    }

    /// Resolve `id`, keeping only leaves whose libtype is in `filter`.
    ///
    /// Non-matching leaves are never looked up. Composites left without any
    /// matching leaf are dropped, except the root, which is always returned.
    /// A leaf root is returned as stored even when its libtype is outside
    /// `filter`.
    ///
    /// Within a session, leaves are shared with unfiltered resolves, and
    /// repeated resolves with the same filter return the same nodes.
    pub async fn resolve_filtered(
        &self,
        id: &ConfigId,
        filter: &LibtypeFilter,
    ) -> Result<Arc<ConfigNode>, ResolveError> {
        let hit = lock(&self.filtered)
            .get(filter)
            .and_then(|memo| memo.get(id).cloned().flatten());
        if let Some(node) = hit {
            tracing::debug!(%id, %filter, "filtered node cache hit");
            return Ok(node);
        }
        self.with_deadline(id, self.resolve_inner(id, Some(filter)))
            .await
    }

    async fn with_deadline<F>(
        &self,
        id: &ConfigId,
        work: F,
    ) -> Result<Arc<ConfigNode>, ResolveError>
    where
        F: std::future::Future<Output = Result<Arc<ConfigNode>, ResolveError>>,
    {
        let Some(deadline) = self.settings.deadline else {
            return work.await;
        };
        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%id, ?deadline, "resolve deadline exceeded");
                Err(ResolveError::Timeout {
                    id: id.clone(),
                    reason: format!("deadline of {} exceeded", format_duration(deadline)),
                })
            }
        }
    }

    async fn resolve_inner(
        &self,
        root: &ConfigId,
        filter: Option<&LibtypeFilter>,
    ) -> Result<Arc<ConfigNode>, ResolveError> {
        let records = self.fetch(root, filter).await?;

        let memo = match filter {
            Some(filter) => self.filtered_memo(filter),
            None => lock(&self.nodes)
                .iter()
                .map(|(k, v)| (k.clone(), Some(Arc::clone(v))))
                .collect(),
        };
        let mut build = Build {
            records: &records,
            filter,
            memo,
            on_path: HashSet::new(),
        };

        let node = match build.run(root)? {
            Some(node) => node,
            // The root composite is never pruned.
            None => {
                return Err(ResolveError::InvalidRecord {
                    id: root.clone(),
                    reason: "root configuration was pruned".to_string(),
                })
            }
        };

        match filter {
            None => {
                let mut nodes = lock(&self.nodes);
                for n in unique_nodes(&node) {
                    nodes.entry(n.id().clone()).or_insert(n);
                }
            }
            Some(filter) => self.keep_filtered(filter, build.memo),
        }

        tracing::info!(
            root = %root,
            filter = ?filter.map(ToString::to_string),
            records = records.len(),
            "resolved configuration"
        );
        Ok(node)
    }

    /// Starting memo for a build under `filter`.
    ///
    /// Earlier builds under the same filter come first. Cached leaves are
    /// filter independent. A cached unfiltered composite is reused when the
    /// filter would keep its whole subtree unchanged.
    fn filtered_memo(&self, filter: &LibtypeFilter) -> Memo {
        let mut memo = lock(&self.filtered).get(filter).cloned().unwrap_or_default();

        let nodes = lock(&self.nodes);
        let intact = untouched_by(&nodes, filter);
        for (id, node) in nodes.iter() {
            if node.is_leaf() || intact.contains(id) {
                memo.entry(id.clone())
                    .or_insert_with(|| Some(Arc::clone(node)));
            }
        }
        memo
    }

    /// Record the nodes of a successful filtered build.
    fn keep_filtered(&self, filter: &LibtypeFilter, memo: Memo) {
        {
            let mut nodes = lock(&self.nodes);
            for node in memo.values().flatten().filter(|n| n.is_leaf()) {
                nodes
                    .entry(node.id().clone())
                    .or_insert_with(|| Arc::clone(node));
            }
        }

        let mut filtered = lock(&self.filtered);
        let cached = filtered.entry(filter.clone()).or_default();
        for (id, node) in memo {
            cached.entry(id).or_insert(node);
        }
    }

    /// Get or create the record cell for `id`.
    fn record_cell(&self, id: &ConfigId) -> RecordCell {
        Arc::clone(lock(&self.records).entry(id.clone()).or_default())
    }

    fn spawn_fetch(&self, tasks: &mut JoinSet<FetchResult>, id: ConfigId) {
        let cell = self.record_cell(&id);
        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.permits);

        tasks.spawn(async move {
            let result = cell
                .get_or_try_init(|| async {
                    let _permit = permits
                        .acquire()
                        .await
                        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                    tracing::debug!(%id, store = store.name(), "lookup");
                    store.lookup(&id).await
                })
                .await
                .cloned();
            (id, result)
        });
    }

    /// Fetch every record reachable from `root`.
    async fn fetch(
        &self,
        root: &ConfigId,
        filter: Option<&LibtypeFilter>,
    ) -> Result<HashMap<ConfigId, StoreRecord>, ResolveError> {
        let mut parents: HashMap<ConfigId, Option<ConfigId>> = HashMap::new();
        let mut fetched = HashMap::new();
        let mut tasks = JoinSet::new();

        parents.insert(root.clone(), None);
        self.spawn_fetch(&mut tasks, root.clone());

        while let Some(joined) = tasks.join_next().await {
            let (id, result) = joined.map_err(|e| ResolveError::Store {
                id: root.clone(),
                source: StoreError::Unavailable(format!("lookup task failed: {e}")),
            })?;
            let record = result.map_err(|e| lookup_error(&id, e, &parents))?;

            if let StoreRecord::Composite { children } = &record {
                for child in children {
                    if filter.is_some_and(|f| !f.admits(child)) {
                        continue;
                    }
                    if parents.contains_key(child) {
                        continue;
                    }
                    parents.insert(child.clone(), Some(id.clone()));
                    self.spawn_fetch(&mut tasks, child.clone());
                }
            }
            fetched.insert(id, record);
        }

        Ok(fetched)
    }
}

/// Map a lookup failure for `id` to a resolve error.
fn lookup_error(
    id: &ConfigId,
    err: StoreError,
    parents: &HashMap<ConfigId, Option<ConfigId>>,
) -> ResolveError {
    match err {
        StoreError::NotFound(_) => {
            let path = path_to(id, parents);
            tracing::warn!(%id, path = %render_path(&path), "configuration not found");
            ResolveError::NotFound {
                id: id.clone(),
                path,
            }
        }
        StoreError::Timeout(reason) => ResolveError::Timeout {
            id: id.clone(),
            reason,
        },
        other => ResolveError::Store {
            id: id.clone(),
            source: other,
        },
    }
}

/// Discovery path from the root to `id`, inclusive.
fn path_to(id: &ConfigId, parents: &HashMap<ConfigId, Option<ConfigId>>) -> Vec<ConfigId> {
    let mut path = vec![id.clone()];
    let mut current = id;
    while let Some(Some(parent)) = parents.get(current) {
        path.push(parent.clone());
        current = parent;
    }
    path.reverse();
    path
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// Identities of cached nodes that `filter` keeps unchanged: every leaf
/// below passes the filter and no composite below would be pruned.
fn untouched_by(
    nodes: &HashMap<ConfigId, Arc<ConfigNode>>,
    filter: &LibtypeFilter,
) -> HashSet<ConfigId> {
    let mut verdicts: HashMap<&ConfigId, bool> = HashMap::new();

    for top in nodes.values() {
        let mut stack: Vec<(&Arc<ConfigNode>, bool)> = vec![(top, false)];
        while let Some((node, expanded)) = stack.pop() {
            if verdicts.contains_key(node.id()) {
                continue;
            }
            if !expanded {
                stack.push((node, true));
                for child in node.children() {
                    if !verdicts.contains_key(child.id()) {
                        stack.push((child, false));
                    }
                }
                continue;
            }
            let keep = match node.as_ref() {
                ConfigNode::Leaf(leaf) => filter.matches(leaf.libtype()),
                ConfigNode::Composite(composite) => {
                    !composite.children().is_empty()
                        && composite
                            .children()
                            .iter()
                            .all(|c| verdicts.get(c.id()).copied().unwrap_or(false))
                }
            };
            verdicts.insert(node.id(), keep);
        }
    }

    verdicts
        .into_iter()
        .filter(|(_, keep)| *keep)
        .map(|(id, _)| id.clone())
        .collect()
}

/// A composite whose children are being built.
struct Frame<'a> {
    id: &'a ConfigId,
    children: &'a [ConfigId],
    next: usize,
    built: Vec<Arc<ConfigNode>>,
}

enum Visit {
    /// The node is complete; `None` if pruned.
    Built(Option<Arc<ConfigNode>>),
    /// A composite frame was pushed.
    Descended,
}

/// Build phase state.
struct Build<'a> {
    records: &'a HashMap<ConfigId, StoreRecord>,
    filter: Option<&'a LibtypeFilter>,
    memo: Memo,
    /// Identities of the frames on the stack.
    on_path: HashSet<&'a ConfigId>,
}

fn invalid(id: &ConfigId, err: ShapeError) -> ResolveError {
    ResolveError::InvalidRecord {
        id: id.clone(),
        reason: err.to_string(),
    }
}

fn path_through(frames: &[Frame<'_>], id: &ConfigId) -> Vec<ConfigId> {
    frames
        .iter()
        .map(|f| f.id.clone())
        .chain(std::iter::once(id.clone()))
        .collect()
}

impl<'a> Build<'a> {
    fn run(&mut self, root: &ConfigId) -> Result<Option<Arc<ConfigNode>>, ResolveError> {
        let mut frames: Vec<Frame<'a>> = Vec::new();
        if let Visit::Built(node) = self.visit(root, &mut frames)? {
            return Ok(node);
        }

        while let Some(frame) = frames.last_mut() {
            let children = frame.children;
            if let Some(child) = children.get(frame.next) {
                frame.next += 1;
                if self.filter.is_some_and(|f| !f.admits(child)) {
                    continue;
                }
                if let Visit::Built(Some(node)) = self.visit(child, &mut frames)? {
                    if let Some(parent) = frames.last_mut() {
                        parent.built.push(node);
                    }
                }
                continue;
            }

            let Some(done) = frames.pop() else { break };
            let node = self.finish(done, frames.is_empty())?;
            match frames.last_mut() {
                Some(parent) => parent.built.extend(node),
                None => return Ok(node),
            }
        }

        Ok(None)
    }

    /// Start building `id`: reuse, build a leaf, or push a composite frame.
    fn visit(
        &mut self,
        id: &ConfigId,
        frames: &mut Vec<Frame<'a>>,
    ) -> Result<Visit, ResolveError> {
        if let Some(node) = self.memo.get(id) {
            return Ok(Visit::Built(node.clone()));
        }

        if self.on_path.contains(id) {
            let path = path_through(frames, id);
            tracing::warn!(%id, path = %render_path(&path), "configuration cycle");
            return Err(ResolveError::CycleDetected {
                id: id.clone(),
                path,
            });
        }

        let records = self.records;
        let Some((key, record)) = records.get_key_value(id) else {
            return Err(ResolveError::NotFound {
                id: id.clone(),
                path: path_through(frames, id),
            });
        };

        match record {
            StoreRecord::Leaf { artifact } => {
                let node = Arc::new(
                    ConfigNode::leaf(key.clone(), artifact.clone()).map_err(|e| invalid(key, e))?,
                );
                self.memo.insert(key.clone(), Some(Arc::clone(&node)));
                Ok(Visit::Built(Some(node)))
            }
            StoreRecord::Composite { children } => {
                if key.is_leaf() {
                    return Err(invalid(key, ShapeError::CompositeWithLibtype(key.clone())));
                }
                self.on_path.insert(key);
                frames.push(Frame {
                    id: key,
                    children,
                    next: 0,
                    built: Vec::with_capacity(children.len()),
                });
                Ok(Visit::Descended)
            }
        }
    }

    /// Complete a composite whose children are all built.
    fn finish(
        &mut self,
        frame: Frame<'a>,
        is_root: bool,
    ) -> Result<Option<Arc<ConfigNode>>, ResolveError> {
        self.on_path.remove(frame.id);

        let empty = frame.built.is_empty();
        if self.filter.is_some() && empty && !is_root {
            tracing::debug!(id = %frame.id, "pruned: no matching leaves");
            self.memo.insert(frame.id.clone(), None);
            return Ok(None);
        }

        let node = Arc::new(
            ConfigNode::composite(frame.id.clone(), frame.built)
                .map_err(|e| invalid(frame.id, e))?,
        );
        // An empty filtered root is kept only because it is the root; it
        // would be pruned anywhere else.
        if self.filter.is_none() || !empty {
            self.memo.insert(frame.id.clone(), Some(Arc::clone(&node)));
        }
        Ok(Some(node))
    }
}
