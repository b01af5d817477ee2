//! Fragment registry.
//!
//! The [`FragmentRegistry`] is the directory of fragment types for one
//! document. It finds fragment nodes in the tree, wraps the ones whose type
//! is registered, remembers the ones whose type is not (so registering the
//! type later promotes them), and tears wrappers down when their nodes leave
//! the document.
//!
//! ## Example
//!
//! ```
//! # use tessera::{Document, FragmentKind, FragmentRegistry, RuntimeConfig, VNode};
//! # use std::sync::Arc;
//! struct Plain;
//!
//! #[async_trait::async_trait]
//! impl FragmentKind for Plain {
//!     fn type_id(&self) -> &str {
//!         "text/plain"
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tessera::Result<()> {
//! let document = Document::from_vnode(
//!     &VNode::element("body").with_child(
//!         VNode::element("x-fragment")
//!             .with_attribute("type", "text/plain")
//!             .with_text("hello"),
//!     ),
//! )?;
//! let registry = FragmentRegistry::new(document, RuntimeConfig::default());
//! registry.register_type(Arc::new(Plain))?;
//! registry.discover_all()?;
//! registry.mark_types_installed();
//! registry.settle().await;
//!
//! let fragment = registry.find("x-fragment".try_into()?)?.unwrap();
//! assert_eq!(fragment.raw()?, "hello");
//! assert!(fragment.is_loaded());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use handle_trait::Handle;
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info_span, trace, warn};

use crate::{
    Result,
    cache::RenderCache,
    config::RuntimeConfig,
    context::{FragmentFailure, RuntimeContext},
    dom::{Document, MutationCallback, MutationKind, MutationRecord, NodeId, ObserveOptions, ObserverId, VNode},
    fragment::{Fragment, FragmentKind},
    load::LoadScheduler,
};

mod errors;
mod query;

pub use errors::RegistryError;
pub use query::{Query, Selector};

/// Options for [`FragmentRegistry::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Set the automation flag on the new node.
    pub auto: bool,
    /// Where to append the node; the document root when `None`.
    pub parent: Option<NodeId>,
    pub class: Option<String>,
}

/// Outcome of setting up one node.
enum Setup {
    Existing(Fragment),
    Created(Fragment),
    Unknown,
    NotAFragment,
}

#[derive(Default)]
struct RegistryState {
    types: HashMap<String, Arc<dyn FragmentKind>>,
    /// Nodes seen with an unregistered type, in discovery order.
    unknown: HashMap<String, Vec<NodeId>>,
    structure_observer: Option<ObserverId>,
}

impl RegistryState {
    fn remember_unknown(&mut self, type_id: &str, node: NodeId) {
        let nodes = self.unknown.entry(type_id.to_string()).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }

    fn forget_unknown(&mut self, node: NodeId) {
        self.unknown.retain(|_, nodes| {
            nodes.retain(|n| *n != node);
            !nodes.is_empty()
        });
    }
}

struct RegistryInner {
    document: Document,
    runtime: Arc<RuntimeContext>,
    loads: LoadScheduler,
    state: Mutex<RegistryState>,
}

/// Directory of fragment types for one document.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Handle)]
pub struct FragmentRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for FragmentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("FragmentRegistry")
            .field("document", &self.inner.document)
            .field("types", &state.types.keys().collect::<Vec<_>>())
            .field("unknown", &state.unknown)
            .field("runtime", &self.inner.runtime)
            .finish()
    }
}

impl FragmentRegistry {
    /// Create a registry without a render cache.
    pub fn new(document: Document, config: RuntimeConfig) -> Self {
        Self::build(document, config, None)
    }

    /// Create a registry that reuses renders through `cache`.
    pub fn with_cache(document: Document, config: RuntimeConfig, cache: Arc<dyn RenderCache>) -> Self {
        Self::build(document, config, Some(cache))
    }

    fn build(document: Document, config: RuntimeConfig, cache: Option<Arc<dyn RenderCache>>) -> Self {
        let loads = LoadScheduler::new(config.require_types_installed);
        Self {
            inner: Arc::new(RegistryInner {
                document,
                runtime: Arc::new(RuntimeContext::new(config, cache)),
                loads,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.runtime.config
    }

    // === Types ===

    /// Register the implementation of a fragment type.
    ///
    /// Nodes of that type seen earlier are wrapped now and one load pass is
    /// scheduled for them. Returns the promoted fragments.
    ///
    /// Registering a type id twice is logged at error level and changes
    /// nothing: the first implementation stays, no node is promoted and no
    /// pass is scheduled. The returned [`RegistryError::DuplicateType`] only
    /// reports that no-op, so callers may ignore it.
    pub fn register_type(&self, kind: Arc<dyn FragmentKind>) -> Result<Vec<Fragment>> {
        let type_id = kind.type_id().to_string();
        let pending = {
            let mut state = self.state();
            if state.types.contains_key(&type_id) {
                error!(type_id, "Fragment type is already registered; keeping the existing implementation");
                return Err(RegistryError::DuplicateType { type_id }.into());
            }
            state.types.insert(type_id.clone(), kind);
            state.unknown.remove(&type_id).unwrap_or_default()
        };
        debug!(type_id, pending = pending.len(), "Registered fragment type");

        let mut promoted = Vec::new();
        for node in pending {
            if !self.inner.document.is_connected(node) {
                continue;
            }
            match self.setup(node) {
                Ok(Setup::Created(fragment)) => promoted.push(fragment),
                Ok(_) => {}
                Err(e) => warn!(node = %node, error = %e, "Failed to promote fragment"),
            }
        }
        if !promoted.is_empty() {
            debug!(type_id, count = promoted.len(), "Promoted unknown fragments");
            self.schedule_load_pass();
        }
        Ok(promoted)
    }

    /// Remove a type. Its fragments are unloaded and their nodes remembered
    /// as unknown, so registering the type again brings them back.
    pub fn unregister_type(&self, type_id: &str) -> Option<Arc<dyn FragmentKind>> {
        let kind = self.state().types.remove(type_id)?;
        let fragments: Vec<Fragment> = self
            .inner
            .runtime
            .links
            .ordered()
            .into_iter()
            .filter(|f| f.type_id() == type_id)
            .collect();
        debug!(type_id, fragments = fragments.len(), "Unregistering fragment type");
        for fragment in fragments {
            fragment.unload();
            self.state().remember_unknown(type_id, fragment.node());
        }
        Some(kind)
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.state().types.contains_key(type_id)
    }

    /// Registered type ids, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.state().types.keys().cloned().collect();
        types.sort();
        types
    }

    /// Nodes waiting for `type_id` to be registered, in discovery order.
    pub fn unknown_nodes(&self, type_id: &str) -> Vec<NodeId> {
        self.state()
            .unknown
            .get(type_id)
            .cloned()
            .unwrap_or_default()
    }

    // === Discovery ===

    /// Declared type of a fragment node, `None` for anything else.
    fn fragment_type(&self, node: NodeId) -> Option<String> {
        let config = &self.inner.runtime.config;
        let doc = &self.inner.document;
        if doc.tag(node)? != config.fragment_tag {
            return None;
        }
        doc.attribute(node, &config.type_attribute)
    }

    fn fragment_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let config = &self.inner.runtime.config;
        self.inner.document.elements_matching(node, |tag, attributes| {
            tag == config.fragment_tag && attributes.iter().any(|(n, _)| *n == config.type_attribute)
        })
    }

    fn setup(&self, node: NodeId) -> Result<Setup> {
        if let Some(existing) = self.inner.runtime.links.get(node) {
            return Ok(Setup::Existing(existing));
        }
        let Some(type_id) = self.fragment_type(node) else {
            return Ok(Setup::NotAFragment);
        };
        let kind = {
            let mut state = self.state();
            match state.types.get(&type_id) {
                Some(kind) => kind.clone(),
                None => {
                    trace!(node = %node, type_id, "Recording fragment of unknown type");
                    state.remember_unknown(&type_id, node);
                    return Ok(Setup::Unknown);
                }
            }
        };

        let fragment = Fragment::new(
            self.inner.document.handle(),
            node,
            kind.clone(),
            self.inner.runtime.clone(),
        )?;
        if let Some(existing) = self.inner.runtime.links.insert_if_absent(fragment.handle()) {
            fragment.unload();
            return Ok(Setup::Existing(existing));
        }
        kind.on_constructed(&fragment);
        debug!(fragment = %fragment.id(), node = %node, type_id, "Fragment set up");
        Ok(Setup::Created(fragment))
    }

    /// Wrap `node` if it is a fragment of a registered type.
    ///
    /// Idempotent: a node that already has a wrapper returns it. Nodes of an
    /// unregistered type are remembered and yield `None`.
    pub fn setup_node(&self, node: NodeId) -> Result<Option<Fragment>> {
        Ok(match self.setup(node)? {
            Setup::Existing(fragment) | Setup::Created(fragment) => Some(fragment),
            Setup::Unknown | Setup::NotAFragment => None,
        })
    }

    /// Wrap every fragment node in the document and start following
    /// structural changes.
    ///
    /// Schedules one load pass. Safe to call more than once; the structural
    /// observer is installed only the first time.
    pub fn discover_all(&self) -> Result<Vec<Fragment>> {
        let root = self.inner.document.root();
        let mut fragments = Vec::new();
        for node in self.fragment_nodes(root) {
            match self.setup(node)? {
                Setup::Existing(fragment) | Setup::Created(fragment) => fragments.push(fragment),
                Setup::Unknown | Setup::NotAFragment => {}
            }
        }
        debug!(fragments = fragments.len(), "Initial discovery finished");
        self.install_structure_observer()?;
        self.schedule_load_pass();
        Ok(fragments)
    }

    fn install_structure_observer(&self) -> Result<()> {
        let mut state = self.state();
        if state.structure_observer.is_some() {
            return Ok(());
        }
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let callback: MutationCallback = Arc::new(move |records| {
            if let Some(inner) = weak.upgrade() {
                FragmentRegistry { inner }.on_structure_changed(records);
            }
        });
        let id = self.inner.document.observe(
            self.inner.document.root(),
            ObserveOptions::structure(),
            callback,
        )?;
        state.structure_observer = Some(id);
        Ok(())
    }

    fn on_structure_changed(&self, records: Vec<MutationRecord>) {
        let doc = &self.inner.document;
        let mut created = false;
        for record in records.iter().filter(|r| r.kind == MutationKind::ChildList) {
            for removed in &record.removed_nodes {
                for node in self.fragment_nodes(*removed) {
                    // Moved rather than removed.
                    if doc.is_connected(node) {
                        continue;
                    }
                    if let Some(fragment) = self.inner.runtime.links.get(node) {
                        fragment.unload();
                    }
                    self.state().forget_unknown(node);
                }
            }
            for added in &record.added_nodes {
                for node in self.fragment_nodes(*added) {
                    if !doc.is_connected(node) {
                        continue;
                    }
                    match self.setup(node) {
                        Ok(Setup::Created(_)) => created = true,
                        Ok(_) => {}
                        Err(e) => warn!(node = %node, error = %e, "Failed to set up added fragment"),
                    }
                }
            }
        }
        if created {
            self.schedule_load_pass();
        }
    }

    // === Queries ===

    fn resolve(&self, query: &Query, ids: &mut HashSet<NodeId>) {
        let links = &self.inner.runtime.links;
        match query {
            Query::Selector(selector) => {
                let config = &self.inner.runtime.config;
                let nodes = self.inner.document.elements_matching(
                    self.inner.document.root(),
                    |tag, attributes| {
                        selector.matches(
                            tag,
                            attributes,
                            &config.fragment_id_attribute,
                            &config.class_attribute,
                        )
                    },
                );
                ids.extend(nodes.into_iter().filter(|n| links.get(*n).is_some()));
            }
            Query::Fragment(fragment) => {
                if links.get(fragment.node()).is_some_and(|f| f == *fragment) {
                    ids.insert(fragment.node());
                }
            }
            Query::Node(node) => {
                if links.get(*node).is_some() {
                    ids.insert(*node);
                }
            }
            Query::List(queries) => {
                for query in queries {
                    self.resolve(query, ids);
                }
            }
        }
    }

    /// Every wrapped fragment matching `query`, in discovery order.
    ///
    /// Nodes without a wrapper are skipped silently.
    pub fn find_all(&self, query: Query) -> Result<Vec<Fragment>> {
        let mut nodes = HashSet::new();
        self.resolve(&query, &mut nodes);
        Ok(self
            .inner
            .runtime
            .links
            .ordered()
            .into_iter()
            .filter(|f| nodes.contains(&f.node()))
            .collect())
    }

    /// The first wrapped fragment matching `query`.
    pub fn find(&self, query: Query) -> Result<Option<Fragment>> {
        Ok(self.find_all(query)?.into_iter().next())
    }

    /// The wrapper of `node`, if any.
    pub fn fragment(&self, node: NodeId) -> Option<Fragment> {
        self.inner.runtime.links.get(node)
    }

    /// Every wrapped fragment in discovery order.
    pub fn fragments(&self) -> Vec<Fragment> {
        self.inner.runtime.links.ordered()
    }

    // === Creation ===

    /// Build a new fragment node of a registered type and wrap it.
    pub fn create(&self, type_id: &str, raw: &str, options: CreateOptions) -> Result<Fragment> {
        if !self.is_registered(type_id) {
            return Err(RegistryError::UnknownType {
                type_id: type_id.to_string(),
            }
            .into());
        }
        let config = &self.inner.runtime.config;
        let mut vnode =
            VNode::element(config.fragment_tag.as_str()).with_attribute(config.type_attribute.as_str(), type_id);
        if options.auto {
            vnode = vnode.with_attribute(config.auto_attribute.as_str(), "true");
        }
        if let Some(class) = options.class {
            vnode = vnode.with_attribute(config.class_attribute.as_str(), class);
        }
        let vnode = vnode.with_text(raw);

        let doc = &self.inner.document;
        let node = doc.build(&vnode);
        doc.append_child(options.parent.unwrap_or_else(|| doc.root()), node)?;
        let fragment = match self.setup(node)? {
            Setup::Existing(fragment) | Setup::Created(fragment) => fragment,
            Setup::Unknown | Setup::NotAFragment => {
                return Err(RegistryError::UnknownType {
                    type_id: type_id.to_string(),
                }
                .into());
            }
        };
        debug!(fragment = %fragment.id(), type_id, "Created fragment");
        self.schedule_load_pass();
        Ok(fragment)
    }

    // === Loading ===

    /// Signal that every fragment type has been registered.
    ///
    /// Opens the load gate and schedules a pass for everything discovered so
    /// far. Later calls do nothing.
    pub fn mark_types_installed(&self) {
        if self.inner.loads.mark_installed() {
            debug!("Fragment types installed");
            self.schedule_load_pass();
        }
    }

    pub fn types_installed(&self) -> bool {
        self.inner.loads.is_installed()
    }

    /// Number of completed load passes.
    pub fn load_passes(&self) -> u64 {
        self.inner.loads.completed()
    }

    /// Run a load pass now. Returns the number of fragments loaded.
    pub async fn load_pass(&self) -> usize {
        let links = &self.inner.runtime.links;
        self.inner.loads.run_pass(|| links.ordered()).await
    }

    fn schedule_load_pass(&self) {
        if !self.inner.loads.is_installed() {
            trace!("Load pass deferred until fragment types are installed");
            return;
        }
        let registry = self.handle();
        self.inner.runtime.tasks.spawn(
            "load pass",
            async move {
                registry.load_pass().await;
            }
            .instrument(info_span!("scheduled_load")),
        );
    }

    /// Deliver pending mutations and wait for background work until the
    /// document is quiescent.
    pub async fn settle(&self) {
        loop {
            let delivered = self.inner.document.deliver_mutations();
            let tasks = self.inner.runtime.tasks.take();
            if delivered == 0 && tasks.is_empty() {
                break;
            }
            trace!(delivered, tasks = tasks.len(), "Settling");
            for task in tasks {
                if let Err(e) = task.await {
                    error!(error = %e, "Background task failed");
                }
            }
        }
    }

    // === Failures ===

    /// Receive contained fragment failures from now on.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<FragmentFailure> {
        self.inner.runtime.subscribe_failures()
    }
}
