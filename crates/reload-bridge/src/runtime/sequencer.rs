//! The import chain
//!
//! The module system imports units through a synchronous hook: it calls the
//! hook once per unit, in dependency order, and expects each call to return
//! before it issues the next. Fetching a unit is asynchronous, so the hook
//! cannot do the work itself. Instead every locator import is appended to a
//! single chain of steps and the hook reports success at once. Each step
//! waits for the one before it, so units evaluate in the order they were
//! imported no matter how quickly their fetches complete.
//!
//! Whoever started the burst of imports (the bootstrap orchestrator) calls
//! [`Sequencer::settle`] to wait for the chain to drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use reload_bridge_sdk::{Evaluator, HostError, Loader, NativeFn, Registry, Value};
use tracing::Instrument;

use crate::error::BridgeError;

type Step = Shared<BoxFuture<'static, ()>>;

/// Callback told whether a chained load succeeded
pub type StepCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// A single import issued by the module system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportRequest {
    /// Fetch and evaluate the unit at a locator, in chain order
    Locator(String),
    /// Source the module system already holds; evaluated immediately
    Inline(String),
}

impl ImportRequest {
    /// Interpret the `(url, opt_src_text)` arguments of the import hook
    ///
    /// Inline source wins when both are given.
    pub fn from_hook_args(args: &[Value]) -> Option<Self> {
        let text = |index: usize| {
            args.get(index)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        text(1)
            .map(ImportRequest::Inline)
            .or_else(|| text(0).map(ImportRequest::Locator))
    }
}

struct StepRecord {
    /// First step of the import burst this one belongs to
    ///
    /// A step appended by another step's evaluation shares that step's root;
    /// any other step is its own root.
    root: usize,
    done: Step,
}

/// Steps not yet finished, plus finished ones awaiting retirement
struct ChainState {
    tail: Step,
    /// Index of the front record
    base: usize,
    steps: VecDeque<StepRecord>,
}

impl ChainState {
    fn next_index(&self) -> usize {
        self.base + self.steps.len()
    }

    /// Drop the records of every step up to `index`, which have all finished
    fn retire(&mut self, index: usize) {
        while self.base <= index && self.steps.pop_front().is_some() {
            self.base += 1;
        }
    }

    /// Last step whose root precedes `cutoff`, if it comes after `awaited`
    fn last_rooted_before(&self, cutoff: usize, awaited: Option<usize>) -> Option<(usize, Step)> {
        self.steps
            .iter()
            .enumerate()
            .rev()
            .find(|(_, record)| record.root < cutoff)
            .map(|(offset, record)| (self.base + offset, record.done.clone()))
            .filter(|(index, _)| awaited.map_or(true, |a| *index > a))
    }
}

tokio::task_local! {
    /// `(chain, root)` of the step whose evaluation is being polled
    static CURRENT_ROOT: (usize, usize);
}

static NEXT_CHAIN_ID: AtomicUsize = AtomicUsize::new(0);

struct Inner {
    id: usize,
    loader: Arc<dyn Loader>,
    evaluator: Arc<dyn Evaluator>,
    registry: Registry,
    chain: Mutex<ChainState>,
    runtime: Option<tokio::runtime::Handle>,
}

impl Inner {
    fn chain(&self) -> MutexGuard<'_, ChainState> {
        self.chain.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Root for a step appended now
    ///
    /// Only code running inside one of this chain's steps inherits a root.
    /// Appends from other tasks, or made while a step is parked on its
    /// fetch, start a new burst.
    fn root_for(&self, index: usize) -> usize {
        CURRENT_ROOT
            .try_with(|&(chain, root)| (chain == self.id).then_some(root))
            .ok()
            .flatten()
            .unwrap_or(index)
    }

    async fn run_step(self: Arc<Self>, index: usize, root: usize, locator: String) -> bool {
        let result = CURRENT_ROOT
            .scope((self.id, root), self.loader.load(&locator))
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(%locator, step = index, "Queued import evaluated");
                true
            }
            Err(e) => {
                tracing::error!(%locator, step = index, error = %e, "Queued import failed");
                false
            }
        }
    }
}

/// Owner of one import chain
///
/// Cheap to clone; clones share the chain. The hooks published into the
/// registry hold weak references, so the chain lives as long as some
/// `Sequencer` handle does.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

impl Sequencer {
    /// Create an empty chain
    ///
    /// When built inside a tokio runtime, steps are spawned onto it and run
    /// without anyone awaiting them; otherwise they run when `settle` is
    /// awaited.
    pub fn new(loader: Arc<dyn Loader>, evaluator: Arc<dyn Evaluator>, registry: Registry) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed),
                loader,
                evaluator,
                registry,
                chain: Mutex::new(ChainState {
                    tail: future::ready(()).boxed().shared(),
                    base: 0,
                    steps: VecDeque::new(),
                }),
                runtime: tokio::runtime::Handle::try_current().ok(),
            }),
        }
    }

    /// Accept an import from the module system
    ///
    /// Inline source is evaluated before this returns. Locators are appended
    /// to the chain. Either way the module system is told the import was
    /// accepted; failures are logged and never reach it.
    pub fn enqueue(&self, request: ImportRequest) -> bool {
        match request {
            ImportRequest::Inline(source) => {
                if let Err(e) = self.inner.evaluator.evaluate(&source, &self.inner.registry) {
                    tracing::error!(error = %e, "Inline import failed");
                }
            }
            ImportRequest::Locator(locator) => {
                self.append(locator, None);
            }
        }
        true
    }

    /// Append a locator load whose outcome is reported to `on_done`
    pub fn enqueue_with_callback(&self, locator: impl Into<String>, on_done: StepCallback) {
        self.append(locator.into(), Some(on_done));
    }

    fn append(&self, locator: String, on_done: Option<StepCallback>) -> usize {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut chain = self.inner.chain();
        let index = chain.next_index();
        let root = self.inner.root_for(index);
        let previous = chain.tail.clone();

        tracing::debug!(%locator, step = index, root, "Import queued");
        let span = tracing::debug_span!("import_step", step = index, locator = %locator);

        let step: Step = async move {
            previous.await;
            let ok = match weak.upgrade() {
                Some(inner) => inner.run_step(index, root, locator).await,
                None => {
                    tracing::warn!(%locator, "Import chain dropped before step ran");
                    false
                }
            };
            if let Some(on_done) = on_done {
                on_done(ok);
            }
            if let Some(inner) = weak.upgrade() {
                inner.chain().retire(index);
            }
        }
        .instrument(span)
        .boxed()
        .shared();

        chain.tail = step.clone();
        chain.steps.push_back(StepRecord {
            root,
            done: step.clone(),
        });
        drop(chain);

        if let Some(runtime) = &self.inner.runtime {
            runtime.spawn(step);
        }
        index
    }

    /// Load a resource directly, outside the chain
    pub async fn load(&self, locator: &str) -> Result<(), BridgeError> {
        self.inner
            .loader
            .load(locator)
            .await
            .map_err(|e| BridgeError::load(locator, e))
    }

    /// Wait for every step appended so far
    ///
    /// Steps appended by an awaited step's evaluation (a unit importing more
    /// units) are awaited too. Steps appended by anyone else after this call
    /// are not, even while an awaited step is still fetching.
    pub fn settle(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let cutoff = inner.chain().next_index();

        async move {
            let mut awaited = None;
            loop {
                let next = inner.chain().last_rooted_before(cutoff, awaited);
                let Some((index, done)) = next else {
                    break;
                };
                done.await;
                awaited = Some(index);
            }
        }
    }

    /// Number of steps appended over the chain's life
    pub fn queued(&self) -> usize {
        self.inner.chain().next_index()
    }

    /// Number of step records still held
    pub fn pending(&self) -> usize {
        self.inner.chain().steps.len()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The import hook handed to the module system
    pub fn import_hook(&self) -> NativeFn {
        let weak = Arc::downgrade(&self.inner);
        NativeFn::new("import_script", move |args| {
            let Some(inner) = weak.upgrade() else {
                tracing::warn!("Import hook called after its chain was dropped");
                return Ok(Value::Bool(false));
            };
            if let Some(request) = ImportRequest::from_hook_args(args) {
                Sequencer { inner }.enqueue(request);
            }
            Ok(Value::Bool(true))
        })
    }

    /// The reload import hook: `(uri, callback)`, reporting the outcome
    pub fn reload_hook(&self) -> NativeFn {
        let weak = Arc::downgrade(&self.inner);
        NativeFn::new("reload_import_script", move |args| {
            let uri = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| HostError::InvalidArgument("reload import needs a uri".to_string()))?
                .to_string();
            let callback = args.get(1).and_then(Value::as_function).cloned();

            let Some(inner) = weak.upgrade() else {
                tracing::warn!(%uri, "Reload hook called after its chain was dropped");
                if let Some(callback) = callback {
                    callback.call(&[Value::Bool(false)])?;
                }
                return Ok(Value::Null);
            };

            Sequencer { inner }.enqueue_with_callback(
                uri,
                Box::new(move |ok| {
                    if let Some(callback) = callback {
                        if let Err(e) = callback.call(&[Value::Bool(ok)]) {
                            tracing::error!(error = %e, "Reload callback failed");
                        }
                    }
                }),
            );
            Ok(Value::Null)
        })
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("queued", &self.queued())
            .finish()
    }
}
