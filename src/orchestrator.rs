//! Pass orchestration: find image nodes, generate once, rewrite everywhere.
//!
//! [`ImageOrchestrator`] owns the [`TimedCache`] and the [`WorkQueue`] and
//! ties them together for each document handed to
//! [`process_content`](ImageOrchestrator::process_content):
//!
//! ```text
//! document ──► image nodes ──► resolve src ──► cache hit? ──► overlay now
//!                                                │
//!                                                └─ miss ──► pending this pass? ──► wait with it
//!                                                                 │
//!                                                                 └─ no ──► submit job
//! ```
//!
//! All jobs for a pass are submitted before any of them is awaited, so
//! distinct sources generate concurrently up to the queue's limit. Jobs see
//! only the source path and options; nodes are mutated solely by the
//! calling thread once a job's result is back, and every node that waited
//! on the job receives the same attributes.
//!
//! ## Deduplication
//!
//! Two nodes referencing the same resolved source within one pass share a
//! single job. That bookkeeping lives for the duration of one call. Across
//! passes and documents, reuse comes from the cache alone, which is what
//! lets an expired entry be regenerated.
//!
//! ## Failures
//!
//! Per-image problems (unresolvable path, unsupported type, transcoder
//! error or panic) never abort a pass. The node is left exactly as it was
//! and the pass context collects
//! `Failed to process image {src}: {detail}`. Only setup failures and a
//! document without a root `type` propagate as errors.

use crate::cache::{
    CacheError, CacheKey, Clock, MemoryStore, ProcessStats, SystemClock, TimedCache,
};
use crate::config::{ConfigError, PluginConfig, ProcessOptions};
use crate::document::{Node, NodePath};
use crate::imaging::{GenerateError, VariantGenerator};
use crate::naming::is_remote_src;
use crate::queue::{JobHandle, QueueError, WorkQueue};
use crate::responsive::ProcessedAttributes;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("cannot create output directory {}: {source}", path.display())]
    DirectorySetup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot resolve {}: {source}", path.display())]
    Resolution {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// One per-image failure collected during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
}

impl ErrorRecord {
    fn for_image(src: &str, err: &OrchestratorError) -> Self {
        Self {
            message: format!("Failed to process image {src}: {err}"),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Per-document context supplied by the host.
#[derive(Debug, Clone)]
pub struct PassContext {
    /// Root that `/`-prefixed sources resolve against.
    pub resource_path: PathBuf,
    /// The document being processed; relative sources resolve against its
    /// directory.
    pub current_file: PathBuf,
    pub errors: Vec<ErrorRecord>,
}

impl PassContext {
    pub fn new(resource_path: impl Into<PathBuf>, current_file: impl Into<PathBuf>) -> Self {
        Self {
            resource_path: resource_path.into(),
            current_file: current_file.into(),
            errors: Vec::new(),
        }
    }

    fn record(&mut self, src: &str, err: &OrchestratorError) {
        warn!("{src}: {err}");
        self.errors.push(ErrorRecord::for_image(src, err));
    }
}

type SharedCache = Arc<Mutex<TimedCache<Arc<ProcessedAttributes>>>>;
type JobOutcome = Result<Arc<ProcessedAttributes>, OrchestratorError>;

fn lock(cache: &SharedCache) -> MutexGuard<'_, TimedCache<Arc<ProcessedAttributes>>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A job in flight this pass and the nodes waiting on it.
///
/// The first waiter is the node that caused the submission.
struct PendingJob {
    handle: JobHandle<JobOutcome>,
    waiters: Vec<(NodePath, String)>,
}

/// Jobs submitted during one `process_content` call, in submission order.
#[derive(Default)]
struct PendingSet {
    jobs: Vec<PendingJob>,
    by_key: HashMap<String, usize>,
}

impl PendingSet {
    /// Attach a node to an existing job for `key`. False if there is none.
    fn join(&mut self, key: &CacheKey, path: &NodePath, src: &str) -> bool {
        match self.by_key.get(key.as_str()) {
            Some(&idx) => {
                self.jobs[idx].waiters.push((path.clone(), src.to_string()));
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: CacheKey, handle: JobHandle<JobOutcome>, path: NodePath, src: &str) {
        self.by_key.insert(key.as_str().to_string(), self.jobs.len());
        self.jobs.push(PendingJob {
            handle,
            waiters: vec![(path, src.to_string())],
        });
    }
}

/// Resolve a document `src` to a canonical path on disk.
///
/// A leading `/` means "relative to the resource root"; anything else is
/// relative to the directory holding the current document.
pub fn resolve_source(src: &str, ctx: &PassContext) -> Result<PathBuf, OrchestratorError> {
    let joined = match src.strip_prefix('/') {
        Some(rest) => ctx.resource_path.join(rest),
        None => ctx
            .current_file
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(src),
    };
    joined
        .canonicalize()
        .map_err(|source| OrchestratorError::Resolution {
            path: joined,
            source,
        })
}

/// Merge processed attributes into a node, keeping that node's own `src`
/// as `originalSrc`.
fn apply(node: &mut Node, processed: &ProcessedAttributes, src: &str) {
    node.overlay_attrs(processed.attrs_with_src(src));
}

/// Rewrites image nodes with responsive attributes.
pub struct ImageOrchestrator {
    options: ProcessOptions,
    fingerprint: String,
    generator: Arc<dyn VariantGenerator>,
    cache: SharedCache,
    queue: WorkQueue,
    stats: ProcessStats,
}

impl ImageOrchestrator {
    /// Validate `config` and build the cache and queue.
    pub fn new(
        config: &PluginConfig,
        generator: Arc<dyn VariantGenerator>,
    ) -> Result<Self, OrchestratorError> {
        Self::with_clock(config, generator, Box::new(SystemClock))
    }

    /// Like [`new`](Self::new), with the cache reading time from `clock`.
    pub fn with_clock(
        config: &PluginConfig,
        generator: Arc<dyn VariantGenerator>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, OrchestratorError> {
        let options = config.resolve()?;
        let queue = WorkQueue::new(options.concurrency)?;
        let cache = TimedCache::with_store(MemoryStore::default(), options.cache_ttl, clock);
        debug!(
            "orchestrator ready: {} format(s), {} size(s), concurrency {}, ttl {:?}",
            options.formats.len(),
            options.sizes.len(),
            options.concurrency,
            options.cache_ttl
        );
        Ok(Self {
            fingerprint: options.fingerprint(),
            options,
            generator,
            cache: Arc::new(Mutex::new(cache)),
            queue,
            stats: ProcessStats::default(),
        })
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Create the output directory, including missing parents.
    pub fn before_collect(&self) -> Result<(), OrchestratorError> {
        let dir = &self.options.output_dir;
        std::fs::create_dir_all(dir).map_err(|source| OrchestratorError::DirectorySetup {
            path: dir.clone(),
            source,
        })?;
        info!("output directory ready: {}", dir.display());
        Ok(())
    }

    /// Process every image node in `doc`.
    ///
    /// Returns the counts for this pass; they are also added to the
    /// cumulative [`stats`](Self::stats).
    pub fn process_content(
        &mut self,
        doc: &mut Node,
        ctx: &mut PassContext,
    ) -> Result<ProcessStats, OrchestratorError> {
        if doc.node_type.trim().is_empty() {
            return Err(OrchestratorError::MalformedDocument(
                "root node has no type".into(),
            ));
        }

        let paths = doc.image_paths();
        debug!(
            "{}: {} image node(s)",
            ctx.current_file.display(),
            paths.len()
        );

        let mut stats = ProcessStats::default();
        let mut pending = PendingSet::default();

        for path in paths {
            let Some(src) = doc
                .node_at(&path)
                .and_then(Node::image_src)
                .map(str::to_string)
            else {
                continue;
            };

            if is_remote_src(&src) {
                debug!("skipping remote source {src}");
                stats.skipped += 1;
                continue;
            }

            let source = match resolve_source(&src, ctx) {
                Ok(source) => source,
                Err(e) => {
                    ctx.record(&src, &e);
                    stats.failed += 1;
                    continue;
                }
            };
            let key = CacheKey::new(&source, &self.fingerprint);

            let cached = lock(&self.cache).get(key.as_str());
            if let Some(processed) = cached {
                debug!("cache hit: {src}");
                if let Some(node) = doc.node_at_mut(&path) {
                    apply(node, &processed, &src);
                }
                stats.cached += 1;
                continue;
            }

            if pending.join(&key, &path, &src) {
                debug!("joining in-flight job: {src}");
                continue;
            }

            debug!("cache miss, submitting: {src}");
            let handle = self.submit(&source, &key, &src);
            pending.insert(key, handle, path, &src);
        }

        for job in pending.jobs {
            let outcome = job.handle.wait().map_err(OrchestratorError::from);
            match outcome.and_then(|r| r) {
                Ok(processed) => {
                    for (i, (path, src)) in job.waiters.iter().enumerate() {
                        if let Some(node) = doc.node_at_mut(path) {
                            apply(node, &processed, src);
                        }
                        if i == 0 {
                            stats.generated += 1;
                        } else {
                            stats.deduplicated += 1;
                        }
                    }
                }
                Err(e) => {
                    for (_, src) in &job.waiters {
                        ctx.record(src, &e);
                        stats.failed += 1;
                    }
                }
            }
        }

        info!("{}: {}", ctx.current_file.display(), stats);
        self.stats.absorb(&stats);
        Ok(stats)
    }

    fn submit(&self, source: &Path, key: &CacheKey, src: &str) -> JobHandle<JobOutcome> {
        let generator = Arc::clone(&self.generator);
        let cache = Arc::clone(&self.cache);
        let request = self.options.generate_request(source);
        let key = key.as_str().to_string();
        let src = src.to_string();

        self.queue.submit(move || -> JobOutcome {
            let generated = generator.generate(&request)?;
            debug!(
                "generated {} variant(s) for {}",
                generated.variants.len(),
                request.source.display()
            );
            let processed = Arc::new(ProcessedAttributes::from_generated(&generated, &src));
            lock(&cache).set(&key, Arc::clone(&processed))?;
            Ok(processed)
        })
    }

    /// Wait for outstanding work and report cumulative counts.
    pub fn after_collect(&self) -> ProcessStats {
        self.queue.drain();
        info!("image processing finished: {}", self.stats);
        self.stats
    }

    /// Number of live cache entries.
    pub fn cache_len(&self) -> usize {
        lock(&self.cache).size()
    }

    pub fn stats(&self) -> ProcessStats {
        self.stats
    }
}
