#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

pub const DEFAULT_MIN_ROWS_FOR_PARALLEL: usize = 16_384;
pub const DEFAULT_CHUNK_ROWS: usize = 4_096;

/// Controls when the merge kernels fan out across worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelConfig {
    pub enabled: bool,
    /// Output sizes below this run on the calling thread.
    pub min_rows_for_parallel: usize,
    /// Output rows handled by one worker slice (merge-path partition, gather chunk).
    pub chunk_rows: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rows_for_parallel: DEFAULT_MIN_ROWS_FOR_PARALLEL,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

impl ParallelConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub(crate) fn slice_rows(&self) -> usize {
        self.chunk_rows.max(1)
    }

    /// Slice size rounded up to a whole number of validity words.
    pub(crate) fn word_aligned_slice_rows(&self) -> usize {
        let words = self.slice_rows().div_ceil(crate::bitmap::WORD_BITS);
        words * crate::bitmap::WORD_BITS
    }

    /// The thread pool to run an operation over `rows` output rows on, if it should fan out.
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    pub(crate) fn pool_for(&self, rows: usize) -> Option<&'static ThreadPool> {
        if !self.enabled || rows < self.min_rows_for_parallel {
            return None;
        }
        rayon_pool()
    }
}

/// Best-effort Rayon thread pool for the merge kernels.
///
/// Rayon normally uses a **global** thread pool; global pool initialization can fail under
/// resource pressure and Rayon panics on first use. The crate builds its own pool instead and
/// falls back to sequential kernels when no pool can be created.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static RAYON_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn desired_rayon_threads() -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    from_env.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_rayon_pool() -> Option<ThreadPool> {
    let requested = desired_rayon_threads().max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|idx| format!("columnar-merge-{idx}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(err) if requested > 1 => {
            log::warn!("failed to build {requested}-thread merge pool ({err}); retrying with 1");
            try_build(1).ok()
        }
        Err(err) => {
            log::warn!("failed to build merge thread pool ({err}); kernels run sequentially");
            None
        }
    }
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn rayon_pool() -> Option<&'static ThreadPool> {
    RAYON_POOL.get_or_init(build_rayon_pool).as_ref()
}
