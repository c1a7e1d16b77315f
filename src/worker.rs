use std::ops::Range;

/// A handle to a set of worker threads.
///
/// Passing `None` wherever an `Option<&Worker>` is accepted selects the
/// synchronous, single threaded path instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Worker {
    threads: usize,
}

impl Default for Worker {
    /// One thread per logical cpu
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Worker {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Splits `rows` into at most one contiguous band per thread, each band
    /// covering at least `min_rows` rows unless `rows` itself is shorter.
    /// Band sizes differ by at most one row.
    pub fn bands(&self, rows: Range<u32>, min_rows: u32) -> Vec<Range<u32>> {
        let count = rows.end.saturating_sub(rows.start);
        if count == 0 {
            return Vec::new();
        }

        let max_bands = (count / min_rows.max(1)).max(1);
        let n_bands = (self.threads as u32).min(max_bands);

        let base = count / n_bands;
        let extra = count % n_bands;

        let mut start = rows.start;
        (0..n_bands)
            .map(|i| {
                let len = base + u32::from(i < extra);
                let band = start..start + len;
                start += len;
                band
            })
            .collect()
    }

    /// Runs `f` once per job, each on its own scoped thread, and returns the
    /// results in job order. A panic in any job is resumed on the caller.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn execute<J, R, F>(&self, jobs: Vec<J>, f: F) -> Vec<R>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> R + Sync,
    {
        if jobs.len() <= 1 {
            return jobs.into_iter().map(f).collect();
        }

        let f = &f;
        let scoped = crossbeam_utils::thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .into_iter()
                .map(|job| scope.spawn(move |_| f(job)))
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        match scoped {
            Ok(results) => results,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Threads are not available, so every job runs on the caller
    #[cfg(target_arch = "wasm32")]
    pub fn execute<J, R, F>(&self, jobs: Vec<J>, f: F) -> Vec<R>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> R + Sync,
    {
        jobs.into_iter().map(f).collect()
    }
}
