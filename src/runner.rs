//! Per-user run supersession: a new run for a user aborts the one still in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineOutput, PipelineRequest};

pub struct PipelineRunner {
    pipeline: Arc<Pipeline>,
    inflight: Mutex<HashMap<String, (u64, AbortHandle)>>,
    generation: AtomicU64,
}

impl PipelineRunner {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            inflight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, (u64, AbortHandle)>> {
        self.inflight.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run for `user_id`, aborting any earlier run for the same user. The aborted
    /// caller gets [`PipelineError::Superseded`]. Dropping the returned future aborts
    /// the run and frees the user's slot.
    pub async fn run_for(
        &self,
        user_id: &str,
        req: PipelineRequest,
    ) -> Result<PipelineOutput, PipelineError> {
        let pipeline = self.pipeline.clone();
        let handle = tokio::spawn(async move { pipeline.run(req).await });
        let gen = self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some((_, previous)) = self
            .slots()
            .insert(user_id.to_string(), (gen, handle.abort_handle()))
        {
            tracing::info!(target: "pipeline", user = %user_id, "superseding in-flight run");
            previous.abort();
        }

        let guard = RunGuard {
            runner: self,
            user_id,
            gen,
            abort: handle.abort_handle(),
        };
        let joined = handle.await;
        drop(guard);

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(PipelineError::Superseded {
                user_id: user_id.to_string(),
            }),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// Run without supersession (no user context).
    pub async fn run_once(&self, req: PipelineRequest) -> Result<PipelineOutput, PipelineError> {
        self.pipeline.run(req).await
    }

    /// Number of users with a run in flight.
    pub fn in_flight(&self) -> usize {
        self.slots().len()
    }
}

/// Ties a spawned run to its caller: on drop the task is aborted (a no-op once it has
/// finished) and the user's slot is released if it still belongs to this run.
struct RunGuard<'a> {
    runner: &'a PipelineRunner,
    user_id: &'a str,
    gen: u64,
    abort: AbortHandle,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.abort.abort();
        let mut slots = self.runner.slots();
        if slots.get(self.user_id).is_some_and(|(g, _)| *g == self.gen) {
            slots.remove(self.user_id);
        }
    }
}
