//! Engine: scheduler plus world, wired from an [`EngineConfig`].

use crate::config::EngineConfig;
use crate::error::EngineResult;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strata_core::CancellableThreadScheduler;
use strata_world::{ChunkStore, FileChunkStore, MemoryChunkStore, World, WorldContext};
use tracing::info;

/// How long the main loop sleeps between queue pumps.
const PUMP_INTERVAL: Duration = Duration::from_millis(5);

/// A running world with its scheduler.
///
/// Create it on the thread that will pump the main-thread queue.
pub struct Engine {
    scheduler: Arc<CancellableThreadScheduler>,
    world: Arc<World>,
}

impl Engine {
    /// Builds the scheduler and opens the world. Worlds with a `save_dir`
    /// are backed by a [`FileChunkStore`], the rest live in memory.
    ///
    /// # Errors
    ///
    /// Scheduler start-up or world open failures.
    pub fn open(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let scheduler = Arc::new(CancellableThreadScheduler::new(config.scheduler.clone())?);
        let store: Arc<dyn ChunkStore> = match &config.world.save_dir {
            Some(dir) => Arc::new(FileChunkStore::new(dir)),
            None => Arc::new(MemoryChunkStore::new()),
        };
        let ctx = WorldContext::new(Arc::clone(&scheduler))
            .with_store(store)
            .with_ticker(config.ticker.clone());
        let world = World::open(ctx, config.world.clone())?;
        Ok(Self { scheduler, world })
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<CancellableThreadScheduler> {
        &self.scheduler
    }

    /// Loads the spawn area, starts the ticker and pumps the main-thread
    /// queue until `duration` elapses (forever when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker cannot start.
    pub fn run(&self, duration: Option<Duration>) -> EngineResult<()> {
        self.world.load_spawn_area();
        self.world.start_ticker()?;
        info!(chunks = self.world.chunk_count(), "engine running");

        let start = Instant::now();
        while duration.map_or(true, |d| start.elapsed() < d) {
            self.scheduler.run_sync_tasks();
            thread::sleep(PUMP_INTERVAL);
        }
        Ok(())
    }

    /// Saves, unloads and stops every thread.
    pub fn shutdown(self) {
        self.world.shutdown();
        let stats = self.world.ticker().stats();
        self.scheduler.shutdown();
        info!(
            ticks = stats.total_ticks,
            late = stats.late_ticks,
            tasks = self.scheduler.stats().completed,
            "engine stopped"
        );
    }
}
