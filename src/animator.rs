//! Listening indicator
//!
//! While listening, four dots pulse with random sizes; otherwise they rest
//! at the base size. Purely cosmetic.

use rand::Rng;
use tokio::task::JoinHandle;

use crate::config::AnimatorConfig;

/// Number of dots in the indicator
pub const DOT_COUNT: usize = 4;

/// Dot magnitudes, one per dot
pub type ActivityLevels = [u32; DOT_COUNT];

/// Produces indicator frames on a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct ActivityAnimator {
    config: AnimatorConfig,
}

impl ActivityAnimator {
    #[must_use]
    pub const fn new(config: AnimatorConfig) -> Self {
        Self { config }
    }

    /// Levels shown while not listening
    #[must_use]
    pub const fn resting(&self) -> ActivityLevels {
        [self.config.base; DOT_COUNT]
    }

    /// One random frame: base plus jitter in `0..jitter` per dot
    #[must_use]
    pub fn frame<R: Rng + ?Sized>(&self, rng: &mut R) -> ActivityLevels {
        let mut levels = self.resting();
        if self.config.jitter > 0 {
            for level in &mut levels {
                *level += rng.gen_range(0..self.config.jitter);
            }
        }
        levels
    }

    /// Start emitting frames to `on_frame` every interval
    ///
    /// Frames stop when the returned `Animation` is dropped.
    #[must_use]
    pub fn start<F>(&self, on_frame: F) -> Animation
    where
        F: Fn(ActivityLevels) + Send + 'static,
    {
        let animator = *self;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(animator.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let levels = animator.frame(&mut rand::thread_rng());
                on_frame(levels);
            }
        });

        tracing::trace!("indicator animation started");
        Animation { task }
    }
}

/// A running animation; aborts its timer task on drop
#[derive(Debug)]
pub struct Animation {
    task: JoinHandle<()>,
}

impl Drop for Animation {
    fn drop(&mut self) {
        self.task.abort();
        tracing::trace!("indicator animation stopped");
    }
}
