use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Records the level of every event emitted while installed.
#[derive(Clone, Default)]
pub(crate) struct LevelCapture(Arc<Mutex<Vec<Level>>>);

impl LevelCapture {
    /// Install as the thread's default subscriber until the guard drops
    pub(crate) fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub(crate) fn levels(&self) -> Vec<Level> {
        self.0.lock().map(|levels| levels.clone()).unwrap_or_default()
    }

    pub(crate) fn contains(&self, level: Level) -> bool {
        self.levels().contains(&level)
    }
}

impl<S: Subscriber> Layer<S> for LevelCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if let Ok(mut levels) = self.0.lock() {
            levels.push(*event.metadata().level());
        }
    }
}
