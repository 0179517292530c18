use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::Monitor;
use crate::source::live::Receiver;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
    /// Hardware endpoint to probe, when one is configured.
    pub receiver: Option<Arc<dyn Receiver>>,
    /// Reported by the hardware check when falling back to the corpus.
    pub dataset_path: PathBuf,
}
