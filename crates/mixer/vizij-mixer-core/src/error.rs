//! Error types for the mixer.

use std::fmt;

use thiserror::Error;

use crate::graph::GraphError;
use crate::ids::SourceId;

/// Failures that indicate caller error or a broken pose graph.
///
/// Policy rejections (exit-time gating, full layers) are not errors; they are
/// reported through [`crate::PlayStatus`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixerError {
    #[error("source {id} is not registered in layer {layer}")]
    UnknownSource { id: SourceId, layer: usize },
    #[error("layer {layer} does not exist ({count} layers)")]
    LayerOutOfRange { layer: usize, count: usize },
    #[error("layer limit of {max} reached")]
    LayerLimit { max: usize },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Teardown that hit at least one graph failure.
///
/// Teardown carries on past failures, so `graph` holds whatever could be
/// released; `error` is the first failure seen.
#[derive(Debug)]
pub struct ShutdownError<G> {
    pub graph: G,
    pub error: MixerError,
}

impl<G> fmt::Display for ShutdownError<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mixer shutdown incomplete: {}", self.error)
    }
}

impl<G: fmt::Debug> std::error::Error for ShutdownError<G> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Record `result`'s error unless an earlier one is already kept.
pub(crate) fn keep_first<E: Into<MixerError>>(first: &mut Option<MixerError>, result: Result<(), E>) {
    if let Err(err) = result {
        first.get_or_insert(err.into());
    }
}
