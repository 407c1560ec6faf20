//! Incremental render updates.
//!
//! Charting surfaces redraw cheaply when told only what changed. A
//! [`RenderBridge`] remembers the last points it pushed to a [`ChartSink`],
//! sends an append or a last-point replacement when that covers the change,
//! and falls back to a full reset when the sink rejects the incremental
//! update.

use super::SeriesPoint;

/// A change to push to a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesUpdate {
    /// A new point after the current last one.
    Append(SeriesPoint),
    /// New values for the current last point.
    ReplaceLast(SeriesPoint),
    /// Redraw everything.
    Reset(Vec<SeriesPoint>),
}

impl SeriesUpdate {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Append(_) => "append",
            Self::ReplaceLast(_) => "replace_last",
            Self::Reset(_) => "reset",
        }
    }
}

/// Error from a chart sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The sink refused the update.
    #[error("chart rejected update: {0}")]
    Rejected(String),
}

/// A rendering surface that accepts series updates.
#[cfg_attr(test, mockall::automock)]
pub trait ChartSink: Send {
    /// Apply one update.
    ///
    /// # Errors
    ///
    /// Returns `RenderError` if the surface cannot apply the update.
    fn apply(&mut self, update: &SeriesUpdate) -> Result<(), RenderError>;
}

/// Smallest update turning `previous` into `current`.
///
/// Returns `None` when nothing changed.
#[must_use]
pub fn plan_update(previous: &[SeriesPoint], current: &[SeriesPoint]) -> Option<SeriesUpdate> {
    if previous == current {
        return None;
    }
    let (Some(prev_last), Some(cur_last)) = (previous.last(), current.last()) else {
        return Some(SeriesUpdate::Reset(current.to_vec()));
    };

    let prev_len = previous.len();
    if current.len() == prev_len
        && cur_last.time() == prev_last.time()
        && current[..prev_len - 1] == previous[..prev_len - 1]
    {
        return Some(SeriesUpdate::ReplaceLast(cur_last.clone()));
    }
    if current.len() == prev_len + 1 && current[..prev_len] == *previous {
        return Some(SeriesUpdate::Append(cur_last.clone()));
    }
    Some(SeriesUpdate::Reset(current.to_vec()))
}

/// How a render call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Nothing changed.
    Unchanged,
    /// An append or replace was applied.
    Incremental,
    /// A reset was applied.
    FullRender,
    /// The incremental update failed and a reset was applied instead.
    Recovered,
}

/// Keeps a chart sink in step with successive series snapshots.
#[derive(Debug)]
pub struct RenderBridge<S> {
    sink: S,
    rendered: Vec<SeriesPoint>,
    synced: bool,
}

impl<S: ChartSink> RenderBridge<S> {
    /// Wrap a sink. The first render is always a full reset.
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            rendered: Vec::new(),
            synced: false,
        }
    }

    /// Push `points` to the sink.
    ///
    /// # Errors
    ///
    /// Returns `RenderError` only when even the full reset is rejected; the
    /// next call then starts from a reset again.
    pub fn render(&mut self, points: Vec<SeriesPoint>) -> Result<RenderOutcome, RenderError> {
        if !self.synced {
            return self.reset(points).map(|()| RenderOutcome::FullRender);
        }

        let Some(update) = plan_update(&self.rendered, &points) else {
            return Ok(RenderOutcome::Unchanged);
        };
        if matches!(update, SeriesUpdate::Reset(_)) {
            return self.reset(points).map(|()| RenderOutcome::FullRender);
        }

        match self.sink.apply(&update) {
            Ok(()) => {
                self.rendered = points;
                Ok(RenderOutcome::Incremental)
            }
            Err(err) => {
                tracing::warn!(
                    update = update.as_str(),
                    error = %err,
                    "Incremental chart update failed, redrawing"
                );
                self.reset(points).map(|()| RenderOutcome::Recovered)
            }
        }
    }

    /// Force the next render to be a full reset.
    pub fn invalidate(&mut self) {
        self.synced = false;
    }

    /// Points last accepted by the sink.
    #[must_use]
    pub fn rendered(&self) -> &[SeriesPoint] {
        &self.rendered
    }

    /// The wrapped sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    fn reset(&mut self, points: Vec<SeriesPoint>) -> Result<(), RenderError> {
        let update = SeriesUpdate::Reset(points);
        if let Err(err) = self.sink.apply(&update) {
            self.synced = false;
            self.rendered.clear();
            return Err(err);
        }
        if let SeriesUpdate::Reset(points) = update {
            self.rendered = points;
        }
        self.synced = true;
        Ok(())
    }
}
