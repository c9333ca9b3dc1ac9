#![warn(missing_docs)]

//! Internal B-rep model types for the dcad interchange codec.
//!
//! The [`Model`] is the unit produced by import and consumed by export:
//! bodies own faces, faces own their surface and bounding loops, edges own
//! their curves. Mutation is confined to the build phase; once a `Model` is
//! returned to the caller the codec treats it as read-only.
//!
//! The module also carries the small cross-cutting pieces every reader and
//! writer shares: the [`Warnings`] accumulator, the cooperative
//! [`CancelToken`], and the monotone [`ProgressReporter`].

use dcad_math::{Point3, Tolerance};
use dcad_nurbs::{NurbsCurve, NurbsSurface};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An RGB color with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red component.
    pub r: f64,
    /// Green component.
    pub g: f64,
    /// Blue component.
    pub b: f64,
}

impl Color {
    /// Create a color, clamping each component into [0, 1].
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Componentwise comparison within `eps`.
    pub fn close_to(&self, other: &Color, eps: f64) -> bool {
        (self.r - other.r).abs() <= eps
            && (self.g - other.g).abs() <= eps
            && (self.b - other.b).abs() <= eps
    }
}

impl Default for Color {
    /// Neutral gray used when a file carries no presentation data.
    fn default() -> Self {
        Self {
            r: 0.7,
            g: 0.7,
            b: 0.7,
        }
    }
}

/// An oriented edge: endpoints, optional underlying curve, direction flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Start point of the underlying curve.
    pub start: Point3,
    /// End point of the underlying curve.
    pub end: Point3,
    /// Underlying curve geometry; `None` for a straight chord.
    pub curve: Option<NurbsCurve>,
    /// True when the edge participates in its loop start-to-end.
    pub forward: bool,
}

impl Edge {
    /// A straight edge between two points.
    pub fn segment(start: Point3, end: Point3) -> Self {
        Self {
            start,
            end,
            curve: Some(NurbsCurve::line_segment(start, end)),
            forward: true,
        }
    }

    /// First point in loop order (start unless reversed).
    pub fn first_point(&self) -> Point3 {
        if self.forward {
            self.start
        } else {
            self.end
        }
    }

    /// Last point in loop order.
    pub fn last_point(&self) -> Point3 {
        if self.forward {
            self.end
        } else {
            self.start
        }
    }
}

/// An ordered ring of edges whose endpoints chain modulo orientation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loop {
    /// Edges in traversal order.
    pub edges: Vec<Edge>,
}

impl Loop {
    /// Create a loop from edges.
    pub fn new(edges: Vec<Edge>) -> Self {
        Self { edges }
    }

    /// Largest endpoint gap between consecutive edges (including the wrap
    /// from last to first). Zero for empty or single-edge loops.
    pub fn max_gap(&self) -> f64 {
        if self.edges.len() < 2 {
            return 0.0;
        }
        let mut worst: f64 = 0.0;
        for i in 0..self.edges.len() {
            let next = (i + 1) % self.edges.len();
            let gap = (self.edges[i].last_point() - self.edges[next].first_point()).norm();
            worst = worst.max(gap);
        }
        worst
    }

    /// True when every consecutive pair of edges meets within `tol`.
    pub fn is_closed(&self, tol: &Tolerance) -> bool {
        self.max_gap() < tol.linear
    }
}

/// A face: one outer loop, inner loops for holes, an underlying surface,
/// and the flag relating loop orientation to the surface normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Outer bounding loop.
    pub outer: Loop,
    /// Inner loops (holes).
    pub inner: Vec<Loop>,
    /// Underlying surface geometry.
    pub surface: NurbsSurface,
    /// True when loop orientation agrees with the surface normal.
    pub same_sense: bool,
    /// Display color.
    pub color: Color,
}

impl Face {
    /// A face covering the whole surface with no explicit bounds.
    pub fn unbounded(surface: NurbsSurface) -> Self {
        Self {
            outer: Loop::default(),
            inner: Vec::new(),
            surface,
            same_sense: true,
            color: Color::default(),
        }
    }
}

/// A named body: ordered faces plus the solid/open-shell distinction.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Body name.
    pub name: String,
    /// Faces in file order.
    pub faces: Vec<Face>,
    /// True for a closed manifold solid, false for an open shell model.
    pub is_solid: bool,
    /// Display color.
    pub color: Color,
}

impl Body {
    /// An empty open body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            faces: Vec::new(),
            is_solid: false,
            color: Color::default(),
        }
    }
}

/// The unit of interchange: a named, ordered set of bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Bodies in file order.
    pub bodies: Vec<Body>,
}

impl Model {
    /// An empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bodies: Vec::new(),
        }
    }

    /// Total face count across all bodies.
    pub fn face_count(&self) -> usize {
        self.bodies.iter().map(|b| b.faces.len()).sum()
    }
}

/// Accumulator for recoverable per-record and per-field problems.
///
/// Each message is also emitted through `tracing::warn!` so embedding
/// applications see them without polling.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    messages: Vec<String>,
}

impl Warnings {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "dcad", "{message}");
        self.messages.push(message);
    }

    /// All recorded messages, in order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of recorded warnings.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Move all messages out of the accumulator.
    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// Cooperative cancellation flag, checked between logical records.
///
/// Clones share the same flag, so the caller keeps one and hands the other
/// to the codec.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that never cancels until [`CancelToken::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Callback invoked with percent complete in [0, 100].
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Wraps an optional progress callback and enforces that reported percent
/// never decreases.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sink: Option<ProgressFn>,
    last: f32,
}

impl ProgressReporter {
    /// A reporter forwarding to `sink`.
    pub fn new(sink: Option<ProgressFn>) -> Self {
        Self { sink, last: 0.0 }
    }

    /// Report `percent` complete; values below the previous report are
    /// clamped up so the sequence is monotone non-decreasing.
    pub fn report(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0).max(self.last);
        self.last = percent;
        if let Some(sink) = &self.sink {
            sink(percent);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcad_math::Vec3;

    #[test]
    fn test_color_clamps() {
        let c = Color::new(1.5, -0.2, 0.5);
        assert_eq!(c.r, 1.0);
        assert_eq!(c.g, 0.0);
        assert!(c.close_to(&Color::new(1.0, 0.0, 0.5), 1e-12));
    }

    #[test]
    fn test_edge_orientation_swaps_endpoints() {
        let mut e = Edge::segment(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        assert_eq!(e.first_point(), Point3::origin());
        e.forward = false;
        assert_eq!(e.first_point(), Point3::new(1.0, 0.0, 0.0));
        assert_eq!(e.last_point(), Point3::origin());
    }

    #[test]
    fn test_loop_closure() {
        let a = Point3::origin();
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let ring = Loop::new(vec![
            Edge::segment(a, b),
            Edge::segment(b, c),
            Edge::segment(c, a),
        ]);
        assert!(ring.is_closed(&Tolerance::DEFAULT));

        let broken = Loop::new(vec![
            Edge::segment(a, b),
            Edge::segment(b + Vec3::new(0.0, 0.0, 0.5), c),
        ]);
        assert!(!broken.is_closed(&Tolerance::DEFAULT));
        assert!(broken.max_gap() >= 0.5);
    }

    #[test]
    fn test_reversed_edges_still_chain() {
        let a = Point3::origin();
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        // Middle edge stored end-to-start but flagged reversed.
        let mut mid = Edge::segment(c, b);
        mid.forward = false;
        let ring = Loop::new(vec![
            Edge::segment(a, b),
            mid,
            Edge::segment(c, a),
        ]);
        assert!(ring.is_closed(&Tolerance::DEFAULT));
    }

    #[test]
    fn test_progress_monotone() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p: f32| seen.lock().unwrap().push(p)) as ProgressFn
        };
        let mut progress = ProgressReporter::new(Some(sink));
        progress.report(10.0);
        progress.report(5.0);
        progress.report(50.0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[10.0, 10.0, 50.0]);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
