//! Snapshots of drawable state handed over to a render thread.

use crate::{fph, quantities::Pose};
use nalgebra::{Matrix4, Point3};
use parking_lot::Mutex;

/// What a [`Renderable`] depicts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderableKind {
    Solid,
    Static,
    MultibodyLink,
    /// A contact history, drawn from its points.
    ContactPoints,
    ForceField,
}

/// Identifiers a renderer uses to pick the geometry and look of an entity.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Appearance {
    pub geometry_id: Option<u32>,
    pub look_id: Option<u32>,
}

/// A drawable item in world space.
#[derive(Clone, Debug, PartialEq)]
pub struct Renderable {
    pub kind: RenderableKind,
    pub model_matrix: Matrix4<f32>,
    pub appearance: Appearance,
    /// Extra world space points, such as contact locations.
    pub points: Vec<Point3<f32>>,
}

/// The latest set of renderables, shared between the simulation thread
/// that publishes it and a render thread that copies it.
#[derive(Debug, Default)]
pub struct DrawingQueue {
    renderables: Mutex<Vec<Renderable>>,
}

impl Renderable {
    /// Creates a renderable placed at the given pose.
    pub fn new(kind: RenderableKind, pose: &Pose, appearance: Appearance) -> Self {
        Self {
            kind,
            model_matrix: pose.to_homogeneous().cast::<f32>(),
            appearance,
            points: Vec::new(),
        }
    }

    /// Creates a renderable consisting only of the given points.
    pub fn from_points(
        kind: RenderableKind,
        points: impl IntoIterator<Item = Point3<fph>>,
    ) -> Self {
        Self {
            kind,
            model_matrix: Matrix4::identity(),
            appearance: Appearance::default(),
            points: points.into_iter().map(|point| point.cast::<f32>()).collect(),
        }
    }
}

impl DrawingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the queued renderables with the given ones.
    pub fn publish(&self, renderables: impl IntoIterator<Item = Renderable>) {
        let mut queue = self.renderables.lock();
        queue.clear();
        queue.extend(renderables);
    }

    /// Copies the queued renderables into the given buffer, replacing its
    /// content. The lock is held only for the copy.
    pub fn copy_into(&self, buffer: &mut Vec<Renderable>) {
        let queue = self.renderables.lock();
        buffer.clone_from(&queue);
    }

    pub fn len(&self) -> usize {
        self.renderables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.renderables.lock().clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::Arc, thread};

    fn solid_at(x: fph) -> Renderable {
        Renderable::new(
            RenderableKind::Solid,
            &Pose::translation(x, 0.0, 0.0),
            Appearance::default(),
        )
    }

    #[test]
    fn model_matrix_holds_translation() {
        let renderable = solid_at(2.5);
        assert_eq!(renderable.model_matrix[(0, 3)], 2.5);
        assert_eq!(renderable.model_matrix[(3, 3)], 1.0);
    }

    #[test]
    fn publishing_replaces_previous_snapshot() {
        let queue = DrawingQueue::new();
        queue.publish([solid_at(0.0), solid_at(1.0)]);
        queue.publish([solid_at(2.0)]);
        let mut buffer = vec![solid_at(9.0); 4];
        queue.copy_into(&mut buffer);
        assert_eq!(buffer, vec![solid_at(2.0)]);
    }

    #[test]
    fn reader_thread_sees_whole_snapshots() {
        let queue = Arc::new(DrawingQueue::new());
        let reader_queue = Arc::clone(&queue);
        let reader = thread::spawn(move || {
            let mut buffer = Vec::new();
            for _ in 0..200 {
                reader_queue.copy_into(&mut buffer);
                assert!(buffer.is_empty() || buffer.len() == 3);
            }
        });
        for step in 0..200 {
            let x = fph::from(step);
            queue.publish([solid_at(x), solid_at(x + 1.0), solid_at(x + 2.0)]);
        }
        reader.join().unwrap();
    }
}
