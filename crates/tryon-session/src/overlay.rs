//! Overlay renderer glue: applies the smoothed transform to the active model.

use crate::loader::SceneAsset;
use serde::Serialize;
use std::sync::Arc;
use tryon_core::{Transform, Vec3, Viewport};

/// A fully loaded model ready to display.
#[derive(Debug, Clone)]
pub struct ActiveModel {
    pub id: String,
    pub base_scale: f32,
    pub asset: Arc<SceneAsset>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Copy)]
pub struct OverlayFrame<'a> {
    pub viewport: Viewport,
    /// The video is shown mirrored (front camera).
    pub mirrored: bool,
    /// Latest smoothed transform, if a face has ever been solved this session.
    pub transform: Option<&'a Transform>,
    /// A face is currently tracked.
    pub face_visible: bool,
    pub model: Option<&'a ActiveModel>,
}

/// Consumes per-frame overlay state. Implementations draw; the session never
/// waits on them.
pub trait OverlayRenderer: Send {
    fn present(&mut self, frame: &OverlayFrame<'_>);
}

/// Placement of the model in the scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelNode {
    pub model_id: String,
    pub position: Vec3,
    /// Solved scale times the model's base scale.
    pub scale: f32,
    pub rotation: Vec3,
    pub visible: bool,
}

/// Scene-graph overlay holding a single model node.
#[derive(Debug, Default)]
pub struct SceneOverlay {
    node: Option<ModelNode>,
    mirrored: bool,
    frames: u64,
}

impl SceneOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Option<&ModelNode> {
        self.node.as_ref()
    }

    pub fn mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }
}

impl OverlayRenderer for SceneOverlay {
    fn present(&mut self, frame: &OverlayFrame<'_>) {
        self.frames += 1;
        self.mirrored = frame.mirrored;

        // No active model: hide the existing node but keep it for the next swap.
        let Some(model) = frame.model else {
            if let Some(node) = self.node.as_mut() {
                node.visible = false;
            }
            return;
        };

        if self.node.as_ref().map(|n| n.model_id.as_str()) != Some(model.id.as_str()) {
            tracing::debug!(model = %model.id, nodes = model.asset.nodes, "overlay model swapped");
            self.node = Some(ModelNode {
                model_id: model.id.clone(),
                position: Vec3::ZERO,
                scale: model.base_scale,
                rotation: Vec3::ZERO,
                visible: false,
            });
        }

        if let Some(node) = self.node.as_mut() {
            match frame.transform {
                Some(t) => {
                    node.position = t.position;
                    node.scale = t.scale * model.base_scale;
                    node.rotation = t.rotation;
                    node.visible = frame.face_visible;
                }
                None => node.visible = false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::AssetFormat;
    use std::path::PathBuf;

    fn model(id: &str, base_scale: f32) -> ActiveModel {
        ActiveModel {
            id: id.into(),
            base_scale,
            asset: Arc::new(SceneAsset {
                path: PathBuf::from(format!("{id}.glb")),
                format: AssetFormat::Glb,
                generator: None,
                nodes: 1,
                meshes: 1,
                bytes: 0,
            }),
        }
    }

    fn frame<'a>(
        transform: Option<&'a Transform>,
        face_visible: bool,
        model: Option<&'a ActiveModel>,
    ) -> OverlayFrame<'a> {
        OverlayFrame {
            viewport: Viewport::new(640.0, 480.0),
            mirrored: true,
            transform,
            face_visible,
            model,
        }
    }

    #[test]
    fn test_node_follows_transform_with_base_scale() {
        let mut overlay = SceneOverlay::new();
        let m = model("aviator", 0.5);
        let t = Transform {
            position: Vec3::new(10.0, -5.0, 0.0),
            scale: 1.6,
            rotation: Vec3::new(0.1, 0.2, 0.3),
        };
        overlay.present(&frame(Some(&t), true, Some(&m)));

        let node = overlay.node().unwrap();
        assert_eq!(node.model_id, "aviator");
        assert_eq!(node.position, t.position);
        assert!((node.scale - 0.8).abs() < 1e-6);
        assert_eq!(node.rotation, t.rotation);
        assert!(node.visible);
        assert!(overlay.mirrored());
    }

    #[test]
    fn test_hidden_without_face() {
        let mut overlay = SceneOverlay::new();
        let m = model("aviator", 1.0);
        let t = Transform::default();
        overlay.present(&frame(Some(&t), true, Some(&m)));
        overlay.present(&frame(Some(&t), false, Some(&m)));
        assert!(!overlay.node().unwrap().visible);
    }

    #[test]
    fn test_swap_only_when_new_model_is_given() {
        let mut overlay = SceneOverlay::new();
        let a = model("a", 1.0);
        let b = model("b", 1.0);
        let t = Transform::default();

        overlay.present(&frame(Some(&t), true, Some(&a)));
        overlay.present(&frame(Some(&t), true, Some(&a)));
        assert_eq!(overlay.node().unwrap().model_id, "a");

        overlay.present(&frame(Some(&t), true, Some(&b)));
        assert_eq!(overlay.node().unwrap().model_id, "b");
        assert_eq!(overlay.frames_presented(), 3);
    }

    #[test]
    fn test_no_model_keeps_nothing_visible() {
        let mut overlay = SceneOverlay::new();
        let t = Transform::default();
        overlay.present(&frame(Some(&t), true, None));
        assert!(overlay.node().is_none());
    }

    #[test]
    fn test_model_cleared_hides_node() {
        let mut overlay = SceneOverlay::new();
        let m = model("aviator", 1.0);
        let t = Transform::default();
        overlay.present(&frame(Some(&t), true, Some(&m)));
        assert!(overlay.node().unwrap().visible);

        overlay.present(&frame(Some(&t), true, None));
        let node = overlay.node().unwrap();
        assert_eq!(node.model_id, "aviator");
        assert!(!node.visible);
    }
}
