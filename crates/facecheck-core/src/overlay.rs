//! Map face boxes from image space into a preview view.

use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Project `face` onto a view showing the image with fill-center scaling.
///
/// `mirrored` flips horizontally, as front camera previews are displayed.
/// Returns `None` for an empty image.
pub fn project_to_view(
    face: &BoundingBox,
    image_size: (f32, f32),
    view_size: (f32, f32),
    mirrored: bool,
) -> Option<ViewRect> {
    let (img_w, img_h) = image_size;
    let (view_w, view_h) = view_size;
    if img_w <= 0.0 || img_h <= 0.0 {
        return None;
    }

    let (left, right) = if mirrored {
        (img_w - face.right(), img_w - face.x)
    } else {
        (face.x, face.right())
    };

    let scale = (view_w / img_w).max(view_h / img_h);
    let offset_x = (view_w - img_w * scale) / 2.0;
    let offset_y = (view_h - img_h * scale) / 2.0;

    Some(ViewRect {
        left: left * scale + offset_x,
        top: face.y * scale + offset_y,
        right: right * scale + offset_x,
        bottom: face.bottom() * scale + offset_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_projection() {
        let face = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        let r = project_to_view(&face, (100.0, 100.0), (100.0, 100.0), false).unwrap();
        assert_eq!(r, ViewRect { left: 10.0, top: 20.0, right: 40.0, bottom: 60.0 });
    }

    #[test]
    fn test_mirrored_projection() {
        let face = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        let r = project_to_view(&face, (100.0, 100.0), (100.0, 100.0), true).unwrap();
        assert_eq!(r.left, 60.0);
        assert_eq!(r.right, 90.0);
    }

    #[test]
    fn test_fill_center_crops_wider_axis() {
        // 480x640 portrait image shown in a 1080x1080 view: scale by width 2.25
        let face = BoundingBox::new(0.0, 0.0, 480.0, 640.0);
        let r = project_to_view(&face, (480.0, 640.0), (1080.0, 1080.0), false).unwrap();
        assert!((r.left - 0.0).abs() < 1e-3);
        assert!((r.right - 1080.0).abs() < 1e-3);
        // 640 * 2.25 = 1440, offset -180
        assert!((r.top + 180.0).abs() < 1e-3);
        assert!((r.bottom - 1260.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_image() {
        let face = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(project_to_view(&face, (0.0, 0.0), (100.0, 100.0), false).is_none());
    }
}
