/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This crate uses `euclid`'s typed units, and exposes different coordinate spaces.

use euclid::Point3D;
use euclid::RigidTransform3D;
use euclid::Vector3D;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The native tracking space of the AR session.
/// All anchor and camera poses are expressed relative to it.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Native {}

/// The coordinate space of the camera (or the head, on a headset).
/// The camera looks down the negative z axis.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Viewer {}

/// The unnormalized screen coordinate space, where the display
/// is from (0,0) to (w,h), measured in pixels.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Viewport {}

/// The coordinate space of a single anchor.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Anchor {}

/// The pose of an anchor in native space.
pub type AnchorPose = RigidTransform3D<f32, Anchor, Native>;

/// The pose of the camera in native space.
pub type CameraPose = RigidTransform3D<f32, Viewer, Native>;

/// A gaze or pointer ray in native space.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Ray {
    pub origin: Point3D<f32, Native>,
    pub direction: Vector3D<f32, Native>,
}

impl Ray {
    /// The point `distance` units along the ray.
    /// A zero direction yields the origin.
    pub fn point_at(&self, distance: f32) -> Point3D<f32, Native> {
        let length = self.direction.length();
        if length <= f32::EPSILON {
            return self.origin;
        }
        self.origin + self.direction * (distance / length)
    }
}

/// An anchor pose with no rotation, positioned at `position`.
pub fn pose_at(position: Point3D<f32, Native>) -> AnchorPose {
    RigidTransform3D::from_translation(position.to_vector())
}

/// The point `distance` units in front of the camera.
pub fn in_front_of(camera: &CameraPose, distance: f32) -> Option<Point3D<f32, Native>> {
    camera
        .to_transform()
        .transform_point3d(Point3D::new(0.0, 0.0, -distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_point_is_normalized() {
        let ray = Ray {
            origin: Point3D::new(1.0, 2.0, 3.0),
            direction: Vector3D::new(0.0, 0.0, -4.0),
        };
        let point = ray.point_at(1.0);
        assert_eq!(point, Point3D::new(1.0, 2.0, 2.0));
    }

    #[test]
    fn degenerate_ray_stays_at_origin() {
        let ray = Ray {
            origin: Point3D::new(1.0, 0.0, 0.0),
            direction: Vector3D::zero(),
        };
        assert_eq!(ray.point_at(5.0), Point3D::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn one_unit_in_front_of_translated_camera() {
        let camera: CameraPose = RigidTransform3D::from_translation(Vector3D::new(0.0, 1.5, 0.0));
        let point = in_front_of(&camera, 1.0).expect("affine transform");
        assert!((point.x - 0.0).abs() < 1e-5);
        assert!((point.y - 1.5).abs() < 1e-5);
        assert!((point.z + 1.0).abs() < 1e-5);
    }
}
