/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

/// Traits to be implemented by AR platform backends
use crate::AnchorHandle;
use crate::AnchorPose;
use crate::CameraPose;
use crate::Error;
use crate::HitResult;
use crate::MarkerColor;
use crate::TrackingState;
use crate::Viewport;

use euclid::Point2D;

/// The AR platform session (ARCore, ARKit, Windows Mixed Reality, ...).
///
/// Anchor handles returned by `create_anchor` belong to the caller
/// until they are passed back to `release_anchor`.
pub trait ArPlatform: 'static + Send + Sync {
    fn camera_tracking_state(&self) -> TrackingState;

    /// The current camera pose, if the platform has one.
    fn camera_pose(&self) -> Option<CameraPose>;

    /// Hit test the current frame at a screen point, nearest hit first.
    fn hit_test(&self, point: Point2D<f32, Viewport>) -> Vec<HitResult>;

    fn create_anchor(&self, pose: AnchorPose) -> Result<AnchorHandle, Error>;

    fn anchor_tracking_state(&self, anchor: AnchorHandle) -> TrackingState;

    fn anchor_pose(&self, anchor: AnchorHandle) -> Option<AnchorPose>;

    fn release_anchor(&self, anchor: AnchorHandle);
}

/// Draws the marker cube for one anchor.
pub trait MarkerRenderer {
    fn draw_marker(&mut self, pose: AnchorPose, color: MarkerColor);
}
