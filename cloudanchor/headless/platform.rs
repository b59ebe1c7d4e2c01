/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use cloudanchor_api::AnchorHandle;
use cloudanchor_api::AnchorPose;
use cloudanchor_api::ArPlatform;
use cloudanchor_api::CameraPose;
use cloudanchor_api::Error;
use cloudanchor_api::HitResult;
use cloudanchor_api::MarkerColor;
use cloudanchor_api::MarkerRenderer;
use cloudanchor_api::Native;
use cloudanchor_api::TrackingState;
use cloudanchor_api::Viewport;

use euclid::{Point2D, Point3D, RigidTransform3D};

use log::warn;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An AR platform with no camera: the camera pose and hit results are
/// whatever the test last set.
pub struct HeadlessPlatform {
    data: Mutex<HeadlessPlatformData>,
}

struct HeadlessPlatformData {
    camera_tracking: TrackingState,
    camera_pose: Option<CameraPose>,
    hit_results: Vec<HitResult>,
    anchor_tracking: TrackingState,
    anchors: HashMap<AnchorHandle, AnchorPose>,
    next_anchor: u32,
    released: Vec<AnchorHandle>,
    double_releases: usize,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        HeadlessPlatform::new()
    }
}

impl HeadlessPlatform {
    pub fn new() -> HeadlessPlatform {
        HeadlessPlatform {
            data: Mutex::new(HeadlessPlatformData {
                camera_tracking: TrackingState::Tracking,
                camera_pose: Some(RigidTransform3D::identity()),
                hit_results: vec![],
                anchor_tracking: TrackingState::Tracking,
                anchors: HashMap::new(),
                next_anchor: 1,
                released: vec![],
                double_releases: 0,
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, HeadlessPlatformData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_camera_tracking_state(&self, state: TrackingState) {
        self.data().camera_tracking = state;
    }

    pub fn set_camera_pose(&self, pose: Option<CameraPose>) {
        self.data().camera_pose = pose;
    }

    /// The hits every following hit test returns, nearest first.
    pub fn set_hit_results(&self, hits: Vec<HitResult>) {
        self.data().hit_results = hits;
    }

    /// The tracking state reported for every anchor while the camera tracks.
    pub fn set_anchor_tracking_state(&self, state: TrackingState) {
        self.data().anchor_tracking = state;
    }

    /// Create an anchor on behalf of the cloud session, for a located anchor.
    pub(crate) fn adopt_anchor(&self, pose: AnchorPose) -> AnchorHandle {
        let mut data = self.data();
        let handle = AnchorHandle(data.next_anchor);
        data.next_anchor += 1;
        data.anchors.insert(handle, pose);
        handle
    }

    pub(crate) fn anchor_position(&self, anchor: AnchorHandle) -> Option<Point3D<f32, Native>> {
        self.data()
            .anchors
            .get(&anchor)
            .map(|pose| pose.translation.to_point())
    }

    /// Where the device is, for queries around it.
    pub(crate) fn camera_position(&self) -> Point3D<f32, Native> {
        self.data()
            .camera_pose
            .map_or_else(Point3D::origin, |pose| pose.translation.to_point())
    }

    pub fn live_anchors(&self) -> usize {
        self.data().anchors.len()
    }

    pub fn is_live(&self, anchor: AnchorHandle) -> bool {
        self.data().anchors.contains_key(&anchor)
    }

    /// Every handle released so far, in release order.
    pub fn released(&self) -> Vec<AnchorHandle> {
        self.data().released.clone()
    }

    /// How many times an unknown or already released handle was released.
    pub fn double_releases(&self) -> usize {
        self.data().double_releases
    }
}

impl ArPlatform for HeadlessPlatform {
    fn camera_tracking_state(&self) -> TrackingState {
        self.data().camera_tracking
    }

    fn camera_pose(&self) -> Option<CameraPose> {
        self.data().camera_pose
    }

    fn hit_test(&self, _: Point2D<f32, Viewport>) -> Vec<HitResult> {
        self.data().hit_results.clone()
    }

    fn create_anchor(&self, pose: AnchorPose) -> Result<AnchorHandle, Error> {
        let mut data = self.data();
        if data.camera_tracking != TrackingState::Tracking {
            return Err(Error::NotTracking);
        }
        let handle = AnchorHandle(data.next_anchor);
        data.next_anchor += 1;
        data.anchors.insert(handle, pose);
        Ok(handle)
    }

    fn anchor_tracking_state(&self, anchor: AnchorHandle) -> TrackingState {
        let data = self.data();
        if !data.anchors.contains_key(&anchor) {
            return TrackingState::Stopped;
        }
        match data.camera_tracking {
            TrackingState::Tracking => data.anchor_tracking,
            other => other,
        }
    }

    fn anchor_pose(&self, anchor: AnchorHandle) -> Option<AnchorPose> {
        self.data().anchors.get(&anchor).cloned()
    }

    fn release_anchor(&self, anchor: AnchorHandle) {
        let mut data = self.data();
        if data.anchors.remove(&anchor).is_none() {
            warn!("Released {:?}, which is not live", anchor);
            data.double_releases += 1;
        }
        data.released.push(anchor);
    }
}

/// A marker as the renderer was asked to draw it.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawnMarker {
    pub pose: AnchorPose,
    pub color: MarkerColor,
    pub rgb: [f32; 3],
}

/// Records the markers it is asked to draw.
#[derive(Default)]
pub struct HeadlessRenderer {
    pub markers: Vec<DrawnMarker>,
}

impl HeadlessRenderer {
    pub fn colors(&self) -> Vec<MarkerColor> {
        self.markers.iter().map(|marker| marker.color).collect()
    }
}

impl MarkerRenderer for HeadlessRenderer {
    fn draw_marker(&mut self, pose: AnchorPose, color: MarkerColor) {
        match color.rgb() {
            Some(rgb) => self.markers.push(DrawnMarker { pose, color, rgb }),
            None => warn!("Asked to draw a hidden marker"),
        }
    }
}
