/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::AnchorPose;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Trackable {
    /// A detected plane. Only hits inside the plane's polygon can hold an anchor.
    Plane { pose_in_polygon: bool },
    /// A feature point. Only points with an estimated surface normal can hold an anchor.
    Point { oriented: bool },
}

impl Trackable {
    pub fn accepts_anchor(self) -> bool {
        match self {
            Trackable::Plane { pose_in_polygon } => pose_in_polygon,
            Trackable::Point { oriented } => oriented,
        }
    }
}

/// A single result of a screen-space hit test, nearest first.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct HitResult {
    pub pose: AnchorPose,
    pub trackable: Trackable,
}

/// The pose of the first hit that can hold an anchor.
pub fn first_anchorable<I>(hits: I) -> Option<AnchorPose>
where
    I: IntoIterator<Item = HitResult>,
{
    hits.into_iter()
        .find(|hit| hit.trackable.accepts_anchor())
        .map(|hit| hit.pose)
}
