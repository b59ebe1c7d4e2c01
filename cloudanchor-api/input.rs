/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::AnchorNumber;
use crate::Ray;
use crate::Viewport;

use euclid::Point2D;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A user selection that drives the demo forward.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Selection {
    /// A tap on the screen of a handheld device.
    Screen(Point2D<f32, Viewport>),
    /// An air tap on a headset, with the head gaze at the time of the tap.
    Gaze(Ray),
    /// A button press with no placement information.
    Advance,
    /// A shared anchor number typed in by the user.
    AnchorNumber(AnchorNumber),
}
