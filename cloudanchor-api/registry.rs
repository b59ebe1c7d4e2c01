/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::AnchorHandle;
use crate::CloudAnchor;
use crate::LocalAnchor;

use std::collections::HashMap;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The key of the anchor that has been placed but not saved yet.
pub const PENDING: &str = "";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum MarkerColor {
    Ready,
    Saved,
    Found,
    Failed,
    Hidden,
}

impl MarkerColor {
    /// The RGB color of the marker, or `None` if it is not drawn.
    pub fn rgb(self) -> Option<[f32; 3]> {
        match self {
            MarkerColor::Ready => Some([0.0, 0.0, 1.0]),
            MarkerColor::Saved => Some([0.0, 1.0, 0.0]),
            MarkerColor::Found => Some([1.0, 1.0, 0.0]),
            MarkerColor::Failed => Some([1.0, 0.0, 0.0]),
            MarkerColor::Hidden => None,
        }
    }

    pub fn is_visible(self) -> bool {
        self != MarkerColor::Hidden
    }
}

/// The visual feedback for one anchor.
#[derive(Debug)]
pub struct AnchorVisual {
    pub identifier: String,
    pub local_anchor: LocalAnchor,
    pub cloud_anchor: Option<CloudAnchor>,
    pub color: MarkerColor,
}

impl AnchorVisual {
    /// A freshly placed anchor, not saved yet.
    pub fn pending(local_anchor: LocalAnchor) -> AnchorVisual {
        AnchorVisual {
            identifier: PENDING.into(),
            local_anchor,
            cloud_anchor: None,
            color: MarkerColor::Ready,
        }
    }

    /// An anchor reported by a watcher.
    pub fn found(local_anchor: LocalAnchor, cloud_anchor: CloudAnchor) -> AnchorVisual {
        AnchorVisual {
            identifier: cloud_anchor.identifier.clone(),
            local_anchor,
            cloud_anchor: Some(cloud_anchor),
            color: MarkerColor::Found,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.identifier.is_empty()
    }
}

/// What the renderer needs to know about a visual, copied out of the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSnapshot {
    pub identifier: String,
    pub anchor: AnchorHandle,
    pub color: MarkerColor,
}

/// Anchor visuals keyed by cloud identifier, with the empty key reserved
/// for the one anchor that has not been saved yet.
///
/// The registry itself does no locking; the controller keeps it behind the
/// same mutex as the demo step. Visuals that leave the registry are handed
/// back to the caller, so that their platform anchors are released once the
/// lock has been dropped.
#[derive(Debug, Default)]
pub struct AnchorVisualRegistry {
    visuals: HashMap<String, AnchorVisual>,
}

impl AnchorVisualRegistry {
    pub fn new() -> AnchorVisualRegistry {
        AnchorVisualRegistry::default()
    }

    /// Insert a visual under its identifier, returning the visual it replaced.
    pub fn upsert(&mut self, visual: AnchorVisual) -> Option<AnchorVisual> {
        self.visuals.insert(visual.identifier.clone(), visual)
    }

    pub fn remove(&mut self, identifier: &str) -> Option<AnchorVisual> {
        self.visuals.remove(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&AnchorVisual> {
        self.visuals.get(identifier)
    }

    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut AnchorVisual> {
        self.visuals.get_mut(identifier)
    }

    pub fn pending(&self) -> Option<&AnchorVisual> {
        self.get(PENDING)
    }

    pub fn pending_mut(&mut self) -> Option<&mut AnchorVisual> {
        self.get_mut(PENDING)
    }

    /// Move the pending visual under the identifier of its saved cloud anchor.
    ///
    /// Returns the visual previously stored under that identifier, if any.
    /// Nothing changes when there is no pending visual or the identifier is empty.
    pub fn rekey_pending(
        &mut self,
        saved: CloudAnchor,
        color: MarkerColor,
    ) -> Result<Option<AnchorVisual>, CloudAnchor> {
        if saved.identifier.is_empty() {
            return Err(saved);
        }
        let mut visual = match self.visuals.remove(PENDING) {
            Some(visual) => visual,
            None => return Err(saved),
        };
        visual.identifier = saved.identifier.clone();
        visual.cloud_anchor = Some(saved);
        visual.color = color;
        Ok(self.upsert(visual))
    }

    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&AnchorVisual),
    {
        for visual in self.visuals.values() {
            visitor(visual)
        }
    }

    /// The visible markers, for drawing outside the lock.
    pub fn snapshot(&self) -> Vec<MarkerSnapshot> {
        self.visuals
            .values()
            .filter(|visual| visual.color.is_visible())
            .map(|visual| MarkerSnapshot {
                identifier: visual.identifier.clone(),
                anchor: visual.local_anchor.handle(),
                color: visual.color,
            })
            .collect()
    }

    /// Saved cloud anchors, in identifier order.
    pub fn cloud_anchors(&self) -> Vec<CloudAnchor> {
        let mut anchors: Vec<CloudAnchor> = self
            .visuals
            .values()
            .filter_map(|visual| visual.cloud_anchor.clone())
            .filter(|anchor| anchor.is_saved())
            .collect();
        anchors.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        anchors
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    /// Empty the registry, handing back every visual.
    pub fn drain(&mut self) -> Vec<AnchorVisual> {
        self.visuals.drain().map(|(_, visual)| visual).collect()
    }
}
