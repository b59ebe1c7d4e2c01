/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::CloudAnchor;
use crate::WatcherId;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum LocateAnchorStatus {
    Located,
    AlreadyTracked,
    NotLocated,
    NotLocatedAnchorDoesNotExist,
}

/// Hints from the SDK about why it is not ready to create anchors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct UserFeedback {
    pub not_enough_motion: bool,
    pub motion_too_quick: bool,
    pub not_enough_features: bool,
}

impl fmt::Display for UserFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hints = [
            (self.not_enough_motion, "not enough motion"),
            (self.motion_too_quick, "motion too quick"),
            (self.not_enough_features, "not enough features"),
        ];
        let mut first = true;
        for (_, hint) in hints.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(hint)?;
            first = false;
        }
        Ok(())
    }
}

/// How much spatial data the session has gathered around the anchors being created.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SessionStatus {
    pub ready_for_create_progress: f32,
    pub recommended_for_create_progress: f32,
    pub user_feedback: UserFeedback,
}

impl SessionStatus {
    pub fn enough_data_for_saving(&self) -> bool {
        self.recommended_for_create_progress >= 1.0
    }
}

/// Format a fraction as a whole percentage, capped at three digits.
pub fn format_percent(fraction: f32) -> String {
    let percent = (fraction * 100.0).max(0.0).min(999.0);
    format!("{:.0}%", percent)
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feedback: {} - create ready = {}, recommend = {}",
            self.user_feedback,
            format_percent(self.ready_for_create_progress),
            format_percent(self.recommended_for_create_progress),
        )
    }
}

/// Events delivered by a cloud session to its listeners.
/// These may arrive on any thread.
#[derive(Clone, Debug)]
pub enum Event {
    /// A watcher resolved one anchor
    AnchorLocated {
        watcher: WatcherId,
        status: LocateAnchorStatus,
        identifier: String,
        anchor: Option<CloudAnchor>,
    },
    /// A watcher has no more results
    LocateAnchorsCompleted { watcher: WatcherId, cancelled: bool },
    /// The session gathered more spatial data
    SessionUpdated(SessionStatus),
    /// Out-of-band SDK error (network, authentication, ...)
    Error { code: i32, message: String },
    /// SDK diagnostic message
    LogDebug(String),
}

pub trait EventCallback: 'static + Send + Sync {
    fn callback(&self, event: &Event);
}

type Listeners = Mutex<Vec<(u64, Arc<dyn EventCallback>)>>;

/// Backend-side bookkeeping of session listeners.
///
/// Events are dispatched to a copy of the listener list, so a listener may
/// subscribe, unsubscribe or call back into the session while handling one.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Arc<Listeners>,
    next_id: Arc<Mutex<u64>>,
}

impl ListenerSet {
    pub fn new() -> ListenerSet {
        ListenerSet::default()
    }

    pub fn subscribe(&self, callback: Arc<dyn EventCallback>) -> Subscription {
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next_id += 1;
            *next_id
        };
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn dispatch(&self, event: &Event) {
        let listeners: Vec<Arc<dyn EventCallback>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener.callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
