/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Sharing anchors between devices: a saved identifier is published under a
//! short number, which another user types in to find the same anchor.

use crate::CompletionCallback;

use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Which shared anchor to look up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum AnchorNumber {
    /// Whatever was shared most recently.
    Last,
    Number(u64),
}

impl fmt::Display for AnchorNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AnchorNumber::Last => f.write_str("last"),
            AnchorNumber::Number(number) => write!(f, "{}", number),
        }
    }
}

/// A service mapping anchor numbers to cloud anchor identifiers.
pub trait AnchorExchange: 'static + Send + Sync {
    /// Publish `identifier`; the callback receives its number.
    fn send_anchor_async(&self, identifier: String, callback: Box<dyn CompletionCallback<u64>>);

    /// Look up a shared identifier. `Ok(None)` means nothing is stored
    /// under that number.
    fn retrieve_anchor_async(
        &self,
        number: AnchorNumber,
        callback: Box<dyn CompletionCallback<Option<String>>>,
    );
}
