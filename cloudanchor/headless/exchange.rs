/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use cloudanchor_api::AnchorNumber;
use cloudanchor_api::CloudError;

use std::collections::HashMap;

/// Shared anchor identifiers, numbered in the order they were sent.
#[derive(Default)]
pub(crate) struct AnchorCache {
    keys: HashMap<u64, String>,
    last: Option<u64>,
}

impl AnchorCache {
    pub(crate) fn insert(&mut self, identifier: String) -> Result<u64, CloudError> {
        if identifier.trim().is_empty() {
            return Err(CloudError::Failed(400));
        }
        let number = match self.last {
            Some(last) if last < u64::MAX => last + 1,
            _ => 0,
        };
        self.keys.insert(number, identifier);
        self.last = Some(number);
        Ok(number)
    }

    pub(crate) fn get(&self, number: AnchorNumber) -> Option<String> {
        let number = match number {
            AnchorNumber::Last => self.last?,
            AnchorNumber::Number(number) => number,
        };
        self.keys.get(&number).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}
