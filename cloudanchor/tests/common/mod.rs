/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![allow(dead_code)]

use cloudanchor::headless::{HeadlessCloudService, HeadlessPlatform};
use cloudanchor_api::{
    AccountConfig, AnchorHandle, AnchorNumber, DemoConfig, DemoController, DemoMode, Error,
    Selection, StepKind, Workflow,
};

use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config() -> DemoConfig {
    DemoConfig::with_account(AccountConfig::new("account-id", "account-key"))
}

pub struct Harness {
    pub controller: DemoController,
    pub service: Arc<HeadlessCloudService>,
    pub platform: Arc<HeadlessPlatform>,
}

impl Harness {
    pub fn new(mode: DemoMode) -> Harness {
        Harness::with_config(mode, config())
    }

    pub fn with_config(mode: DemoMode, config: DemoConfig) -> Harness {
        init_logging();
        let platform = Arc::new(HeadlessPlatform::new());
        let service = Arc::new(HeadlessCloudService::new(platform.clone()));
        Harness::assemble(mode, config, platform, service)
    }

    /// A harness running `workflow` instead of one of the demo modes.
    pub fn with_workflow(workflow: Workflow) -> Harness {
        init_logging();
        let platform = Arc::new(HeadlessPlatform::new());
        let service = Arc::new(HeadlessCloudService::new(platform.clone()));
        let controller =
            DemoController::with_workflow(config(), workflow, platform.clone(), service.clone());
        Harness {
            controller,
            service,
            platform,
        }
    }

    pub fn threaded(mode: DemoMode) -> Harness {
        init_logging();
        let platform = Arc::new(HeadlessPlatform::new());
        let service = Arc::new(HeadlessCloudService::spawn(platform.clone()));
        Harness::assemble(mode, config(), platform, service)
    }

    fn assemble(
        mode: DemoMode,
        config: DemoConfig,
        platform: Arc<HeadlessPlatform>,
        service: Arc<HeadlessCloudService>,
    ) -> Harness {
        let controller = DemoController::with_anchor_exchange(
            config,
            platform.clone(),
            service.clone(),
            service.clone(),
        );
        controller.select_mode(mode).unwrap();
        Harness {
            controller,
            service,
            platform,
        }
    }

    pub fn tap(&self) {
        self.controller
            .handle_user_input(Selection::Advance)
            .unwrap_or_else(|err| {
                panic!(
                    "step {:?} failed: {}",
                    self.controller.current_step(),
                    err
                )
            });
    }

    pub fn enter_number(&self, number: AnchorNumber) -> Result<(), Error> {
        self.controller
            .handle_user_input(Selection::AnchorNumber(number))
    }

    /// Tap, letting the cloud answer in between, until the current step matches.
    pub fn tap_until<F>(&self, done: F)
    where
        F: Fn(&StepKind) -> bool,
    {
        for _ in 0..64 {
            match self.controller.current_step() {
                Some(ref step) if done(step) => return,
                _ => {}
            }
            self.tap();
            self.service.run_pending();
        }
        panic!("never reached the expected step");
    }

    pub fn tap_until_step(&self, kind: StepKind) {
        self.tap_until(|step| *step == kind)
    }

    pub fn handles(&self) -> Vec<AnchorHandle> {
        let mut handles = vec![];
        self.controller
            .for_each_visual(|visual| handles.push(visual.local_anchor.handle()));
        handles
    }
}
