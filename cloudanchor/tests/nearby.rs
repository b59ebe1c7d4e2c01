/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use common::{config, Harness};

use cloudanchor_api::{
    CloudError, DemoConfig, DemoMode, FailurePolicy, LocateQuery, MarkerColor, StepKind,
};

fn is_nearby_create(step: &StepKind) -> bool {
    matches!(step, StepKind::CreateNearbyAnchors { .. })
}

fn is_delete(step: &StepKind) -> bool {
    matches!(step, StepKind::DeleteFoundAnchors { .. })
}

/// Save `count` nearby anchors, then locate them from a fresh session.
fn locate_all(harness: &Harness, count: usize) -> Vec<String> {
    harness.tap_until(is_nearby_create);
    harness.service.set_recommended_progress(1.0);
    for saved in 1..=count {
        assert!(is_nearby_create(&harness.controller.current_step().unwrap()));
        harness.tap();
        harness.service.run_pending();
        assert_eq!(harness.controller.saved_identifiers().len(), saved);
    }
    assert_eq!(harness.controller.current_step(), Some(StepKind::StopSession));
    assert_eq!(harness.controller.visual_count(), count);

    harness.tap_until_step(StepKind::Locate(LocateQuery::LastSaved));
    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_count(), 1);
    assert!(matches!(
        harness.controller.current_step(),
        Some(StepKind::Locate(LocateQuery::NearFoundAnchor { .. }))
    ));

    harness.tap();
    assert!(harness.controller.is_async_op_in_progress());
    harness.service.run_pending();
    assert!(!harness.controller.is_async_op_in_progress());
    assert!(is_delete(&harness.controller.current_step().unwrap()));

    let mut saved = harness.controller.saved_identifiers();
    saved.sort();
    assert_eq!(harness.controller.visual_identifiers(), saved);
    saved
}

#[test]
fn nearby_demo_finds_every_saved_anchor() {
    let harness = Harness::new(DemoMode::Nearby);
    let saved = locate_all(&harness, 3);
    for identifier in &saved {
        assert_eq!(harness.controller.visual_color(identifier), Some(MarkerColor::Found));
    }
    // One watcher per query, each stopped before the next one started.
    let stats = harness.service.stats();
    assert_eq!(stats.watchers_created, 2);
    assert_eq!(stats.watchers_stopped, 1);
}

#[test]
fn delete_batch_converges_with_a_failure() {
    let harness = Harness::new(DemoMode::Nearby);
    let saved = locate_all(&harness, 3);
    harness.service.fail_delete(&saved[1], CloudError::ServiceUnavailable);

    harness.tap();
    assert!(harness.controller.is_async_op_in_progress());
    assert_eq!(harness.service.run_pending(), 3);

    assert!(!harness.controller.is_async_op_in_progress());
    assert_eq!(harness.controller.visual_identifiers(), vec![saved[1].clone()]);
    assert_eq!(harness.controller.visual_color(&saved[1]), Some(MarkerColor::Failed));
    assert_eq!(harness.controller.current_step(), Some(StepKind::Teardown));
    assert_eq!(harness.service.stats().anchors_deleted, 2);
    assert_eq!(harness.service.stats().watchers_stopped, 2);

    harness.tap();
    assert_eq!(harness.controller.step(), 0);
    assert_eq!(harness.controller.visual_count(), 0);
    assert_eq!(harness.platform.live_anchors(), 0);
    assert_eq!(harness.platform.double_releases(), 0);
}

#[test]
fn delete_failure_can_be_retried() {
    let config = DemoConfig {
        delete_failure: FailurePolicy::Retry,
        ..config()
    };
    let harness = Harness::with_config(DemoMode::Nearby, config);
    let saved = locate_all(&harness, 3);
    harness.service.fail_delete(&saved[0], CloudError::Failed(42));

    harness.tap();
    harness.service.run_pending();
    assert!(is_delete(&harness.controller.current_step().unwrap()));
    assert_eq!(harness.controller.visual_count(), 1);

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_count(), 0);
    assert_eq!(harness.controller.current_step(), Some(StepKind::Teardown));
}

#[test]
fn failed_nearby_save_stays_on_the_step() {
    let harness = Harness::new(DemoMode::Nearby);
    harness.tap_until(is_nearby_create);
    harness.service.set_recommended_progress(1.0);

    harness.tap();
    harness.service.run_pending();
    harness.service.fail_next_create(CloudError::NotEnoughSpatialData);
    harness.tap();
    harness.service.run_pending();

    assert!(is_nearby_create(&harness.controller.current_step().unwrap()));
    assert_eq!(harness.controller.saved_identifiers().len(), 1);
    assert_eq!(harness.controller.visual_color(""), Some(MarkerColor::Failed));

    // The failed anchor is replaced by the next one placed.
    let released = harness.platform.released().len();
    harness.tap();
    assert_eq!(harness.platform.released().len(), released + 1);
    harness.service.run_pending();
    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.saved_identifiers().len(), 3);
    assert_eq!(harness.controller.current_step(), Some(StepKind::StopSession));
}

#[test]
fn failed_nearby_save_can_jump_back() {
    let config = DemoConfig {
        save_failure: FailurePolicy::GoTo(0),
        ..config()
    };
    let harness = Harness::with_config(DemoMode::Nearby, config);
    harness.tap_until(is_nearby_create);
    harness.service.set_recommended_progress(1.0);
    harness.service.fail_next_create(CloudError::Unauthorized);

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.step(), 0);
}
