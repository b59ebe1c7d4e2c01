/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use common::Harness;

use cloudanchor::headless::{HeadlessCloudService, HeadlessPlatform, HeadlessRenderer};
use cloudanchor_api::{
    pose_at, AccountConfig, ArPlatform, CloudError, DemoConfig, DemoController, DemoMode, Error,
    FailurePolicy, HitResult, LocateQuery, MarkerColor, Ray, Selection, StepKind, Trackable,
    TrackingState, Workflow,
};

use euclid::{Point2D, Point3D, Vector3D};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn is_save(step: &StepKind) -> bool {
    matches!(step, StepKind::SaveCloudAnchor { .. })
}

fn is_locate(step: &StepKind) -> bool {
    matches!(step, StepKind::Locate(LocateQuery::SavedIdentifiers))
}

/// Run the basic demo up to and including a successful save.
fn save_one(harness: &Harness) -> String {
    harness.tap_until(is_save);
    harness.service.set_recommended_progress(1.0);
    harness.tap();
    assert_eq!(harness.service.run_pending(), 1);
    let saved = harness.controller.saved_identifiers();
    assert_eq!(saved.len(), 1);
    saved[0].clone()
}

#[test]
fn save_rekeys_the_pending_visual() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until(is_save);
    assert_eq!(harness.controller.visual_identifiers(), vec![String::new()]);
    assert_eq!(harness.controller.visual_color(""), Some(MarkerColor::Ready));

    harness.service.set_recommended_progress(1.0);
    harness.tap();
    assert!(harness.controller.is_async_op_in_progress());
    assert_eq!(harness.service.run_pending(), 1);
    assert!(!harness.controller.is_async_op_in_progress());

    let saved = harness.controller.saved_identifiers();
    assert_eq!(saved.len(), 1);
    assert_eq!(harness.controller.visual_identifiers(), saved);
    assert_eq!(harness.controller.visual_color(&saved[0]), Some(MarkerColor::Saved));
    assert_eq!(harness.controller.current_step(), Some(StepKind::StopSession));
    assert!(harness.controller.ui().message.contains(&saved[0]));
}

#[test]
fn expiration_is_a_week_out() {
    let harness = Harness::new(DemoMode::Basic);
    let identifier = save_one(&harness);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    let expiration = harness.service.expiration(&identifier).unwrap().unix_millis();
    let week = 7 * 24 * 60 * 60 * 1000;
    assert!(expiration > now + week - 60_000);
    assert!(expiration <= now + week + 60_000);
}

#[test]
fn save_needs_enough_spatial_data() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until(is_save);
    let step = harness.controller.step();
    harness.service.set_recommended_progress(0.4);

    let result = harness.controller.handle_user_input(Selection::Advance);
    assert_eq!(result, Err(Error::NotEnoughData(0.4)));
    assert_eq!(harness.service.queued(), 0);
    assert_eq!(harness.service.stats().anchors_saved, 0);
    assert_eq!(harness.controller.step(), step);
    assert!(!harness.controller.is_async_op_in_progress());
    let status = harness.controller.ui().status;
    assert!(status.contains("not enough data"), "{}", status);
    assert!(status.contains("40%"), "{}", status);
}

#[test]
fn progress_is_shown_while_saving() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until(is_save);
    harness.service.set_recommended_progress(0.5);
    let ui = harness.controller.ui();
    assert_eq!(ui.status, "feedback:  - create ready = 50%, recommend = 50%");
    assert_eq!(
        harness.controller.session_status().recommended_for_create_progress,
        0.5
    );
}

#[test]
fn input_is_ignored_while_saving() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until(is_save);
    harness.service.set_recommended_progress(1.0);
    harness.tap();
    let step = harness.controller.step();

    for _ in 0..3 {
        assert_eq!(
            harness.controller.handle_user_input(Selection::Advance),
            Err(Error::Busy)
        );
    }
    assert_eq!(harness.controller.step(), step);
    assert_eq!(harness.service.run_pending(), 1);
    assert_eq!(harness.service.stats().anchors_saved, 1);
}

#[test]
fn failed_save_is_retried() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until(is_save);
    let step = harness.controller.step();
    harness.service.set_recommended_progress(1.0);
    harness.service.fail_next_create(CloudError::ServiceUnavailable);

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.step(), step);
    assert_eq!(harness.controller.visual_color(""), Some(MarkerColor::Failed));
    assert!(harness.controller.ui().message.contains("13"));

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.current_step(), Some(StepKind::StopSession));
    assert_eq!(harness.controller.visual_count(), 1);
}

#[test]
fn basic_demo_runs_to_the_end() {
    let harness = Harness::new(DemoMode::Basic);
    let identifier = save_one(&harness);

    harness.tap_until(is_locate);
    assert_eq!(harness.controller.visual_count(), 0);
    assert_eq!(harness.platform.live_anchors(), 0);

    harness.tap();
    assert!(harness.controller.is_async_op_in_progress());
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_identifiers(), vec![identifier.clone()]);
    assert_eq!(harness.controller.visual_color(&identifier), Some(MarkerColor::Found));
    assert!(matches!(
        harness.controller.current_step(),
        Some(StepKind::DeleteFoundAnchors { .. })
    ));

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_count(), 0);
    assert!(harness.service.stored_anchors().is_empty());
    assert_eq!(harness.controller.current_step(), Some(StepKind::Teardown));

    harness.tap();
    assert_eq!(harness.controller.step(), 0);
    assert!(!harness.controller.has_session());
    assert!(!harness.controller.ui().show_advance_button);
    assert_eq!(harness.platform.live_anchors(), 0);
    assert_eq!(harness.platform.double_releases(), 0);
    assert_eq!(harness.service.listener_count(), 0);
}

#[test]
fn missing_anchor_keeps_the_locate_step() {
    let harness = Harness::new(DemoMode::Basic);
    let identifier = save_one(&harness);
    harness.tap_until(is_locate);
    let step = harness.controller.step();
    assert!(harness.service.forget_anchor(&identifier));

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_count(), 0);
    assert_eq!(harness.controller.step(), step);
    assert!(!harness.controller.is_async_op_in_progress());
    let button = harness.controller.ui().button_text();
    assert!(button.contains("does not exist"), "{}", button);
}

#[test]
fn unconfigured_account_blocks_every_step() {
    common::init_logging();
    let platform = Arc::new(HeadlessPlatform::new());
    let service = Arc::new(HeadlessCloudService::new(platform.clone()));
    let config = DemoConfig::with_account(AccountConfig::default());
    let controller = DemoController::new(config, platform, service.clone());

    assert_eq!(
        controller.handle_user_input(Selection::Advance),
        Err(Error::AccountNotConfigured)
    );
    assert_eq!(controller.step(), 0);
    assert!(!controller.ui().account_configured);
    assert_eq!(service.stats().sessions_created, 0);
}

#[test]
fn tap_places_the_anchor_on_the_hit_plane() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until_step(StepKind::CreateLocalAnchor);
    let target = Point3D::new(1.0, 2.0, -3.0);
    harness.platform.set_hit_results(vec![
        HitResult {
            pose: pose_at(Point3D::new(0.0, 0.0, -0.5)),
            trackable: Trackable::Plane {
                pose_in_polygon: false,
            },
        },
        HitResult {
            pose: pose_at(target),
            trackable: Trackable::Plane {
                pose_in_polygon: true,
            },
        },
    ]);
    harness
        .controller
        .handle_user_input(Selection::Screen(Point2D::new(100.0, 200.0)))
        .unwrap();

    let handles = harness.handles();
    assert_eq!(handles.len(), 1);
    let pose = harness.platform.anchor_pose(handles[0]).unwrap();
    assert_eq!(pose.translation.to_point(), target);
}

#[test]
fn gaze_places_the_anchor_along_the_ray() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until_step(StepKind::CreateLocalAnchor);
    let ray = Ray {
        origin: Point3D::new(0.0, 1.0, 0.0),
        direction: Vector3D::new(0.0, 0.0, -4.0),
    };
    harness
        .controller
        .handle_user_input(Selection::Gaze(ray))
        .unwrap();

    let handles = harness.handles();
    let pose = harness.platform.anchor_pose(handles[0]).unwrap();
    assert_eq!(pose.translation.to_point(), Point3D::new(0.0, 1.0, -1.0));
}

#[test]
fn placement_needs_tracking() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until_step(StepKind::CreateLocalAnchor);
    let step = harness.controller.step();

    harness.platform.set_camera_tracking_state(TrackingState::Paused);
    assert_eq!(
        harness.controller.handle_user_input(Selection::Advance),
        Err(Error::NotTracking)
    );
    assert_eq!(harness.controller.step(), step);

    harness.platform.set_camera_tracking_state(TrackingState::Tracking);
    harness.platform.set_anchor_tracking_state(TrackingState::Paused);
    assert_eq!(
        harness.controller.handle_user_input(Selection::Advance),
        Err(Error::AnchorCreationRefused)
    );
    assert_eq!(harness.controller.step(), step);
    assert_eq!(harness.controller.visual_count(), 0);
    assert_eq!(harness.platform.live_anchors(), 0);
    assert_eq!(harness.platform.released().len(), 1);
}

#[test]
fn render_draws_tracked_visible_markers() {
    let harness = Harness::new(DemoMode::Basic);
    save_one(&harness);

    let mut renderer = HeadlessRenderer::default();
    assert_eq!(harness.controller.render_frame(&mut renderer), 1);
    assert_eq!(renderer.colors(), vec![MarkerColor::Saved]);
    assert_eq!(renderer.markers[0].rgb, [0.0, 1.0, 0.0]);

    harness.platform.set_camera_tracking_state(TrackingState::Paused);
    let mut renderer = HeadlessRenderer::default();
    assert_eq!(harness.controller.render_frame(&mut renderer), 0);
    assert!(renderer.markers.is_empty());
}

#[test]
fn mode_is_fixed_while_running() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap();
    assert_eq!(
        harness.controller.select_mode(DemoMode::Nearby),
        Err(Error::DemoInProgress)
    );
    harness.controller.teardown();
    harness.controller.select_mode(DemoMode::Nearby).unwrap();
    assert_eq!(harness.controller.mode(), Some(DemoMode::Nearby));
}

#[test]
fn expiration_message_counts_hours() {
    let mut config = common::config();
    config.anchor_lifetime_hours = 36;
    let harness = Harness::with_config(DemoMode::Basic, config);
    harness.tap_until(is_save);
    let message = harness.controller.ui().message;
    assert!(message.contains("set to 36 hours from now"), "{}", message);
}

#[test]
fn expiration_message_counts_days() {
    let harness = Harness::new(DemoMode::Basic);
    harness.tap_until(is_save);
    let message = harness.controller.ui().message;
    assert!(message.contains("set to 7 days from now"), "{}", message);
}

#[test]
fn already_tracked_anchor_is_left_alone() {
    let harness = Harness::with_workflow(Workflow::new(vec![
        StepKind::CreateSession,
        StepKind::ConfigureSession,
        StepKind::StartSession,
        StepKind::CreateLocalAnchor,
        StepKind::CreateCloudAnchor,
        StepKind::SetExpiration,
        StepKind::SaveCloudAnchor {
            on_failure: FailurePolicy::Retry,
        },
        StepKind::Locate(LocateQuery::SavedIdentifiers),
        StepKind::Teardown,
    ]));
    let identifier = save_one(&harness);
    assert!(is_locate(&harness.controller.current_step().unwrap()));
    let step = harness.controller.step();
    let handles = harness.handles();
    let live = harness.platform.live_anchors();

    // The session saved it, so it is already tracking it.
    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_identifiers(), vec![identifier.clone()]);
    assert_eq!(harness.controller.visual_color(&identifier), Some(MarkerColor::Saved));
    assert_eq!(harness.handles(), handles);
    assert_eq!(harness.platform.live_anchors(), live);
    assert_eq!(harness.platform.double_releases(), 0);
    assert_eq!(harness.controller.step(), step);
    assert!(!harness.controller.is_async_op_in_progress());
    let button = harness.controller.ui().button_text();
    assert!(button.contains("already tracked"), "{}", button);
}

#[test]
fn unseen_anchor_is_not_located() {
    let harness = Harness::new(DemoMode::Basic);
    let identifier = save_one(&harness);
    harness.tap_until(is_locate);
    let step = harness.controller.step();
    assert!(harness.service.set_anchor_visible(&identifier, false));

    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_count(), 0);
    assert_eq!(harness.platform.live_anchors(), 0);
    assert_eq!(harness.controller.step(), step);
    assert!(!harness.controller.is_async_op_in_progress());
    let button = harness.controller.ui().button_text();
    assert!(button.contains(&format!("not located: {}", identifier)), "{}", button);

    harness.service.set_anchor_visible(&identifier, true);
    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.visual_color(&identifier), Some(MarkerColor::Found));
    assert!(matches!(
        harness.controller.current_step(),
        Some(StepKind::DeleteFoundAnchors { .. })
    ));
}

#[test]
fn mode_is_fixed_while_a_failed_run_holds_the_session() {
    let mut config = common::config();
    config.save_failure = FailurePolicy::GoTo(0);
    let harness = Harness::with_config(DemoMode::Basic, config);
    harness.tap_until(is_save);
    harness.service.set_recommended_progress(1.0);
    harness.service.fail_next_create(CloudError::ServiceUnavailable);
    harness.tap();
    harness.service.run_pending();
    assert_eq!(harness.controller.step(), 0);
    assert!(harness.controller.has_session());

    assert_eq!(
        harness.controller.select_mode(DemoMode::Nearby),
        Err(Error::DemoInProgress)
    );
    assert_eq!(harness.controller.mode(), Some(DemoMode::Basic));

    harness.controller.teardown();
    harness.controller.select_mode(DemoMode::Nearby).unwrap();
    assert_eq!(harness.controller.mode(), Some(DemoMode::Nearby));
}
