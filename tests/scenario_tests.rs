//! End-to-end scenarios against a stateful fake device: sessions restore
//! what they change, waits absorb eventual consistency, and the invariant
//! checker agrees with a healthy device.

mod common;

use amwm_harness::command::{self, AppOpsMode};
use amwm_harness::core::config::LockConfig;
use amwm_harness::prelude::*;
use amwm_harness::session::virtual_display::OverlaySpec;
use amwm_harness::state::invariants::ViolationKind;

use common::FakeDevice;

fn main_activity() -> ComponentName {
    ComponentName::new("com.example.app", ".MainActivity")
}

fn second_activity() -> ComponentName {
    ComponentName::new("com.example.app", ".SecondActivity")
}

fn state_for(device: &std::sync::Arc<FakeDevice>, attempts: u32) -> AmWmState {
    AmWmState::new(device.collector(), WaitConfig::immediate(attempts))
}

// ──────────────────── observation ────────────────────

#[test]
fn fresh_device_is_valid_and_consistent() {
    let device = FakeDevice::new();
    let mut state = state_for(&device, 3);
    let outcome = state.wait_for_valid_state(&[]).unwrap();
    assert!(outcome.is_converged());
    assert_eq!(outcome.attempts(), 1);
    state.assert_home_activity_visible(true).unwrap();
    state.assert_invariants().unwrap();
    assert_eq!(state.am().keyguard, KeyguardStatus::NotShowing);
    assert_eq!(state.wm().rotation(0), Some(0));
}

#[test]
fn launched_activity_converges_after_lag() {
    let device = FakeDevice::with_lag(3);
    let shell = device.shell();
    shell
        .execute(&command::am_start(&main_activity(), &[]))
        .unwrap();

    let mut state = state_for(&device, 6);
    let outcome = state.wait_for_valid_state(&[main_activity()]).unwrap();
    assert!(outcome.is_converged());
    assert!(outcome.attempts() > 1, "lag should need more than one poll");

    state.assert_visibility(&main_activity(), true).unwrap();
    state.assert_focused_activity(&main_activity()).unwrap();
    state.assert_resumed_activity(&main_activity()).unwrap();
    state.assert_home_activity_visible(false).unwrap();
    state.assert_invariants().unwrap();
}

#[test]
fn exhausted_budget_times_out_with_last_sample() {
    let device = FakeDevice::with_lag(50);
    device
        .shell()
        .execute(&command::am_start(&main_activity(), &[]))
        .unwrap();

    let mut state = state_for(&device, 3);
    let outcome = state.wait_for_valid_state(&[main_activity()]).unwrap();
    assert!(!outcome.is_converged());
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(device.count("dumpsys activity activities"), 3);

    let err = outcome.require("main visible").unwrap_err();
    assert_eq!(err.code(), "AMWM-3002");
    assert!(!err.is_skip());
}

#[test]
fn timeout_as_skip_maps_to_capability_absent() {
    let device = FakeDevice::with_lag(50);
    device
        .shell()
        .execute(&command::am_start(&main_activity(), &[]))
        .unwrap();
    let mut state = state_for(&device, 2);
    let err = state
        .wait_for_valid_state(&[main_activity()])
        .unwrap()
        .or_skip("main visible")
        .unwrap_err();
    assert!(err.is_skip());
    assert_eq!(err.code(), "AMWM-1101");
}

#[test]
fn missing_window_is_reported_as_violation() {
    let device = FakeDevice::new();
    device
        .shell()
        .execute(&command::am_start(&main_activity(), &[]))
        .unwrap();
    device.hide_window(&main_activity());

    let mut state = state_for(&device, 2);
    state.compute_state().unwrap();
    let report = state.check_invariants();
    assert!(!report.is_ok());
    assert!(report.visibility_checked);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(
        report.violations[0].kind,
        ViolationKind::ActivityWithoutVisibleWindow
    );
    assert_eq!(state.assert_invariants().unwrap_err().code(), "AMWM-3001");
}

#[test]
fn stopped_activity_keeping_its_window_is_reported() {
    let device = FakeDevice::new();
    let shell = device.shell();
    shell
        .execute(&command::am_start(&main_activity(), &[]))
        .unwrap();
    shell
        .execute(&command::am_start(&second_activity(), &[]))
        .unwrap();

    let mut state = state_for(&device, 2);
    state.compute_state().unwrap();
    state.assert_invariants().unwrap();

    device.leak_window(&main_activity());
    state.compute_state().unwrap();
    let report = state.check_invariants();
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    assert_eq!(
        report.violations[0].kind,
        ViolationKind::WindowForInactiveActivity
    );
    assert_eq!(report.violations[0].subject, main_activity().short());
}

#[test]
fn transport_failure_aborts_wait() {
    let device = FakeDevice::new();
    device.set_offline(true);
    let mut state = state_for(&device, 5);
    let err = state.wait_for_valid_state(&[]).unwrap_err();
    assert_eq!(err.code(), "AMWM-2001");
    assert!(err.is_retryable());
    assert_eq!(device.count("dumpsys activity activities"), 1);
}

// ──────────────────── launch + lifecycle ────────────────────

#[test]
fn launch_builder_starts_target_and_logs_single_launch() {
    let device = FakeDevice::new();
    let reader = LogReader::new(device.shell(), EventLog::disabled());
    let separator = reader.separate_logs().unwrap();

    let mut state = state_for(&device, 3);
    let outcome = LaunchActivityBuilder::new(second_activity(), main_activity())
        .new_task(true)
        .execute(&mut state)
        .unwrap()
        .expect("waits by default");
    assert!(outcome.is_converged());
    assert_eq!(device.top_activity(), Some(second_activity()));

    let validator = LifecycleValidator::new(
        reader,
        state.waiter().clone(),
        WaitPolicy::new(std::time::Duration::ZERO, 2),
    );
    validator
        .assert_single_launch(&second_activity(), &separator)
        .unwrap();
    validator
        .assert_single_launch_and_stop(&main_activity(), &separator)
        .unwrap();

    let counts = validator.counts(&main_activity(), &separator).unwrap();
    assert_eq!(counts.counters(), "1/1/1/1/1/0");
}

#[test]
fn lifecycle_ignores_lines_before_separator() {
    let device = FakeDevice::new();
    let shell = device.shell();
    shell
        .execute(&command::am_start(&main_activity(), &[]))
        .unwrap();
    let reader = LogReader::new(device.shell(), EventLog::disabled());
    let separator = reader.separate_logs().unwrap();
    shell
        .execute(&command::am_start(&second_activity(), &[]))
        .unwrap();

    let validator = LifecycleValidator::new(
        reader,
        Waiter::new(EventLog::disabled()),
        WaitPolicy::new(std::time::Duration::ZERO, 1),
    );
    let main = validator.counts(&main_activity(), &separator).unwrap();
    assert_eq!((main.create, main.pause, main.stop), (0, 1, 1));
    validator
        .assert_single_launch(&second_activity(), &separator)
        .unwrap();
}

// ──────────────────── sessions ────────────────────

#[test]
fn lock_screen_insecure_then_secure_round_trip() {
    let device = FakeDevice::new();
    let handle = device.handle();
    let waits = WaitConfig::immediate(4);
    let mut state = state_for(&device, 4);

    let mut lock = LockScreenSession::new(&handle, &LockConfig::default(), &waits).unwrap();
    assert!(lock.goto_keyguard(&mut state).unwrap().is_converged());
    assert_eq!(lock.state(), LockState::LockedInsecure);
    state.assert_keyguard_showing_and_not_occluded().unwrap();

    lock.unlock_device().unwrap();
    assert_eq!(lock.state(), LockState::Unlocked);
    assert!(state.wait_for_keyguard_gone().unwrap().is_converged());

    lock.set_lock_credential().unwrap();
    assert!(lock.goto_keyguard(&mut state).unwrap().is_converged());
    assert_eq!(lock.state(), LockState::LockedSecure);
    lock.unlock_device().unwrap();
    assert!(device.keyguard_showing(), "menu must not pass a secure keyguard");

    lock.enter_and_confirm_lock_credential().unwrap();
    assert_eq!(lock.state(), LockState::UnlockedViaCredential);
    assert!(state.wait_for_keyguard_gone().unwrap().is_converged());

    lock.close().unwrap();
    assert_eq!(device.pin(), None);
    assert!(!device.lock_disabled());
    assert!(!device.keyguard_showing());
}

#[test]
fn show_when_locked_activity_occludes_keyguard() {
    let device = FakeDevice::new();
    let over_lock = ComponentName::new("com.example.app", ".ShowWhenLockedActivity");
    device.mark_show_when_locked(&over_lock);
    let handle = device.handle();
    let mut state = state_for(&device, 4);

    let mut lock =
        LockScreenSession::new(&handle, &LockConfig::default(), &WaitConfig::immediate(4)).unwrap();
    lock.set_lock_credential().unwrap();
    assert!(lock.goto_keyguard(&mut state).unwrap().is_converged());
    state.assert_keyguard_showing_and_not_occluded().unwrap();

    device
        .shell()
        .execute(&command::am_start(&over_lock, &[]))
        .unwrap();
    assert!(
        state
            .wait_for_keyguard_showing_and_occluded()
            .unwrap()
            .is_converged()
    );
    assert!(state.wait_for_valid_state(std::slice::from_ref(&over_lock)).unwrap().is_converged());
    state.assert_visibility(&over_lock, true).unwrap();
    state.assert_invariants().unwrap();

    lock.close().unwrap();
    assert!(!device.keyguard_showing());
    assert_eq!(device.pin(), None);
    assert_eq!(device.top_activity(), None, "back finishes the occluding activity");
}

#[test]
fn lock_screen_restores_disabled_flag_on_drop() {
    let device = FakeDevice::new();
    device
        .shell()
        .execute(&command::locksettings_set_disabled(true))
        .unwrap();
    {
        let lock = LockScreenSession::new(
            &device.handle(),
            &LockConfig::default(),
            &WaitConfig::immediate(2),
        )
        .unwrap();
        assert!(!device.lock_disabled());
        assert_eq!(lock.state(), LockState::Unlocked);
    }
    assert!(device.lock_disabled());
}

#[test]
fn rotation_round_trip_restores_settings() {
    let device = FakeDevice::with_lag(1);
    let mut state = state_for(&device, 4);

    let mut rotation = RotationSession::new(&device.handle()).unwrap();
    assert_eq!(rotation.original_rotation(), Some(0));
    assert_eq!(device.setting("system", "accelerometer_rotation").as_deref(), Some("0"));

    for target in [1_u8, 2, 3, 0] {
        let outcome = rotation.set(target, &mut state).unwrap();
        assert!(outcome.is_converged(), "rotation {target}");
        assert_eq!(state.wm().rotation(0), Some(target));
        state.assert_invariants().unwrap();
    }
    rotation.set(1, &mut state).unwrap();
    rotation.close().unwrap();

    assert_eq!(device.setting("system", "user_rotation").as_deref(), Some("0"));
    assert_eq!(device.setting("system", "accelerometer_rotation").as_deref(), Some("1"));
}

#[test]
fn virtual_displays_appear_and_are_removed() {
    let device = FakeDevice::with_lag(2);
    let mut session = VirtualDisplaySession::new(
        &device.handle(),
        device.collector(),
        WaitPolicy::new(std::time::Duration::ZERO, 6),
    )
    .unwrap();

    let outcome = session
        .create_displays(&[
            OverlaySpec::new(800, 600, 160),
            OverlaySpec::new(1280, 720, 240),
        ])
        .unwrap();
    assert!(outcome.is_converged());
    assert_eq!(outcome.into_value(), vec![2, 3]);
    assert_eq!(session.created(), &[2, 3]);
    assert_eq!(device.overlays(), 2);

    session.close().unwrap();
    assert_eq!(device.overlays(), 0);
    assert_eq!(device.setting("global", "overlay_display_devices"), None);
}

#[test]
fn app_ops_reset_on_close() {
    let device = FakeDevice::new();
    let ops = AppOpsSession::new(&device.handle(), "com.example.app");
    ops.set_mode("RUN_IN_BACKGROUND", AppOpsMode::Ignore)
        .unwrap();
    assert_eq!(
        ops.mode("RUN_IN_BACKGROUND").unwrap(),
        "RUN_IN_BACKGROUND: ignore"
    );
    ops.close().unwrap();
    assert_eq!(device.app_op("com.example.app", "RUN_IN_BACKGROUND"), None);
}

#[test]
fn display_metrics_restore_previous_override() {
    let device = FakeDevice::new();
    let handle = device.handle();
    handle.set_wm_density(360).unwrap();

    let metrics = DisplayMetricsSession::new(&handle).unwrap();
    assert_eq!(metrics.original_density().overridden, Some(360));
    assert_eq!(metrics.original_size().physical, Some((1080, 1920)));
    metrics.set_size(720, 1280).unwrap();
    metrics.set_density(240).unwrap();
    assert_eq!(device.size_override(), Some((720, 1280)));
    metrics.close().unwrap();

    assert_eq!(device.size_override(), None);
    assert_eq!(device.density_override(), Some(360));
}

#[test]
fn screen_doze_settings_restored() {
    let device = FakeDevice::new();
    device.put_setting("secure", "doze_enabled", "1");
    let doze = ScreenDozeSession::new(&device.handle()).unwrap();
    assert_eq!(device.setting("secure", "doze_enabled").as_deref(), Some("0"));
    doze.close().unwrap();
    assert_eq!(device.setting("secure", "doze_enabled").as_deref(), Some("1"));
    assert_eq!(device.setting("secure", "doze_always_on"), None);
}

#[test]
fn nested_sessions_on_same_key_restore_in_reverse() {
    let device = FakeDevice::new();
    device.put_setting("global", "animator_duration_scale", "1.0");
    let handle = device.handle();
    {
        let mut outer = SettingsSession::<f32>::new(
            &handle,
            command::SettingsNamespace::Global,
            "animator_duration_scale",
        )
        .unwrap();
        outer.set(&0.5).unwrap();
        {
            let mut inner = SettingsSession::<f32>::new(
                &handle,
                command::SettingsNamespace::Global,
                "animator_duration_scale",
            )
            .unwrap();
            assert_eq!(inner.original(), Some(0.5));
            inner.set(&0.0).unwrap();
        }
        assert_eq!(
            device.setting("global", "animator_duration_scale").as_deref(),
            Some("0.5")
        );
    }
    assert_eq!(
        device.setting("global", "animator_duration_scale").as_deref(),
        Some("1.0")
    );
}

// ──────────────────── capabilities ────────────────────

#[test]
fn capabilities_follow_features() {
    let device = FakeDevice::new();
    let handle = device.handle();
    let caps = Capabilities::probe(&handle).unwrap();
    assert!(caps.supports(Capability::PictureInPicture));
    assert!(caps.supports(Capability::SplitScreen));
    assert!(caps.supports(Capability::Rotation));
    assert!(caps.supports(Capability::HomeScreen));
    assert!(!caps.supports(Capability::VrMode));

    device.set_features(&["android.hardware.type.watch", "android.hardware.screen.portrait"]);
    let watch = Capabilities::probe(&handle).unwrap();
    assert!(!watch.supports(Capability::SplitScreen));
    assert!(!watch.supports(Capability::Rotation));
    let err = watch.require(Capability::Rotation, &handle).unwrap_err();
    assert!(err.is_skip());
}
