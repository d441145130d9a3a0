//! Tests for the Router

use super::*;
use crate::backend::testing::{BackendCall, IndicatorCall, RecordingBackend, RecordingIndicators};
use crate::learn::LearnOutcome;
use crate::mapping::{ControlEvent, ControlNumber, EventShape};
use crate::target::{LiveHandle, LiveTarget};
use std::time::Instant;

struct Fixture {
    router: Router,
    backend: Arc<RecordingBackend>,
    indicators: Arc<RecordingIndicators>,
}

impl Fixture {
    fn new(live: Vec<LiveTarget>) -> Self {
        let backend = Arc::new(RecordingBackend::new(live));
        let indicators = Arc::new(RecordingIndicators::default());
        let mut router = Router::new(RouterSettings::default(), backend.clone(), indicators.clone());
        router.refresh(Instant::now());
        Self {
            router,
            backend,
            indicators,
        }
    }

    fn id(&self, external_id: &str) -> LogicalId {
        self.router.directory().find_by_external_id(external_id).unwrap()
    }

    fn assign(&mut self, external_id: &str, channel: usize) -> LogicalId {
        let id = self.id(external_id);
        self.router.assign_target(id, channel).unwrap();
        id
    }

    /// Arm learn mode and feed the binding event
    fn learn(&mut self, action: Action, target: ChannelTarget, event: ControlEvent) -> MappingEntry {
        self.router.request_learn(action, target).unwrap();
        match self.router.handle_event(&event) {
            EventOutcome::Learn(LearnOutcome::Committed { entry, .. }) => entry,
            other => panic!("learn did not commit: {:?}", other),
        }
    }

    fn press(&mut self, note: u8) -> DispatchOutcome {
        self.event(ControlEvent::discrete(0, ControlNumber::Number(note), Edge::On))
    }

    fn release(&mut self, note: u8) -> DispatchOutcome {
        self.event(ControlEvent::discrete(0, ControlNumber::Number(note), Edge::Off))
    }

    fn event(&mut self, event: ControlEvent) -> DispatchOutcome {
        match self.router.handle_event(&event) {
            EventOutcome::Dispatch(outcome) => outcome,
            other => panic!("event consumed by learn: {:?}", other),
        }
    }

    fn clear_calls(&self) {
        self.backend.take_calls();
        self.indicators.take_calls();
    }
}

fn app(ext: &str, process: &str, name: &str, handle: u64) -> LiveTarget {
    LiveTarget::new(ext, Some(process), name, TargetKind::Application, LiveHandle(handle))
}

fn output(ext: &str, name: &str, handle: u64) -> LiveTarget {
    LiveTarget::new(ext, None, name, TargetKind::SystemOutput, LiveHandle(handle))
}

fn button(note: u8) -> ControlEvent {
    ControlEvent::discrete(0, ControlNumber::Number(note), Edge::On)
}

fn fader(control: u8, raw: u16) -> ControlEvent {
    ControlEvent::continuous(0, ControlNumber::Number(control), raw)
}

fn standard_live() -> Vec<LiveTarget> {
    vec![
        app("s-1", "Spotify.exe", "Spotify", 1),
        app("c-1", "chrome.exe", "Chrome", 2),
        app("v-1", "vlc.exe", "VLC", 3),
    ]
}

#[test]
fn test_learned_volume_drives_assigned_targets() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 3);
    f.assign("c-1", 3);

    let entry = f.learn(Action::Volume, ChannelTarget::Channel(3), fader(16, 64));
    assert_eq!(entry.source_channel, 0);
    assert_eq!(entry.control, ControlNumber::Number(16));
    assert_eq!(entry.shape, EventShape::Continuous);
    assert_eq!(entry.action, Action::Volume);
    assert_eq!(entry.target, ChannelTarget::Channel(3));
    f.clear_calls();

    let outcome = f.event(fader(16, 127));
    assert_eq!(outcome, DispatchOutcome::Volume { channel: 3, volume: 1.0 });
    assert_eq!(f.router.channel(3).unwrap().volume, 1.0);

    let calls = f.backend.take_calls();
    assert!(calls.contains(&BackendCall::Volume(LiveHandle(1), 1.0)));
    assert!(calls.contains(&BackendCall::Volume(LiveHandle(2), 1.0)));
    assert!(!calls.contains(&BackendCall::Volume(LiveHandle(3), 1.0)));

    assert_eq!(
        f.indicators.take_calls(),
        vec![IndicatorCall::Continuous(0, ControlNumber::Number(16), 1.0)]
    );
}

#[test]
fn test_armed_learn_consumes_events_before_dispatch() {
    let mut f = Fixture::new(standard_live());
    f.learn(Action::Mute, ChannelTarget::Channel(0), button(8));
    f.release(8);

    f.router.request_learn(Action::Volume, ChannelTarget::Channel(0)).unwrap();
    let outcome = f.router.handle_event(&button(8));

    assert_eq!(
        outcome,
        EventOutcome::Learn(LearnOutcome::Mismatch {
            action: Action::Volume,
            received: EventShape::Discrete
        })
    );
    assert!(!f.router.channel(0).unwrap().is_muted);
    assert_eq!(f.router.mappings().len(), 1);
    assert_eq!(f.router.learn_state(), crate::learn::LearnState::Idle);
}

#[test]
fn test_mute_toggles_on_press_only() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 0);
    f.learn(Action::Mute, ChannelTarget::Channel(0), button(8));
    f.clear_calls();

    assert_eq!(f.press(8), DispatchOutcome::Mute { channel: 0, muted: true });
    assert_eq!(f.release(8), DispatchOutcome::Ignored);
    assert!(f.router.channel(0).unwrap().is_muted);

    assert_eq!(f.backend.take_calls(), vec![BackendCall::Mute(LiveHandle(1), true)]);
    assert_eq!(
        f.indicators.take_calls(),
        vec![IndicatorCall::Indicator(0, ControlNumber::Number(8), true)]
    );

    assert_eq!(f.press(8), DispatchOutcome::Mute { channel: 0, muted: false });
}

#[test]
fn test_unmapped_event_is_noop() {
    let mut f = Fixture::new(standard_live());
    assert_eq!(f.press(42), DispatchOutcome::Unmapped);
    assert!(f.backend.take_calls().is_empty());
}

#[test]
fn test_solo_on_master_output_rejected() {
    let mut f = Fixture::new(vec![output("dev-1", "Speakers", 10)]);
    f.assign("dev-1", 1);
    f.learn(Action::Solo, ChannelTarget::Channel(1), button(9));

    assert_eq!(f.press(9), DispatchOutcome::Rejected(Rejection::SoloMasterOutput(1)));
    assert!(!f.router.channel(1).unwrap().is_soloed);
    assert!(!f.router.channels().any_soloed());
}

#[test]
fn test_solo_mutes_other_channels_and_restores() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 0);
    f.assign("c-1", 1);
    f.learn(Action::Solo, ChannelTarget::Channel(0), button(8));
    f.clear_calls();

    assert_eq!(f.press(8), DispatchOutcome::Solo { channel: 0, soloed: true });
    assert!(f.router.channel(1).unwrap().is_muted);
    assert_eq!(f.backend.take_calls(), vec![BackendCall::Mute(LiveHandle(2), true)]);

    f.release(8);
    assert_eq!(f.press(8), DispatchOutcome::Solo { channel: 0, soloed: false });
    assert!(!f.router.channel(1).unwrap().is_muted);
    assert_eq!(f.backend.take_calls(), vec![BackendCall::Mute(LiveHandle(2), false)]);
}

#[test]
fn test_mute_toggle_during_solo_keeps_other_channel_muted() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 0);
    f.assign("c-1", 1);
    f.learn(Action::Solo, ChannelTarget::Channel(0), button(8));
    f.learn(Action::Mute, ChannelTarget::Channel(1), button(9));
    f.press(8);
    f.release(8);
    f.clear_calls();

    assert_eq!(f.press(9), DispatchOutcome::Mute { channel: 1, muted: true });
    assert!(f.router.channel(1).unwrap().is_muted);
    assert!(f.backend.take_calls().is_empty());
    f.release(9);

    // Clearing the solo restores the pre-solo mute
    assert_eq!(f.press(8), DispatchOutcome::Solo { channel: 0, soloed: false });
    assert!(!f.router.channel(1).unwrap().is_muted);
    assert_eq!(f.backend.take_calls(), vec![BackendCall::Mute(LiveHandle(2), false)]);
}

#[test]
fn test_master_output_cannot_join_soloed_channel() {
    let mut live = standard_live();
    live.push(output("dev-1", "Speakers", 10));
    let mut f = Fixture::new(live);
    f.assign("s-1", 0);
    f.learn(Action::Solo, ChannelTarget::Channel(0), button(8));
    f.press(8);

    let master = f.id("dev-1");
    assert_eq!(
        f.router.assign_target(master, 0),
        Err(Rejection::MasterOnSoloedChannel(0))
    );
    assert!(!f.router.channel(0).unwrap().assigned_targets.contains(&master));
    assert_eq!(f.router.directory().get(master).unwrap().assigned_channel, None);

    // Any other channel still takes it
    assert_eq!(f.router.assign_target(master, 1), Ok(None));
}

#[test]
fn test_assignment_is_exclusive() {
    let mut f = Fixture::new(standard_live());
    let id = f.assign("s-1", 2);

    assert_eq!(f.router.assign_target(id, 5), Ok(Some(2)));
    assert!(!f.router.channel(2).unwrap().assigned_targets.contains(&id));
    assert!(f.router.channel(5).unwrap().assigned_targets.contains(&id));
    assert_eq!(f.router.directory().get(id).unwrap().assigned_channel, Some(5));

    assert_eq!(
        f.router.assign_target(id, 40),
        Err(Rejection::ChannelOutOfRange { index: 40, count: 9 })
    );
    assert_eq!(
        f.router.assign_target(LogicalId(999), 1),
        Err(Rejection::UnknownTarget(LogicalId(999)))
    );
}

#[test]
fn test_record_moves_default_device_indicator() {
    let mut f = Fixture::new(vec![
        output("dev-1", "Speakers", 10),
        output("dev-2", "Headset", 11),
    ]);
    f.assign("dev-1", 0);
    f.assign("dev-2", 1);
    f.learn(Action::Record, ChannelTarget::Channel(0), button(0));
    f.learn(Action::Record, ChannelTarget::Channel(1), button(1));
    f.clear_calls();

    assert_eq!(
        f.press(0),
        DispatchOutcome::Record { channel: 0, kind: TargetKind::SystemOutput, switched: true }
    );
    assert!(f.router.channel(0).unwrap().is_recording);

    f.indicators.take_calls();
    f.press(1);
    assert!(!f.router.channel(0).unwrap().is_recording);
    assert!(f.router.channel(1).unwrap().is_recording);

    let leds = f.indicators.take_calls();
    assert!(leds.contains(&IndicatorCall::Indicator(0, ControlNumber::Number(0), false)));
    assert!(leds.contains(&IndicatorCall::Indicator(0, ControlNumber::Number(1), true)));
    assert_eq!(
        f.backend.take_calls(),
        vec![
            BackendCall::DefaultDevice(LiveHandle(10), TargetKind::SystemOutput),
            BackendCall::DefaultDevice(LiveHandle(11), TargetKind::SystemOutput),
        ]
    );

    // Re-asserting the current default keeps the indicator on
    f.press(1);
    assert!(f.router.channel(1).unwrap().is_recording);
}

#[test]
fn test_record_on_application_is_not_applicable() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 2);
    f.learn(Action::Record, ChannelTarget::Channel(2), button(2));

    assert_eq!(f.press(2), DispatchOutcome::RecordNotApplicable { channel: 2 });
    assert!(!f.router.channel(2).unwrap().is_recording);
}

#[test]
fn test_record_switch_retried_once() {
    let mut f = Fixture::new(vec![output("dev-1", "Speakers", 10)]);
    f.assign("dev-1", 0);
    f.learn(Action::Record, ChannelTarget::Channel(0), button(0));

    *f.backend.failing_switches.lock() = 2;
    assert_eq!(
        f.press(0),
        DispatchOutcome::Record { channel: 0, kind: TargetKind::SystemOutput, switched: false }
    );
    assert!(!f.router.channel(0).unwrap().is_recording);

    *f.backend.failing_switches.lock() = 1;
    f.release(0);
    assert_eq!(
        f.press(0),
        DispatchOutcome::Record { channel: 0, kind: TargetKind::SystemOutput, switched: true }
    );
    assert!(f.router.channel(0).unwrap().is_recording);
}

#[test]
fn test_play_and_pause_are_exclusive() {
    let mut f = Fixture::new(Vec::new());
    f.learn(Action::TransportPlay, ChannelTarget::Global, button(94));
    f.learn(Action::TransportPause, ChannelTarget::Global, button(93));
    f.clear_calls();

    f.press(94);
    let leds = f.indicators.take_calls();
    assert!(leds.contains(&IndicatorCall::Indicator(0, ControlNumber::Number(94), true)));
    assert!(leds.contains(&IndicatorCall::Indicator(0, ControlNumber::Number(93), false)));

    f.press(93);
    let leds = f.indicators.take_calls();
    assert!(leds.contains(&IndicatorCall::Indicator(0, ControlNumber::Number(94), false)));
    assert!(leds.contains(&IndicatorCall::Indicator(0, ControlNumber::Number(93), true)));

    assert_eq!(
        f.backend.take_calls(),
        vec![
            BackendCall::Transport(TransportAction::Play),
            BackendCall::Transport(TransportAction::Pause),
        ]
    );
}

#[test]
fn test_next_pulses_indicator() {
    let mut f = Fixture::new(Vec::new());
    f.learn(Action::TransportNext, ChannelTarget::Global, button(92));
    f.clear_calls();

    assert_eq!(
        f.press(92),
        DispatchOutcome::Transport { action: TransportAction::Next, active: true }
    );
    assert_eq!(
        f.release(92),
        DispatchOutcome::Transport { action: TransportAction::Next, active: false }
    );
    assert_eq!(
        f.indicators.take_calls(),
        vec![
            IndicatorCall::Indicator(0, ControlNumber::Number(92), true),
            IndicatorCall::Indicator(0, ControlNumber::Number(92), false),
        ]
    );
}

#[test]
fn test_continuous_transport_acts_on_edges() {
    let mut f = Fixture::new(Vec::new());
    f.learn(Action::TransportNext, ChannelTarget::Global, fader(20, 90));
    f.backend.take_calls();

    assert_eq!(f.event(fader(20, 0)), DispatchOutcome::Ignored);
    assert!(matches!(f.event(fader(20, 50)), DispatchOutcome::Transport { active: true, .. }));
    assert_eq!(f.event(fader(20, 60)), DispatchOutcome::Ignored);
    assert!(matches!(f.event(fader(20, 0)), DispatchOutcome::Transport { active: false, .. }));

    assert_eq!(f.backend.take_calls(), vec![BackendCall::Transport(TransportAction::Next)]);
}

#[test]
fn test_select_mapping_is_inert() {
    let mut f = Fixture::new(standard_live());
    f.learn(Action::Select, ChannelTarget::Channel(0), button(24));
    f.clear_calls();

    assert_eq!(f.press(24), DispatchOutcome::Inert);
    assert!(f.backend.take_calls().is_empty());
}

#[test]
fn test_migration_keeps_assignment_and_reapplies_volume() {
    let mut f = Fixture::new(standard_live());
    let id = f.assign("s-1", 2);
    f.learn(Action::Volume, ChannelTarget::Channel(2), fader(16, 0));
    f.event(fader(16, 127));
    f.event(fader(16, 0));
    f.clear_calls();

    f.backend.set_live(vec![app("s-2", "spotify.exe", "Spotify", 9)]);
    let report = f.router.refresh(Instant::now());

    assert_eq!(report.migrated, vec![id]);
    let target = f.router.directory().get(id).unwrap();
    assert_eq!(target.assigned_channel, Some(2));
    assert_eq!(target.live_handle, Some(LiveHandle(9)));
    assert!(f.backend.take_calls().contains(&BackendCall::Volume(LiveHandle(9), 0.0)));
}

#[test]
fn test_invalid_handle_goes_offline_without_aborting_batch() {
    let mut f = Fixture::new(standard_live());
    let spotify = f.assign("s-1", 0);
    f.assign("c-1", 0);
    f.learn(Action::Volume, ChannelTarget::Channel(0), fader(16, 0));
    f.clear_calls();

    f.backend.fail(LiveHandle(1));
    f.event(fader(16, 127));

    assert_eq!(f.backend.take_calls(), vec![BackendCall::Volume(LiveHandle(2), 1.0)]);
    assert!(!f.router.directory().get(spotify).unwrap().is_online());
}

#[test]
fn test_unmapped_special_reaches_unassigned_apps() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 1);
    let unmapped = f.router.add_special_target(TargetKind::SpecialUnmapped, Instant::now()).unwrap();
    f.router.assign_target(unmapped, 0).unwrap();
    f.learn(Action::Volume, ChannelTarget::Channel(0), fader(16, 0));
    f.clear_calls();

    f.event(fader(16, 127));
    let calls = f.backend.take_calls();
    assert!(calls.contains(&BackendCall::Volume(LiveHandle(2), 1.0)));
    assert!(calls.contains(&BackendCall::Volume(LiveHandle(3), 1.0)));
    assert!(!calls.contains(&BackendCall::Volume(LiveHandle(1), 1.0)));
}

#[test]
fn test_focused_special_follows_focus() {
    let mut f = Fixture::new(standard_live());
    let focused = f.router.add_special_target(TargetKind::SpecialFocusedApp, Instant::now()).unwrap();
    f.router.assign_target(focused, 0).unwrap();
    f.learn(Action::Volume, ChannelTarget::Channel(0), fader(16, 0));

    *f.backend.focused.lock() = Some("chrome".to_string());
    f.clear_calls();
    f.event(fader(16, 127));
    assert_eq!(f.backend.take_calls(), vec![BackendCall::Volume(LiveHandle(2), 1.0)]);

    *f.backend.focused.lock() = None;
    f.event(fader(16, 0));
    assert!(f.backend.take_calls().is_empty());
}

#[test]
fn test_activity_drives_select_indicator() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 0);
    f.learn(Action::Select, ChannelTarget::Channel(0), button(24));
    f.clear_calls();

    let t0 = Instant::now();
    f.backend.peaks.lock().insert(LiveHandle(1), 0.5);
    f.router.refresh(t0);
    assert!(f.router.channel(0).unwrap().is_selected);
    assert_eq!(
        f.indicators.take_calls(),
        vec![IndicatorCall::Indicator(0, ControlNumber::Number(24), true)]
    );

    f.backend.peaks.lock().insert(LiveHandle(1), 0.0);
    f.router.refresh(t0 + Duration::from_millis(100));
    assert!(f.router.channel(0).unwrap().is_selected);

    f.router.refresh(t0 + Duration::from_millis(600));
    assert!(!f.router.channel(0).unwrap().is_selected);
    assert_eq!(
        f.indicators.take_calls(),
        vec![IndicatorCall::Indicator(0, ControlNumber::Number(24), false)]
    );
}

#[test]
fn test_failed_indicator_write_does_not_abort_dispatch() {
    let mut f = Fixture::new(standard_live());
    f.assign("s-1", 0);
    f.learn(Action::Mute, ChannelTarget::Channel(0), button(8));
    f.clear_calls();

    *f.indicators.failing_writes.lock() = 2;
    assert_eq!(f.press(8), DispatchOutcome::Mute { channel: 0, muted: true });
    assert!(f.indicators.take_calls().is_empty());
    assert_eq!(f.backend.take_calls(), vec![BackendCall::Mute(LiveHandle(1), true)]);
}

#[test]
fn test_snapshot_restores_into_fresh_router() {
    let mut f = Fixture::new(standard_live());
    let id = f.assign("s-1", 4);
    f.learn(Action::Volume, ChannelTarget::Channel(4), fader(16, 0));
    f.learn(Action::Mute, ChannelTarget::Channel(4), button(12));
    f.event(fader(16, 127));
    f.release(12);
    f.press(12);
    let snapshot = f.router.snapshot();

    let mut fresh = Fixture::new(Vec::new());
    let summary = fresh.router.restore(snapshot, Instant::now());
    assert_eq!(summary, RestoreSummary { mappings: 2, targets: 1, assignments: 1 });

    let target = fresh.router.directory().get(id).unwrap();
    assert!(!target.is_online());
    assert_eq!(target.assigned_channel, Some(4));
    assert!(fresh.router.channel(4).unwrap().is_muted);
    assert_eq!(fresh.router.channel(4).unwrap().volume, 1.0);

    fresh.clear_calls();
    fresh.backend.set_live(standard_live());
    fresh.router.refresh(Instant::now());

    let target = fresh.router.directory().get(id).unwrap();
    assert_eq!(target.live_handle, Some(LiveHandle(1)));
    let calls = fresh.backend.take_calls();
    assert!(calls.contains(&BackendCall::Volume(LiveHandle(1), 1.0)));
    assert!(calls.contains(&BackendCall::Mute(LiveHandle(1), true)));
}

#[test]
fn test_snapshot_keeps_user_mute_during_solo() {
    let mut f = Fixture::new(standard_live());
    f.learn(Action::Solo, ChannelTarget::Channel(0), button(8));
    f.press(8);

    let snapshot = f.router.snapshot();
    assert!(snapshot.channels.iter().all(|c| !c.muted));
}

#[test]
fn test_shrinking_bank_releases_targets() {
    let mut f = Fixture::new(standard_live());
    let id = f.assign("v-1", 8);

    f.router.update_settings(RouterSettings {
        channel_count: 4,
        ..RouterSettings::default()
    });

    assert_eq!(f.router.channels().len(), 4);
    assert_eq!(f.router.directory().get(id).unwrap().assigned_channel, None);
    assert!(f.router.take_dirty());
}

#[test]
fn test_remove_target_clears_channel() {
    let mut f = Fixture::new(standard_live());
    let id = f.assign("c-1", 3);

    let removed = f.router.remove_target(id).unwrap();
    assert_eq!(removed.display_name, "Chrome");
    assert!(f.router.channel(3).unwrap().assigned_targets.is_empty());
    assert_eq!(f.router.remove_target(id), Err(Rejection::UnknownTarget(id)));
}

#[test]
fn test_manual_target_claimed_by_refresh() {
    let mut f = Fixture::new(Vec::new());
    let id = f.router.add_manual_target("Game.exe", Some("Game".into()), Instant::now()).unwrap();
    f.router.assign_target(id, 1).unwrap();

    f.backend.set_live(vec![app("g-1", "game.exe", "Game Client", 7)]);
    f.router.refresh(Instant::now());

    assert_eq!(f.router.directory().len(), 1);
    let target = f.router.directory().get(id).unwrap();
    assert_eq!(target.live_handle, Some(LiveHandle(7)));
    assert_eq!(target.display_name, "Game");
    assert_eq!(
        f.router.add_manual_target("  ", None, Instant::now()),
        Err(Rejection::InvalidProcessName("  ".into()))
    );
}

#[test]
fn test_mapping_maintenance() {
    let mut f = Fixture::new(Vec::new());
    let entry = f.learn(Action::Volume, ChannelTarget::Channel(0), fader(16, 0));
    f.learn(Action::Mute, ChannelTarget::Channel(0), button(8));
    f.router.take_dirty();

    assert!(f.router.remove_mapping(&entry.key()).is_some());
    assert!(f.router.take_dirty());
    assert_eq!(f.router.list_mappings().len(), 1);
    assert_eq!(f.router.clear_mappings(), 1);
    assert!(f.router.list_mappings().is_empty());
}
