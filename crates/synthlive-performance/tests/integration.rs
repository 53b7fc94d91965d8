//! Integration tests for synthlive-performance.
//!
//! These drive the controller end to end through a [`RecordingTransport`],
//! feeding back the DT1 messages a device would send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use synthlive_midi_io::{Address, DeviceIdentity, RecordingTransport, SysExTransport, TransportEvent};
use synthlive_performance::{
    xp50, CommonParameter, ControllerOptions, Editor, EditorChange, Error, GroupCounts, ParamId,
    PartParameter, PerformanceController, SegmentGroup, SharedController,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn setup() -> (SharedController, RecordingTransport) {
    init_tracing();
    let transport = RecordingTransport::new(DeviceIdentity::default());
    let controller =
        PerformanceController::new(transport.clone(), ControllerOptions::default()).into_shared();
    (controller, transport)
}

fn device_sends(controller: &SharedController, transport: &RecordingTransport, address: Address, data: &[u8]) {
    let buffer = transport.echo_of(address, data).unwrap();
    controller
        .lock()
        .handle_event(&TransportEvent::SysExRequested(buffer))
        .unwrap();
}

// ---------------------------------------------------------------------------
// 1. Startup synchronisation
// ---------------------------------------------------------------------------

/// Editors start from the zeroed cache, then pick up the device's answer.
#[test]
fn test_editor_follows_device_response() {
    let (controller, transport) = setup();
    let editor = Editor::attach(&controller, 3).unwrap();
    editor.take_changes();

    let mut common = vec![0; xp50::COMMON_LENGTH];
    common[0x2D] = 0x07;
    common[0x2E] = 0x08;
    device_sends(&controller, &transport, xp50::PERFORMANCE_COMMON, &common);

    let mut part = vec![0; xp50::PART_LENGTH];
    part[PartParameter::PartLevel.offset()] = 100;
    part[PartParameter::ReverbSendLevel.offset()] = 40;
    device_sends(&controller, &transport, xp50::part_address(3), &part);

    assert_eq!(editor.tempo(), Some(120));
    assert_eq!(editor.part(PartParameter::PartLevel), Some(100));
    assert_eq!(editor.part(PartParameter::ReverbSendLevel), Some(40));
    assert_eq!(editor.part(PartParameter::ChorusSendLevel), Some(0));

    let changes = editor.take_changes();
    assert_eq!(changes.len(), 3);
    assert_eq!(
        changes[0],
        EditorChange {
            param: CommonParameter::PerformanceTempo.into(),
            channel: None,
            value: 120
        }
    );
}

/// Data for another part never reaches an editor.
#[test]
fn test_editor_ignores_other_parts() {
    let (controller, transport) = setup();
    let editor = Editor::attach(&controller, 0).unwrap();
    editor.take_changes();

    device_sends(&controller, &transport, xp50::part_address(1), &[0x33; xp50::PART_LENGTH]);

    assert!(editor.take_changes().is_empty());
    assert_eq!(editor.part(PartParameter::PartLevel), Some(0));
}

// ---------------------------------------------------------------------------
// 2. Local writes and echoes
// ---------------------------------------------------------------------------

/// Setting tempo 100 sends `06 04` to 01 00 00 2D and survives the echo.
#[test]
fn test_set_tempo_round_trip() {
    let (controller, transport) = setup();
    let editor = Editor::attach(&controller, 0).unwrap();
    let watcher = Editor::attach(&controller, 9).unwrap();
    editor.take_changes();
    watcher.take_changes();
    transport.take();

    editor.set_tempo(100).unwrap();
    let writes = transport.writes();
    assert_eq!(
        writes,
        vec![(Address::from_bytes([0x01, 0x00, 0x00, 0x2D]), vec![0x06, 0x04])]
    );

    device_sends(&controller, &transport, writes[0].0, &writes[0].1);

    assert_eq!(editor.tempo(), Some(100));
    assert_eq!(watcher.tempo(), Some(100));
    assert_eq!(editor.take_changes().len(), 1);
    assert_eq!(watcher.take_changes().len(), 1);
    assert_eq!(controller.lock().parameters().pending_echoes(), 0);
}

/// Two quick writes: the first echo must not pull the editor back.
#[test]
fn test_rapid_writes_keep_latest_value() {
    let (controller, transport) = setup();
    let editor = Editor::attach(&controller, 0).unwrap();
    let watcher = Editor::attach(&controller, 0).unwrap();
    transport.take();

    editor.set_own_part(PartParameter::PartLevel, 90).unwrap();
    editor.set_own_part(PartParameter::PartLevel, 91).unwrap();
    watcher.take_changes();

    let writes = transport.writes();
    device_sends(&controller, &transport, writes[0].0, &writes[0].1);

    assert_eq!(editor.part(PartParameter::PartLevel), Some(91));
    assert_eq!(watcher.part(PartParameter::PartLevel), Some(91));
    assert!(watcher.take_changes().is_empty());
    assert_eq!(
        controller
            .lock()
            .read_field(PartParameter::PartLevel.into(), Some(0))
            .unwrap(),
        vec![91]
    );
}

/// A front-panel edit after a local write wins.
#[test]
fn test_front_panel_edit_overrides_local_write() {
    let (controller, transport) = setup();
    let editor = Editor::attach(&controller, 2).unwrap();
    editor.set_own_part(PartParameter::ChorusSendLevel, 64).unwrap();
    editor.take_changes();

    let address = xp50::part_address(2)
        .offset(PartParameter::ChorusSendLevel.offset() as u32)
        .unwrap();
    let buffer = transport.echo_of(address, &[20]).unwrap();
    controller
        .lock()
        .handle_event(&TransportEvent::SysExEdit(buffer))
        .unwrap();

    assert_eq!(editor.part(PartParameter::ChorusSendLevel), Some(20));
    assert_eq!(editor.take_changes().len(), 1);
}

/// Two editors with different home channels can both address one part.
#[test]
fn test_set_part_on_foreign_channel() {
    let (controller, transport) = setup();
    let a = Editor::attach(&controller, 0).unwrap();
    let b = Editor::attach(&controller, 4).unwrap();
    b.take_changes();
    transport.take();

    a.set_part(PartParameter::ReverbSendLevel, 4, 300).unwrap();

    assert_eq!(b.part(PartParameter::ReverbSendLevel), Some(127));
    assert_eq!(a.part(PartParameter::ReverbSendLevel), Some(0));
    assert_eq!(
        transport.writes()[0].0,
        xp50::part_address(4).offset(0x0D).unwrap()
    );
}

// ---------------------------------------------------------------------------
// 3. Error paths
// ---------------------------------------------------------------------------

/// A short full-segment payload at an offset past the end is rejected and logged,
/// and the segment keeps its bytes.
#[test]
fn test_overrunning_payload_is_rejected() {
    let (controller, transport) = setup();
    device_sends(&controller, &transport, xp50::part_address(7), &[0x10; xp50::PART_LENGTH]);

    let address = xp50::part_address(7).offset(0x10).unwrap();
    let buffer = transport.echo_of(address, &[0x7F; 0x10]).unwrap();
    let err = controller
        .lock()
        .handle_event(&TransportEvent::SysExEdit(buffer))
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));

    let level = controller
        .lock()
        .read_field(PartParameter::TransmitVolume.into(), Some(7))
        .unwrap();
    assert_eq!(level, vec![0x10]);
}

#[test]
fn test_write_length_mismatch_sends_nothing() {
    let (controller, transport) = setup();
    transport.take();
    let tempo: ParamId = CommonParameter::PerformanceTempo.into();

    let err = controller
        .lock()
        .set_parameter(None, tempo, None, &[0x06, 0x04, 0x00])
        .unwrap_err();
    assert!(matches!(err, Error::Segment(_)));
    assert!(transport.sent().is_empty());
    assert_eq!(controller.lock().read_field(tempo, None).unwrap(), vec![0, 0]);
}

// ---------------------------------------------------------------------------
// 4. Group notifications and threading
// ---------------------------------------------------------------------------

#[test]
fn test_group_notifications() {
    let transport = RecordingTransport::new(DeviceIdentity::default());
    let options = ControllerOptions {
        groups: GroupCounts {
            song_channels: 4,
            fast_channels: 4,
        },
        ..ControllerOptions::default()
    };
    let controller = PerformanceController::new(transport.clone(), options).into_shared();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for group in [SegmentGroup::Song, SegmentGroup::Fast] {
        let seen = seen.clone();
        controller
            .lock()
            .on_segment_received(group, move |event| seen.lock().push((event.group, event.target)));
    }

    for part in [1u8, 5, 12] {
        device_sends(&controller, &transport, xp50::part_address(part), &[0; xp50::PART_LENGTH]);
    }
    device_sends(&controller, &transport, xp50::PERFORMANCE_COMMON, &[0x20; 12]);

    assert_eq!(
        *seen.lock(),
        vec![
            (SegmentGroup::Song, 1),
            (SegmentGroup::Fast, 5),
            (SegmentGroup::Song, 16),
        ]
    );
}

/// Inbound events handled on another thread reach an editor on this one.
#[test]
fn test_dispatch_from_another_thread() {
    let (controller, transport) = setup();
    let editor = Editor::attach(&controller, 0).unwrap();
    editor.take_changes();

    let (tx, rx) = unbounded::<TransportEvent>();
    let worker = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            for event in rx {
                let _ = controller.lock().handle_event(&event);
            }
        })
    };

    let address = xp50::PERFORMANCE_COMMON.offset(0x2D).unwrap();
    tx.send(TransportEvent::SysExEdit(transport.echo_of(address, &[0x08, 0x0C]).unwrap()))
        .unwrap();
    drop(tx);
    worker.join().unwrap();

    let change = editor.changes().recv().unwrap();
    assert_eq!(change.value, 140);
    assert_eq!(editor.tempo(), Some(140));
}

/// Recording transport whose output can be unplugged.
#[derive(Clone)]
struct PluggableTransport {
    inner: RecordingTransport,
    online: Arc<AtomicBool>,
}

impl SysExTransport for PluggableTransport {
    fn request_data(&self, address: Address, length: u32) -> synthlive_midi_io::Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(synthlive_midi_io::Error::NotConnected);
        }
        self.inner.request_data(address, length)
    }

    fn send_data(&self, address: Address, data: &[u8]) -> synthlive_midi_io::Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(synthlive_midi_io::Error::NotConnected);
        }
        self.inner.send_data(address, data)
    }
}

/// A write the link refuses changes nothing: both editors keep agreeing.
#[test]
fn test_refused_write_keeps_editors_in_agreement() {
    init_tracing();
    let transport = PluggableTransport {
        inner: RecordingTransport::new(DeviceIdentity::default()),
        online: Arc::new(AtomicBool::new(true)),
    };
    let controller =
        PerformanceController::new(transport.clone(), ControllerOptions::default()).into_shared();
    let a = Editor::attach(&controller, 0).unwrap();
    let b = Editor::attach(&controller, 0).unwrap();
    b.take_changes();

    transport.online.store(false, Ordering::SeqCst);
    assert!(a.set_tempo(100).is_err());

    assert_eq!(a.tempo(), b.tempo());
    assert_eq!(a.tempo(), Some(0));
    assert!(b.take_changes().is_empty());
    let tempo: ParamId = CommonParameter::PerformanceTempo.into();
    assert_eq!(
        controller.lock().read_value(tempo, None).unwrap().as_number(),
        Some(0)
    );
    assert!(transport.inner.writes().is_empty());
}

/// Local writes racing front-panel edits never leave the editor showing a
/// value the segment does not hold.
#[test]
fn test_concurrent_edits_leave_cache_consistent() {
    let (controller, transport) = setup();
    let editor = Arc::new(Editor::attach(&controller, 0).unwrap());
    let address = xp50::PERFORMANCE_COMMON.offset(0x2D).unwrap();

    let panel = {
        let controller = Arc::clone(&controller);
        let transport = transport.clone();
        thread::spawn(move || {
            for tempo in (150u32..250).cycle().take(500) {
                let bytes = [(tempo >> 4) as u8, (tempo & 0x0F) as u8];
                let buffer = transport.echo_of(address, &bytes).unwrap();
                let _ = controller.lock().handle_event(&TransportEvent::SysExEdit(buffer));
            }
        })
    };
    let local = {
        let editor = Arc::clone(&editor);
        thread::spawn(move || {
            for tempo in (20i64..120).cycle().take(500) {
                editor.set_tempo(tempo).unwrap();
            }
        })
    };
    panel.join().unwrap();
    local.join().unwrap();

    let tempo: ParamId = CommonParameter::PerformanceTempo.into();
    let segment_value = controller.lock().read_value(tempo, None).unwrap().as_number();
    assert_eq!(editor.tempo(), segment_value);
}
