//! Single ownership boundary around the registry, the parameter manager and
//! the outbound transport.
//!
//! Inbound transport events and consumer calls arrive on different threads;
//! both go through one [`SharedController`] lock. Subscriber and group
//! callbacks run while that lock is held and must not call back into the
//! controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use synthlive_midi_io::{
    Address, BankProgramState, DeviceIdentity, ProgramSelection, SysExMessage, SysExTransport,
    TransportEvent,
};

use crate::error::{Error, Result};
use crate::param::{ParamId, ParamValue};
use crate::params::{ChannelFilter, ParameterManager, ParameterUpdate, SubscriberId, DEFAULT_ECHO_WINDOW};
use crate::router::{GroupCounts, SegmentGroup, SegmentReceived, SegmentRegistry};

pub type SharedController = Arc<Mutex<PerformanceController>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub identity: DeviceIdentity,
    pub groups: GroupCounts,
    pub echo_window: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            groups: GroupCounts::default(),
            echo_window: DEFAULT_ECHO_WINDOW,
        }
    }
}

pub struct PerformanceController {
    identity: DeviceIdentity,
    registry: SegmentRegistry,
    params: ParameterManager,
    transport: Box<dyn SysExTransport>,
    programs: BankProgramState,
    last_selection: Option<ProgramSelection>,
}

impl PerformanceController {
    /// Controller for the XP-50 temporary performance.
    pub fn new<T>(transport: T, options: ControllerOptions) -> Self
    where
        T: SysExTransport + 'static,
    {
        Self::with_registry(
            transport,
            SegmentRegistry::xp50(options.groups),
            options,
        )
    }

    pub fn with_registry<T>(transport: T, registry: SegmentRegistry, options: ControllerOptions) -> Self
    where
        T: SysExTransport + 'static,
    {
        Self {
            identity: options.identity,
            registry,
            params: ParameterManager::new(options.echo_window),
            transport: Box::new(transport),
            programs: BankProgramState::new(),
            last_selection: None,
        }
    }

    pub fn into_shared(self) -> SharedController {
        Arc::new(Mutex::new(self))
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn registry(&self) -> &SegmentRegistry {
        &self.registry
    }

    pub fn parameters(&self) -> &ParameterManager {
        &self.params
    }

    pub fn subscribe<F>(&mut self, filter: ChannelFilter, callback: F) -> SubscriberId
    where
        F: FnMut(&ParameterUpdate) + Send + 'static,
    {
        self.params.subscribe(filter, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> Result<()> {
        self.params.unsubscribe(id)
    }

    pub fn request_parameters<I>(&mut self, id: SubscriberId, params: I) -> Result<()>
    where
        I: IntoIterator<Item = ParamId>,
    {
        self.params
            .request_parameters(&self.registry, &*self.transport, id, params)
    }

    /// Write raw field bytes. `setter` is left out of the fan-out.
    pub fn set_parameter(
        &mut self,
        setter: Option<SubscriberId>,
        param: ParamId,
        channel: Option<u8>,
        value: &[u8],
    ) -> Result<()> {
        self.params.set_parameter(
            &mut self.registry,
            &*self.transport,
            setter,
            param,
            channel,
            value,
            Instant::now(),
        )
    }

    /// Encode `value` with the field's codec and write it.
    pub fn set_value(
        &mut self,
        setter: Option<SubscriberId>,
        param: ParamId,
        channel: Option<u8>,
        value: &ParamValue,
    ) -> Result<()> {
        let segment = self.registry.segment_for(param, channel)?;
        let field = segment.field(param)?;
        let bytes = field
            .codec()
            .encode(value, field.length())
            .ok_or_else(|| Error::Unencodable {
                param,
                value: value.clone(),
            })?;
        self.set_parameter(setter, param, channel, &bytes)
    }

    pub fn read_field(&self, param: ParamId, channel: Option<u8>) -> Result<Vec<u8>> {
        let segment = self.registry.segment_for(param, channel)?;
        Ok(segment.read_field(param)?.to_vec())
    }

    pub fn read_value(&self, param: ParamId, channel: Option<u8>) -> Result<ParamValue> {
        let segment = self.registry.segment_for(param, channel)?;
        Ok(segment.read_value(param)?)
    }

    /// Ask the device for the whole segment at `address`.
    pub fn request_segment(&self, address: Address) -> Result<()> {
        let segment = self
            .registry
            .segment(address)
            .ok_or(Error::UnknownSegment(address))?;
        self.transport
            .request_data(address, segment.len() as u32)?;
        Ok(())
    }

    /// Write the whole cached segment at `address` to the device.
    pub fn send_segment(&self, address: Address) -> Result<()> {
        let segment = self
            .registry
            .segment(address)
            .ok_or(Error::UnknownSegment(address))?;
        self.transport.send_data(address, segment.as_bytes())?;
        Ok(())
    }

    /// One data request per registered segment.
    pub fn request_all(&self) -> Result<()> {
        for segment in self.registry.segments() {
            self.transport
                .request_data(segment.address(), segment.len() as u32)?;
        }
        info!("Requested {} segments", self.registry.len());
        Ok(())
    }

    pub fn on_segment_received<F>(&mut self, group: SegmentGroup, callback: F)
    where
        F: FnMut(&SegmentReceived) + Send + 'static,
    {
        self.registry.subscribe_group(group, callback);
    }

    /// Feed one inbound transport event.
    ///
    /// Both SysEx provenances take the same path. Decode failures are logged
    /// and returned; the affected segment keeps its previous contents.
    pub fn handle_event(&mut self, event: &TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Channel(channel_event) => {
                if let Some(selection) = self.programs.apply(channel_event) {
                    debug!(
                        "Program change on channel {}: bank {:?}/{:?} patch {}",
                        selection.channel, selection.bank_msb, selection.bank_lsb, selection.program
                    );
                    self.last_selection = Some(selection);
                }
                Ok(())
            }
            TransportEvent::SysExRequested(buffer) | TransportEvent::SysExEdit(buffer) => {
                self.handle_sysex(buffer)
            }
        }
    }

    pub fn handle_sysex(&mut self, buffer: &[u8]) -> Result<()> {
        let message = match SysExMessage::parse(buffer) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding malformed SysEx ({} bytes): {}", buffer.len(), e);
                return Err(e.into());
            }
        };
        if message.identity() != self.identity {
            debug!("Ignoring SysEx for {:?}", message.identity());
            return Ok(());
        }

        if let Some(routed) = self.registry.route(&message)? {
            self.params
                .on_segment_decoded(&mut self.registry, &routed, Instant::now());
        }
        Ok(())
    }

    pub fn bank_program_state(&self) -> &BankProgramState {
        &self.programs
    }

    /// Last completed bank select + program change.
    pub fn program_selection(&self) -> Option<ProgramSelection> {
        self.last_selection
    }
}

impl std::fmt::Debug for PerformanceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceController")
            .field("identity", &self.identity)
            .field("registry", &self.registry)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use synthlive_midi_io::{ChannelEvent, OutboundMessage, RecordingTransport};

    use super::*;
    use crate::xp50::{self, CommonParameter, PartParameter};

    fn controller() -> (PerformanceController, RecordingTransport) {
        let transport = RecordingTransport::new(DeviceIdentity::default());
        let controller = PerformanceController::new(transport.clone(), ControllerOptions::default());
        (controller, transport)
    }

    #[test]
    fn test_request_all() {
        let (controller, transport) = controller();
        controller.request_all().unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 17);
        assert_eq!(requests[0], (xp50::PERFORMANCE_COMMON, xp50::COMMON_LENGTH as u32));
        assert_eq!(requests[16], (xp50::part_address(15), xp50::PART_LENGTH as u32));
    }

    #[test]
    fn test_request_and_send_segment() {
        let (controller, transport) = controller();
        controller.request_segment(xp50::part_address(4)).unwrap();
        controller.send_segment(xp50::part_address(4)).unwrap();
        assert_eq!(
            transport.sent(),
            vec![
                OutboundMessage::Request {
                    address: xp50::part_address(4),
                    length: xp50::PART_LENGTH as u32
                },
                OutboundMessage::Write {
                    address: xp50::part_address(4),
                    data: vec![0; xp50::PART_LENGTH]
                },
            ]
        );

        let unknown = Address::from_bytes([0x02, 0, 0, 0]);
        assert!(matches!(
            controller.request_segment(unknown),
            Err(Error::UnknownSegment(_))
        ));
    }

    #[test]
    fn test_handle_sysex_updates_segment() {
        let (mut controller, transport) = controller();
        let reverb = xp50::PERFORMANCE_COMMON
            .offset(CommonParameter::ReverbLevel.offset() as u32)
            .unwrap();
        let echo = transport.echo_of(reverb, &[0x50]).unwrap();
        controller
            .handle_event(&TransportEvent::SysExEdit(echo))
            .unwrap();
        assert_eq!(
            controller
                .read_value(CommonParameter::ReverbLevel.into(), None)
                .unwrap(),
            ParamValue::Number(0x50)
        );
    }

    #[test]
    fn test_foreign_device_ignored() {
        let (mut controller, _) = controller();
        let other = RecordingTransport::new(DeviceIdentity::new(0x11, 0x6A));
        let buffer = other.echo_of(xp50::part_address(0), &[1; xp50::PART_LENGTH]).unwrap();
        controller.handle_sysex(&buffer).unwrap();
        assert_eq!(
            controller.read_field(PartParameter::ReceiveSwitch.into(), Some(0)).unwrap(),
            vec![0]
        );
    }

    #[test]
    fn test_malformed_sysex_reported() {
        let (mut controller, _) = controller();
        let err = controller.handle_sysex(&[0xF0, 0x41, 0xF7]).unwrap_err();
        assert!(matches!(err, Error::SysEx(_)));
    }

    #[test]
    fn test_set_value_encodes_with_codec() {
        let (mut controller, transport) = controller();
        controller
            .set_value(
                None,
                CommonParameter::PerformanceName.into(),
                None,
                &ParamValue::Text("Live Set".to_string()),
            )
            .unwrap();
        let writes = transport.writes();
        assert_eq!(writes[0].0, xp50::PERFORMANCE_COMMON);
        assert_eq!(&writes[0].1, b"Live Set    ");

        let err = controller
            .set_value(
                None,
                CommonParameter::PerformanceTempo.into(),
                None,
                &ParamValue::Number(4096),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Unencodable { .. }));
    }

    #[test]
    fn test_program_selection() {
        let (mut controller, _) = controller();
        for event in [
            ChannelEvent::control_change(0, 0x00, 81),
            ChannelEvent::control_change(0, 0x20, 3),
            ChannelEvent::program_change(0, 12),
        ] {
            controller.handle_event(&TransportEvent::Channel(event)).unwrap();
        }
        let selection = controller.program_selection().unwrap();
        assert_eq!(selection.bank_msb, Some(81));
        assert_eq!(selection.bank_lsb, Some(3));
        assert_eq!(selection.program, 12);
    }
}
