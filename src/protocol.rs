use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actuator::{ActuatorError, ThrusterIndex, ThrusterOutput};
use crate::frame::{self, FloatByteOrder, Frame, FrameError, OutboundFrame, OversizedFrame, Payload};
use crate::watchdog::ControlState;

/// Type codes carried in byte 2 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandType {
    Ack = 0x00,
    Nack = 0x01,
    GetKillStatus = 0x02,
    KillStatus = 0x03,
    Heartbeat = 0x04,
    SetKill = 0x05,
    ClearKill = 0x06,
    SetThruster = 0x07,
}

impl CommandType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandType {
    type Error = CommandError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x00 => Ok(CommandType::Ack),
            0x01 => Ok(CommandType::Nack),
            0x02 => Ok(CommandType::GetKillStatus),
            0x03 => Ok(CommandType::KillStatus),
            0x04 => Ok(CommandType::Heartbeat),
            0x05 => Ok(CommandType::SetKill),
            0x06 => Ok(CommandType::ClearKill),
            0x07 => Ok(CommandType::SetThruster),
            other => Err(CommandError::UnknownType(other)),
        }
    }
}

/// Which kill transition 0x05 and 0x06 perform.
///
/// Deployed counterparts expect 0x05 to clear the kill and 0x06 to set it,
/// the reverse of the command names. `Named` follows the names instead and is
/// not wire compatible with those counterparts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSemantics {
    #[default]
    WireCompatible,
    Named,
}

impl KillSemantics {
    /// Kill flag a command leaves behind under these semantics.
    fn target(self, command: Command) -> Option<bool> {
        match (self, command) {
            (KillSemantics::WireCompatible, Command::SetKill)
            | (KillSemantics::Named, Command::ClearKill) => Some(false),
            (KillSemantics::WireCompatible, Command::ClearKill)
            | (KillSemantics::Named, Command::SetKill) => Some(true),
            _ => None,
        }
    }
}

impl core::str::FromStr for KillSemantics {
    type Err = alloc::string::String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wire_compatible" | "wire" => Ok(KillSemantics::WireCompatible),
            "named" => Ok(KillSemantics::Named),
            other => Err(alloc::format!("unknown kill semantics '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown type code {0:#04x}")]
    UnknownType(u8),
    #[error("{command:?} frame has wrong length {len}")]
    BadLength { command: CommandType, len: usize },
    #[error("type 0x04 frame is not the heartbeat sequence")]
    NotHeartbeat,
    #[error("{0:?} is a response type, not a command")]
    ResponseType(CommandType),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

impl CommandError {
    /// Semantic faults are answered with a NACK; everything else is dropped.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            CommandError::Actuator(_)
                | CommandError::BadLength {
                    command: CommandType::SetThruster,
                    ..
                }
        )
    }
}

/// A decoded, range-checked command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    GetKillStatus,
    Heartbeat,
    SetKill,
    ClearKill,
    SetThruster {
        index: ThrusterIndex,
        output: ThrusterOutput,
    },
    /// An ACK or NACK arriving from the controller.
    Passthrough,
}

const FIXED_FRAME_LEN: usize = frame::MIN_FRAME_SIZE;
const SET_THRUSTER_LEN: usize = frame::MAX_FRAME_SIZE;

impl Command {
    pub fn decode(frame: &Frame<'_>, byte_order: FloatByteOrder) -> Result<Self, CommandError> {
        let command = CommandType::try_from(frame.type_code())?;
        match command {
            CommandType::Heartbeat if frame::is_heartbeat(frame.as_bytes()) => Ok(Command::Heartbeat),
            CommandType::SetThruster if frame.len() == SET_THRUSTER_LEN => {
                let payload = frame.payload();
                let index = ThrusterIndex::new(payload[0])?;
                let raw = [payload[1], payload[2], payload[3], payload[4]];
                let output = ThrusterOutput::new(byte_order.decode(raw))?;
                Ok(Command::SetThruster { index, output })
            }
            _ => Self::decode_shape(command, frame.len()),
        }
    }

    /// Decode from the type code and frame length alone. Covers every frame
    /// whose outcome does not depend on payload bytes.
    fn decode_shape(command: CommandType, len: usize) -> Result<Self, CommandError> {
        let fixed = |decoded: Command| {
            if len == FIXED_FRAME_LEN {
                Ok(decoded)
            } else {
                Err(CommandError::BadLength { command, len })
            }
        };

        match command {
            CommandType::Ack | CommandType::Nack => Ok(Command::Passthrough),
            CommandType::GetKillStatus => fixed(Command::GetKillStatus),
            CommandType::SetKill => fixed(Command::SetKill),
            CommandType::ClearKill => fixed(Command::ClearKill),
            CommandType::Heartbeat => Err(CommandError::NotHeartbeat),
            CommandType::SetThruster => Err(CommandError::BadLength { command, len }),
            CommandType::KillStatus => Err(CommandError::ResponseType(command)),
        }
    }
}

/// What the engine answers with. Every variant becomes a checksummed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ack,
    Nack,
    KillStatus { killed: bool },
}

impl Response {
    pub fn to_frame(self) -> OutboundFrame {
        let mut payload = Payload::new();
        let command = match self {
            Response::Ack => CommandType::Ack,
            Response::Nack => CommandType::Nack,
            Response::KillStatus { killed } => {
                payload.push(u8::from(killed));
                CommandType::KillStatus
            }
        };
        frame::encode_payload(command.code(), &payload)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub datagrams_processed: u32,
    pub too_short: u32,
    pub bad_header: u32,
    pub bad_checksum: u32,
    pub unknown_type: u32,
    pub dropped_commands: u32,
    pub heartbeats: u32,
    pub acks_sent: u32,
    pub nacks_sent: u32,
    pub kill_status_sent: u32,
}

impl ProtocolStats {
    fn record_frame_error(&mut self, error: &FrameError) {
        match error {
            FrameError::TooShort { .. } => self.too_short = self.too_short.saturating_add(1),
            FrameError::BadHeader(..) => self.bad_header = self.bad_header.saturating_add(1),
            FrameError::BadChecksum { .. } => {
                self.bad_checksum = self.bad_checksum.saturating_add(1);
            }
        }
    }

    fn record_response(&mut self, response: Response) {
        let counter = match response {
            Response::Ack => &mut self.acks_sent,
            Response::Nack => &mut self.nacks_sent,
            Response::KillStatus { .. } => &mut self.kill_status_sent,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn frames_dropped(&self) -> u32 {
        self.too_short
            .saturating_add(self.bad_header)
            .saturating_add(self.bad_checksum)
            .saturating_add(self.unknown_type)
            .saturating_add(self.dropped_commands)
    }
}

/// Validates one datagram and applies it to the control state.
#[derive(Debug)]
pub struct ProtocolHandler {
    byte_order: FloatByteOrder,
    kill_semantics: KillSemantics,
    stats: ProtocolStats,
}

impl ProtocolHandler {
    pub fn new(byte_order: FloatByteOrder, kill_semantics: KillSemantics) -> Self {
        Self {
            byte_order,
            kill_semantics,
            stats: ProtocolStats::default(),
        }
    }

    /// Handle one staged datagram. `None` means no response is sent, which is
    /// the outcome for heartbeats, framing faults and unknown type codes.
    pub fn handle(
        &mut self,
        datagram: &[u8],
        control: &mut ControlState,
        now: Instant,
    ) -> Option<Response> {
        self.stats.datagrams_processed = self.stats.datagrams_processed.saturating_add(1);

        // The heartbeat trailer does not satisfy the codec, so match it first.
        if frame::is_heartbeat(datagram) {
            self.apply_heartbeat(control, now);
            return None;
        }

        match Frame::parse(datagram) {
            Ok(frame) => {
                let decoded = Command::decode(&frame, self.byte_order);
                self.dispatch(decoded, control, now)
            }
            Err(e) => self.drop_frame(&e),
        }
    }

    /// Handle a datagram that was too long to stage. It can never be a
    /// well-formed command, but a checksummed SetThruster or ACK/NACK frame
    /// is still answered the way a shorter malformed one would be.
    pub fn handle_oversized(
        &mut self,
        parsed: Result<OversizedFrame, FrameError>,
        control: &mut ControlState,
        now: Instant,
    ) -> Option<Response> {
        self.stats.datagrams_processed = self.stats.datagrams_processed.saturating_add(1);

        match parsed {
            Ok(frame) => {
                let decoded = CommandType::try_from(frame.type_code())
                    .and_then(|command| Command::decode_shape(command, frame.len()));
                self.dispatch(decoded, control, now)
            }
            Err(e) => self.drop_frame(&e),
        }
    }

    fn drop_frame(&mut self, error: &FrameError) -> Option<Response> {
        debug!("Dropping datagram: {}", error);
        self.stats.record_frame_error(error);
        None
    }

    fn dispatch(
        &mut self,
        decoded: Result<Command, CommandError>,
        control: &mut ControlState,
        now: Instant,
    ) -> Option<Response> {
        let response = match decoded {
            Ok(command) => self.execute(command, control, now),
            Err(e) if e.is_semantic() => {
                warn!("Rejecting command: {}", e);
                Some(Response::Nack)
            }
            Err(e @ CommandError::UnknownType(_)) => {
                debug!("Ignoring frame: {}", e);
                self.stats.unknown_type = self.stats.unknown_type.saturating_add(1);
                None
            }
            Err(e) => {
                debug!("Dropping command: {}", e);
                self.stats.dropped_commands = self.stats.dropped_commands.saturating_add(1);
                None
            }
        };

        if let Some(response) = response {
            self.stats.record_response(response);
        }
        response
    }

    /// Heartbeat effect shared by the staging path and the dispatch path.
    pub fn apply_heartbeat(&mut self, control: &mut ControlState, now: Instant) {
        self.stats.heartbeats = self.stats.heartbeats.saturating_add(1);
        if control.heartbeat(now) {
            info!("Heartbeat received, thrusters re-armed");
        }
    }

    fn execute(
        &mut self,
        command: Command,
        control: &mut ControlState,
        now: Instant,
    ) -> Option<Response> {
        match command {
            Command::GetKillStatus => Some(Response::KillStatus {
                killed: control.actuators.is_killed(),
            }),
            Command::Heartbeat => {
                self.apply_heartbeat(control, now);
                None
            }
            Command::SetKill | Command::ClearKill => {
                let target = self.kill_semantics.target(command)?;
                Some(Self::transition_kill(control, target))
            }
            Command::SetThruster { index, output } => {
                if !control.actuators.command(index, output) {
                    debug!(
                        "Thruster {} command {} accepted but discarded while killed",
                        index.get(),
                        output.get()
                    );
                }
                Some(Response::Ack)
            }
            Command::Passthrough => Some(Response::Nack),
        }
    }

    /// ACK when the kill flag changed, NACK when it was already at `target`.
    fn transition_kill(control: &mut ControlState, target: bool) -> Response {
        if control.actuators.is_killed() == target {
            return Response::Nack;
        }
        if target {
            control.actuators.kill();
            info!("Kill asserted by command");
        } else {
            control.actuators.arm();
            info!("Kill cleared by command");
        }
        Response::Ack
    }

    pub fn stats(&self) -> &ProtocolStats {
        &self.stats
    }

    pub fn byte_order(&self) -> FloatByteOrder {
        self.byte_order
    }

    pub fn kill_semantics(&self) -> KillSemantics {
        self.kill_semantics
    }
}

/// Build a request frame for a controller-side caller.
pub fn encode_command(command: Command, byte_order: FloatByteOrder) -> OutboundFrame {
    let mut payload = Payload::new();
    let kind = match command {
        Command::Heartbeat => return frame::HEARTBEAT_FRAME.iter().copied().collect(),
        Command::GetKillStatus => CommandType::GetKillStatus,
        Command::SetKill => CommandType::SetKill,
        Command::ClearKill => CommandType::ClearKill,
        Command::Passthrough => CommandType::Ack,
        Command::SetThruster { index, output } => {
            payload.push(index.get());
            payload.extend(byte_order.encode(output.get()));
            CommandType::SetThruster
        }
    };
    frame::encode_payload(kind.code(), &payload)
}
