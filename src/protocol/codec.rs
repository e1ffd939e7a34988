//! Encoding of gateway -> host frames, and the matching host side decoders

use crate::channel::{is_extended_id, CanFrame};

use super::{Command, ResultCode, FRAME_HEADER, HEADER_SIZE, MAX_CAN_DATA_LENGTH};

/// Formats a received CAN frame into the host wire format.
///
/// Every CAN frame becomes exactly one host frame. No reassembly is done on this
/// path, the host is responsible for any higher level protocol on top.
pub fn encode_can_frame(frame: &CanFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 7 + MAX_CAN_DATA_LENGTH);
    buf.extend_from_slice(&FRAME_HEADER);
    buf.push(Command::ReceiveRawCanFrame as u8);
    buf.extend_from_slice(&frame.id().to_be_bytes());
    buf.push(frame.is_rtr() as u8);
    buf.push(frame.dlc());
    buf.extend_from_slice(frame.data());
    buf
}

/// Builds the response frame for a host command
pub fn encode_response(command: u8, result: ResultCode) -> [u8; HEADER_SIZE + 3] {
    [
        FRAME_HEADER[0],
        FRAME_HEADER[1],
        FRAME_HEADER[2],
        Command::AckNak as u8,
        command,
        result as u8,
    ]
}

/// Host side inverse of [encode_can_frame].
///
/// Returns `None` if the buffer is not a complete forwarded CAN frame.
/// The extended flag is not on the wire, and is derived from the identifier.
pub fn decode_can_frame(buf: &[u8]) -> Option<CanFrame> {
    let body = buf.strip_prefix(&FRAME_HEADER)?;
    if body.len() < 7 || body[0] != Command::ReceiveRawCanFrame as u8 {
        return None;
    }
    let id = u32::from_be_bytes([body[1], body[2], body[3], body[4]]);
    let rtr = body[5] != 0;
    let dlc = body[6] as usize;
    if dlc > MAX_CAN_DATA_LENGTH || body.len() < 7 + dlc {
        return None;
    }
    Some(CanFrame::new(id, &body[7..7 + dlc], is_extended_id(id)).with_rtr(rtr))
}

/// Host side decoder for response frames. Returns the original command byte and
/// the result code
pub fn decode_response(buf: &[u8]) -> Option<(u8, ResultCode)> {
    match buf.strip_prefix(&FRAME_HEADER)? {
        [ack, cmd, code, ..] if *ack == Command::AckNak as u8 => {
            Some((*cmd, ResultCode::from_repr(*code)?))
        }
        _ => None,
    }
}
