// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::io;
use std::io::Read as StdRead;

use byteorder::LittleEndian as LE;
use byteorder::ReadBytesExt;

use crate::consts::{CapabilityFlags, ColumnFlags, ColumnType, StatusFlags};
use crate::error::DriverError::UnsupportedType;
use crate::error::Error;
use crate::error::Result as MyResult;
use crate::io::Read;

/// Payload length below which a leading 0xfe byte means EOF.
pub const EOF_PACKET_MAX_LEN: usize = 9;

pub fn is_eof_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == 0xfe && payload.len() < EOF_PACKET_MAX_LEN
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: StatusFlags,
    pub warnings: u16,
    pub info: Vec<u8>,
}

impl OkPacket {
    pub fn from_payload(pld: &[u8]) -> io::Result<OkPacket> {
        let mut reader = pld;
        reader.read_u8()?;
        let affected_rows = reader.read_lenenc_int()?;
        let last_insert_id = reader.read_lenenc_int()?;
        let status_flags = StatusFlags::from_bits_truncate(reader.read_u16::<LE>()?);
        let warnings = reader.read_u16::<LE>()?;
        let mut info = Vec::new();
        reader.read_to_end(&mut info)?;
        Ok(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: Vec<u8>,
    pub error_message: Vec<u8>,
}

impl ErrPacket {
    pub fn from_payload(pld: &[u8]) -> io::Result<ErrPacket> {
        let mut reader = pld;
        reader.read_u8()?;
        let error_code = reader.read_u16::<LE>()?;
        let mut sql_state = Vec::with_capacity(5);
        // protocol 4.1 carries a '#' marker followed by a 5-byte sqlstate
        if reader.first() == Some(&b'#') {
            reader.read_u8()?;
            sql_state = vec![0u8; 5];
            reader.read_exact(&mut sql_state)?;
        }
        let mut error_message = Vec::new();
        reader.read_to_end(&mut error_message)?;
        Ok(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }
}

impl From<ErrPacket> for Error {
    fn from(err: ErrPacket) -> Error {
        Error::MySqlError(crate::error::MySqlError {
            code: err.error_code,
            state: String::from_utf8_lossy(&err.sql_state).into_owned(),
            message: String::from_utf8_lossy(&err.error_message).into_owned(),
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: StatusFlags,
}

impl EofPacket {
    pub fn from_payload(pld: &[u8]) -> io::Result<EofPacket> {
        let mut reader = pld;
        reader.read_u8()?;
        Ok(EofPacket {
            warnings: reader.read_u16::<LE>()?,
            status_flags: StatusFlags::from_bits_truncate(reader.read_u16::<LE>()?),
        })
    }
}

/// Initial greeting (protocol handshake v10).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: Vec<u8>,
    pub connection_id: u32,
    pub scramble: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub character_set: u8,
    pub status_flags: StatusFlags,
}

impl HandshakePacket {
    pub fn from_payload(pld: &[u8]) -> io::Result<HandshakePacket> {
        let mut reader = pld;
        let protocol_version = reader.read_u8()?;
        let server_version = reader.read_to_null()?;
        let connection_id = reader.read_u32::<LE>()?;
        let mut scramble = vec![0u8; 8];
        reader.read_exact(&mut scramble)?;
        // filler
        reader.read_u8()?;
        let lower_cf = reader.read_u16::<LE>()?;
        let mut capability_flags = CapabilityFlags::from_bits_truncate(lower_cf as u32);
        let mut character_set = 0u8;
        let mut status_flags = StatusFlags::empty();
        if !reader.is_empty() {
            character_set = reader.read_u8()?;
            status_flags = StatusFlags::from_bits_truncate(reader.read_u16::<LE>()?);
            let upper_cf = reader.read_u16::<LE>()?;
            capability_flags
                .insert(CapabilityFlags::from_bits_truncate((upper_cf as u32) << 16));
            let scramble_len = reader.read_u8()? as usize;
            let mut reserved = [0u8; 10];
            reader.read_exact(&mut reserved)?;
            if capability_flags.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
                let tail_len = std::cmp::max(scramble_len.saturating_sub(8), 13);
                let mut tail = vec![0u8; tail_len];
                reader.read_exact(&mut tail)?;
                scramble.extend_from_slice(&tail);
            }
        }
        while scramble.last() == Some(&0u8) {
            scramble.pop();
        }
        scramble.truncate(20);
        Ok(HandshakePacket {
            protocol_version,
            server_version,
            connection_id,
            scramble,
            capability_flags,
            character_set,
            status_flags,
        })
    }
}

/// First packet of a COM_STMT_PREPARE response.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StmtPrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warning_count: u16,
}

impl StmtPrepareOk {
    pub fn from_payload(pld: &[u8]) -> io::Result<StmtPrepareOk> {
        let mut reader = pld;
        reader.read_u8()?;
        let statement_id = reader.read_u32::<LE>()?;
        let num_columns = reader.read_u16::<LE>()?;
        let num_params = reader.read_u16::<LE>()?;
        // filler
        reader.read_u8()?;
        let warning_count = reader.read_u16::<LE>()?;
        Ok(StmtPrepareOk {
            statement_id,
            num_columns,
            num_params,
            warning_count,
        })
    }
}

/// Column definition.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Column {
    pub catalog: Vec<u8>,
    pub schema: Vec<u8>,
    pub table: Vec<u8>,
    pub org_table: Vec<u8>,
    pub name: Vec<u8>,
    pub org_name: Vec<u8>,
    pub character_set: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl Column {
    pub fn from_payload(pld: &[u8]) -> MyResult<Column> {
        let mut reader = pld;
        let catalog = reader.read_lenenc_bytes()?;
        let schema = reader.read_lenenc_bytes()?;
        let table = reader.read_lenenc_bytes()?;
        let org_table = reader.read_lenenc_bytes()?;
        let name = reader.read_lenenc_bytes()?;
        let org_name = reader.read_lenenc_bytes()?;
        // length of the fixed-size block
        reader.read_lenenc_int()?;
        let character_set = reader.read_u16::<LE>()?;
        let column_length = reader.read_u32::<LE>()?;
        let type_code = reader.read_u8()?;
        let column_type =
            ColumnType::from_u8(type_code).map_err(|x| Error::DriverError(UnsupportedType(x)))?;
        let flags = ColumnFlags::from_bits_truncate(reader.read_u16::<LE>()?);
        let decimals = reader.read_u8()?;
        Ok(Column {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            character_set,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{is_eof_packet, Column, EofPacket, ErrPacket, HandshakePacket, OkPacket,
                StmtPrepareOk};
    use crate::consts::{CapabilityFlags, ColumnType, StatusFlags};

    #[test]
    fn should_parse_ok_packet() {
        let payload = [0u8, 1u8, 2u8, 8u8, 0u8, 4u8, 0u8, 32u8];
        let ok_packet = OkPacket::from_payload(&payload).unwrap();
        assert_eq!(ok_packet.affected_rows, 1);
        assert_eq!(ok_packet.last_insert_id, 2);
        assert_eq!(
            ok_packet.status_flags,
            StatusFlags::SERVER_MORE_RESULTS_EXISTS
        );
        assert_eq!(ok_packet.warnings, 4);
        assert_eq!(ok_packet.info, vec![32u8]);
    }

    #[test]
    fn should_parse_err_packet() {
        let payload = [
            255u8, 1u8, 0u8, 35u8, 51u8, 68u8, 48u8, 48u8, 48u8, 32u8, 32u8,
        ];
        let err_packet = ErrPacket::from_payload(&payload).unwrap();
        assert_eq!(err_packet.error_code, 1);
        assert_eq!(err_packet.sql_state, b"3D000");
        assert_eq!(err_packet.error_message, vec![32u8, 32u8]);
    }

    #[test]
    fn should_parse_err_packet_without_sqlstate() {
        let payload = b"\xff\x48\x04no tables used";
        let err_packet = ErrPacket::from_payload(payload).unwrap();
        assert_eq!(err_packet.error_code, 1096);
        assert!(err_packet.sql_state.is_empty());
        assert_eq!(err_packet.error_message, b"no tables used");
    }

    #[test]
    fn should_parse_eof_packet() {
        let payload = [0xfe_u8, 1u8, 0u8, 8u8, 0u8];
        assert!(is_eof_packet(&payload));
        let eof_packet = EofPacket::from_payload(&payload).unwrap();
        assert_eq!(eof_packet.warnings, 1);
        assert_eq!(
            eof_packet.status_flags,
            StatusFlags::SERVER_MORE_RESULTS_EXISTS
        );
    }

    #[test]
    fn row_starting_with_0xfe_is_not_eof() {
        let payload = [0xfe_u8; 9];
        assert!(!is_eof_packet(&payload));
    }

    #[test]
    fn should_parse_short_handshake_packet() {
        let payload = b"\x0a5.6.4\x00\x01\x00\x00\x00\x01\x02\x03\x04\x05\x06\x07\x08\x00\x04\x80";
        let hp = HandshakePacket::from_payload(payload).unwrap();
        assert_eq!(hp.protocol_version, 0x0a);
        assert_eq!(hp.server_version, b"5.6.4");
        assert_eq!(hp.connection_id, 1);
        assert_eq!(hp.scramble, vec![1u8, 2u8, 3u8, 4u8, 5u8, 6u8, 7u8, 8u8]);
        assert_eq!(
            hp.capability_flags,
            CapabilityFlags::CLIENT_SECURE_CONNECTION | CapabilityFlags::CLIENT_LONG_FLAG
        );
    }

    #[test]
    fn should_parse_long_handshake_packet() {
        let mut payload =
            b"\x0a5.6.4\x00\x01\x00\x00\x00\x01\x02\x03\x04\x05\x06\x07\x08\x00\x04\x80".to_vec();
        payload.push(33u8);
        payload.extend(&[8u8, 0u8]); // status
        payload.extend(&[0x08, 0x00]); // upper capability word
        payload.push(0x15); // scramble length (20 + nul)
        payload.extend(std::iter::repeat(0u8).take(10));
        payload.extend(&[
            0x26, 0x3a, 0x34, 0x34, 0x46, 0x44, 0x63, 0x44, 0x69, 0x63, 0x39, 0x30, 0x00,
        ]);
        let hp = HandshakePacket::from_payload(&payload).unwrap();
        assert_eq!(hp.protocol_version, 0x0a);
        assert_eq!(hp.connection_id, 1);
        assert_eq!(
            hp.scramble,
            vec![
                1u8, 2u8, 3u8, 4u8, 5u8, 6u8, 7u8, 8u8, 0x26, 0x3a, 0x34, 0x34, 0x46, 0x44, 0x63,
                0x44, 0x69, 0x63, 0x39, 0x30,
            ]
        );
        assert_eq!(
            hp.capability_flags,
            CapabilityFlags::CLIENT_SECURE_CONNECTION
                | CapabilityFlags::CLIENT_LONG_FLAG
                | CapabilityFlags::CLIENT_PLUGIN_AUTH
        );
        assert_eq!(hp.character_set, 33);
        assert_eq!(hp.status_flags, StatusFlags::SERVER_MORE_RESULTS_EXISTS);
    }

    #[test]
    fn should_parse_stmt_prepare_ok() {
        let payload = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
        ];
        let ok = StmtPrepareOk::from_payload(&payload).unwrap();
        assert_eq!(ok.statement_id, 1);
        assert_eq!(ok.num_columns, 1);
        assert_eq!(ok.num_params, 2);
        assert_eq!(ok.warning_count, 0);
    }

    #[test]
    fn should_parse_column_packet() {
        let payload = b"\x03def\x06schema\x05table\x09org_table\x04name\x08org_name\
                        \x0c\x21\x00\x0f\x00\x00\x00\x08\x00\x20\x00\x00\x00\x00";
        let col = Column::from_payload(payload).unwrap();
        assert_eq!(col.catalog, b"def");
        assert_eq!(col.schema, b"schema");
        assert_eq!(col.table, b"table");
        assert_eq!(col.org_table, b"org_table");
        assert_eq!(col.name, b"name");
        assert_eq!(col.org_name, b"org_name");
        assert_eq!(col.character_set, 0x21);
        assert_eq!(col.column_length, 15);
        assert_eq!(col.column_type, ColumnType::MYSQL_TYPE_LONGLONG);
        assert!(col
            .flags
            .contains(crate::consts::ColumnFlags::UNSIGNED_FLAG));
        assert_eq!(col.decimals, 0);
    }
}
