// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use bitflags::bitflags;

/// Largest payload that fits in a single packet frame.
pub const MAX_PAYLOAD_LEN: usize = 16_777_215;

/// Default value of the client-side packet size limit (`16 * 1024 * 1024 - 1`).
pub const DEFAULT_MAX_PKT_SIZE: usize = MAX_PAYLOAD_LEN;

pub const UTF8_GENERAL_CI: u8 = 33;

bitflags! {
    /// Server status flags.
    pub struct StatusFlags: u16 {
        const SERVER_STATUS_IN_TRANS             = 0x0001;
        const SERVER_STATUS_AUTOCOMMIT           = 0x0002;
        const SERVER_MORE_RESULTS_EXISTS         = 0x0008;
        const SERVER_STATUS_NO_GOOD_INDEX_USED   = 0x0010;
        const SERVER_STATUS_NO_INDEX_USED        = 0x0020;
        const SERVER_STATUS_CURSOR_EXISTS        = 0x0040;
        const SERVER_STATUS_LAST_ROW_SENT        = 0x0080;
        const SERVER_STATUS_DB_DROPPED           = 0x0100;
        const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
        const SERVER_STATUS_METADATA_CHANGED     = 0x0400;
        const SERVER_QUERY_WAS_SLOW              = 0x0800;
        const SERVER_PS_OUT_PARAMS               = 0x1000;
    }
}

bitflags! {
    /// Client/server capability flags.
    pub struct CapabilityFlags: u32 {
        const CLIENT_LONG_PASSWORD                  = 0x0000_0001;
        const CLIENT_FOUND_ROWS                     = 0x0000_0002;
        const CLIENT_LONG_FLAG                      = 0x0000_0004;
        const CLIENT_CONNECT_WITH_DB                = 0x0000_0008;
        const CLIENT_NO_SCHEMA                      = 0x0000_0010;
        const CLIENT_COMPRESS                       = 0x0000_0020;
        const CLIENT_ODBC                           = 0x0000_0040;
        const CLIENT_LOCAL_FILES                    = 0x0000_0080;
        const CLIENT_IGNORE_SPACE                   = 0x0000_0100;
        const CLIENT_PROTOCOL_41                    = 0x0000_0200;
        const CLIENT_INTERACTIVE                    = 0x0000_0400;
        const CLIENT_SSL                            = 0x0000_0800;
        const CLIENT_IGNORE_SIGPIPE                 = 0x0000_1000;
        const CLIENT_TRANSACTIONS                   = 0x0000_2000;
        const CLIENT_RESERVED                       = 0x0000_4000;
        const CLIENT_SECURE_CONNECTION              = 0x0000_8000;
        const CLIENT_MULTI_STATEMENTS               = 0x0001_0000;
        const CLIENT_MULTI_RESULTS                  = 0x0002_0000;
        const CLIENT_PS_MULTI_RESULTS               = 0x0004_0000;
        const CLIENT_PLUGIN_AUTH                    = 0x0008_0000;
        const CLIENT_CONNECT_ATTRS                  = 0x0010_0000;
        const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
    }
}

bitflags! {
    /// Column definition flags.
    pub struct ColumnFlags: u16 {
        const NOT_NULL_FLAG         = 1;
        const PRI_KEY_FLAG          = 2;
        const UNIQUE_KEY_FLAG       = 4;
        const MULTIPLE_KEY_FLAG     = 8;
        const BLOB_FLAG             = 16;
        const UNSIGNED_FLAG         = 32;
        const ZEROFILL_FLAG         = 64;
        const BINARY_FLAG           = 128;
        const ENUM_FLAG             = 256;
        const AUTO_INCREMENT_FLAG   = 512;
        const TIMESTAMP_FLAG        = 1024;
        const SET_FLAG              = 2048;
        const NO_DEFAULT_VALUE_FLAG = 4096;
        const ON_UPDATE_NOW_FLAG    = 8192;
        const PART_KEY_FLAG         = 16384;
        const NUM_FLAG              = 32768;
    }
}

/// Command codes (the leading byte of every command packet).
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Command {
    COM_SLEEP = 0x00,
    COM_QUIT = 0x01,
    COM_INIT_DB = 0x02,
    COM_QUERY = 0x03,
    COM_FIELD_LIST = 0x04,
    COM_CREATE_DB = 0x05,
    COM_DROP_DB = 0x06,
    COM_REFRESH = 0x07,
    COM_SHUTDOWN = 0x08,
    COM_STATISTICS = 0x09,
    COM_PROCESS_INFO = 0x0a,
    COM_CONNECT = 0x0b,
    COM_PROCESS_KILL = 0x0c,
    COM_DEBUG = 0x0d,
    COM_PING = 0x0e,
    COM_TIME = 0x0f,
    COM_DELAYED_INSERT = 0x10,
    COM_CHANGE_USER = 0x11,
    COM_STMT_PREPARE = 0x16,
    COM_STMT_EXECUTE = 0x17,
    COM_STMT_SEND_LONG_DATA = 0x18,
    COM_STMT_CLOSE = 0x19,
    COM_STMT_RESET = 0x1a,
    COM_SET_OPTION = 0x1b,
    COM_STMT_FETCH = 0x1c,
}

/// Column type codes shared by column definitions and the binary protocol.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum ColumnType {
    MYSQL_TYPE_DECIMAL = 0x00,
    MYSQL_TYPE_TINY = 0x01,
    MYSQL_TYPE_SHORT = 0x02,
    MYSQL_TYPE_LONG = 0x03,
    MYSQL_TYPE_FLOAT = 0x04,
    MYSQL_TYPE_DOUBLE = 0x05,
    MYSQL_TYPE_NULL = 0x06,
    MYSQL_TYPE_TIMESTAMP = 0x07,
    MYSQL_TYPE_LONGLONG = 0x08,
    MYSQL_TYPE_INT24 = 0x09,
    MYSQL_TYPE_DATE = 0x0a,
    MYSQL_TYPE_TIME = 0x0b,
    MYSQL_TYPE_DATETIME = 0x0c,
    MYSQL_TYPE_YEAR = 0x0d,
    MYSQL_TYPE_VARCHAR = 0x0f,
    MYSQL_TYPE_BIT = 0x10,
    MYSQL_TYPE_JSON = 0xf5,
    MYSQL_TYPE_NEWDECIMAL = 0xf6,
    MYSQL_TYPE_ENUM = 0xf7,
    MYSQL_TYPE_SET = 0xf8,
    MYSQL_TYPE_TINY_BLOB = 0xf9,
    MYSQL_TYPE_MEDIUM_BLOB = 0xfa,
    MYSQL_TYPE_LONG_BLOB = 0xfb,
    MYSQL_TYPE_BLOB = 0xfc,
    MYSQL_TYPE_VAR_STRING = 0xfd,
    MYSQL_TYPE_STRING = 0xfe,
    MYSQL_TYPE_GEOMETRY = 0xff,
}

impl ColumnType {
    /// Decodes a type code received from the server. The error value is the
    /// offending byte.
    pub fn from_u8(x: u8) -> Result<ColumnType, u8> {
        match x {
            0x00 => Ok(ColumnType::MYSQL_TYPE_DECIMAL),
            0x01 => Ok(ColumnType::MYSQL_TYPE_TINY),
            0x02 => Ok(ColumnType::MYSQL_TYPE_SHORT),
            0x03 => Ok(ColumnType::MYSQL_TYPE_LONG),
            0x04 => Ok(ColumnType::MYSQL_TYPE_FLOAT),
            0x05 => Ok(ColumnType::MYSQL_TYPE_DOUBLE),
            0x06 => Ok(ColumnType::MYSQL_TYPE_NULL),
            0x07 => Ok(ColumnType::MYSQL_TYPE_TIMESTAMP),
            0x08 => Ok(ColumnType::MYSQL_TYPE_LONGLONG),
            0x09 => Ok(ColumnType::MYSQL_TYPE_INT24),
            0x0a => Ok(ColumnType::MYSQL_TYPE_DATE),
            0x0b => Ok(ColumnType::MYSQL_TYPE_TIME),
            0x0c => Ok(ColumnType::MYSQL_TYPE_DATETIME),
            0x0d => Ok(ColumnType::MYSQL_TYPE_YEAR),
            0x0f => Ok(ColumnType::MYSQL_TYPE_VARCHAR),
            0x10 => Ok(ColumnType::MYSQL_TYPE_BIT),
            0xf5 => Ok(ColumnType::MYSQL_TYPE_JSON),
            0xf6 => Ok(ColumnType::MYSQL_TYPE_NEWDECIMAL),
            0xf7 => Ok(ColumnType::MYSQL_TYPE_ENUM),
            0xf8 => Ok(ColumnType::MYSQL_TYPE_SET),
            0xf9 => Ok(ColumnType::MYSQL_TYPE_TINY_BLOB),
            0xfa => Ok(ColumnType::MYSQL_TYPE_MEDIUM_BLOB),
            0xfb => Ok(ColumnType::MYSQL_TYPE_LONG_BLOB),
            0xfc => Ok(ColumnType::MYSQL_TYPE_BLOB),
            0xfd => Ok(ColumnType::MYSQL_TYPE_VAR_STRING),
            0xfe => Ok(ColumnType::MYSQL_TYPE_STRING),
            0xff => Ok(ColumnType::MYSQL_TYPE_GEOMETRY),
            x => Err(x),
        }
    }
}
