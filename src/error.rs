// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::{error, fmt, io, result};

pub type Result<T> = result::Result<T, Error>;

/// An error produced by a server `ERR` packet.
#[derive(Eq, PartialEq, Clone)]
pub struct MySqlError {
    pub code: u16,
    pub state: String,
    pub message: String,
}

impl fmt::Display for MySqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {} ({}): {}", self.code, self.state, self.message)
    }
}

impl fmt::Debug for MySqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl error::Error for MySqlError {}

pub enum Error {
    IoError(io::Error),
    DriverError(DriverError),
    MySqlError(MySqlError),
}

impl Error {
    /// `true` for errors after which the connection should be considered
    /// unusable until `reconnect`.
    pub fn is_connectivity_error(&self) -> bool {
        match self {
            Error::IoError(_) => true,
            Error::DriverError(err) => err.is_fatal(),
            Error::MySqlError(_) => false,
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            Error::DriverError(ref err) => Some(err),
            Error::MySqlError(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Error {
        Error::DriverError(err)
    }
}

impl From<MySqlError> for Error {
    fn from(err: MySqlError) -> Error {
        Error::MySqlError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => write!(f, "IoError {{ {} }}", err),
            Error::DriverError(ref err) => write!(f, "DriverError {{ {} }}", err),
            Error::MySqlError(ref err) => write!(f, "MySqlError {{ {} }}", err),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum DriverError {
    NotConnected,
    AlreadyConnected,
    /// A command was attempted while a result set was still open.
    UnreadRows,
    // (address, description, error kind)
    CouldNotConnect(Option<(String, String, io::ErrorKind)>),
    UnsupportedProtocol(u8),
    Protocol41NotSet,
    PacketOutOfSync,
    /// `pkt_size` given to `send_long_data` leaves no room for a chunk.
    PacketTooSmall(usize),
    /// The received packet class does not fit the protocol state.
    UnexpectedPacket,
    /// Unknown column type code in a descriptor.
    UnsupportedType(u8),
    // (expected, supplied)
    MismatchedStmtParams(u16, usize),
    WrongParamIndex(u16),
    /// Statement used on a connection other than the one that prepared it.
    StmtOnOtherConn,
    LocalInfileNotSupported,
    UnknownAuthPlugin(String),
    OldMysqlPasswordDisabled,
}

impl DriverError {
    fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::PacketOutOfSync
                | DriverError::UnexpectedPacket
                | DriverError::LocalInfileNotSupported
        )
    }
}

impl error::Error for DriverError {}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DriverError::NotConnected => write!(f, "Connection to the server is not established"),
            DriverError::AlreadyConnected => {
                write!(f, "Connection to the server is already established")
            }
            DriverError::UnreadRows => {
                write!(f, "There are rows not read from the previous command")
            }
            DriverError::CouldNotConnect(None) => {
                write!(f, "Could not connect to the server: address not specified")
            }
            DriverError::CouldNotConnect(Some((ref addr, ref desc, _))) => {
                write!(f, "Could not connect to the server `{}`: {}", addr, desc)
            }
            DriverError::UnsupportedProtocol(ver) => {
                write!(f, "Unsupported protocol version {}", ver)
            }
            DriverError::Protocol41NotSet => write!(f, "Server must set CLIENT_PROTOCOL_41 flag"),
            DriverError::PacketOutOfSync => write!(f, "Packet out of sync"),
            DriverError::PacketTooSmall(size) => {
                write!(f, "Packet size {} is too small for long data", size)
            }
            DriverError::UnexpectedPacket => write!(f, "Unexpected packet"),
            DriverError::UnsupportedType(code) => {
                write!(f, "Unsupported column type code 0x{:02x}", code)
            }
            DriverError::MismatchedStmtParams(exp, got) => write!(
                f,
                "Statement takes {} parameters but {} was supplied",
                exp, got
            ),
            DriverError::WrongParamIndex(idx) => {
                write!(f, "Statement has no parameter with index {}", idx)
            }
            DriverError::StmtOnOtherConn => {
                write!(f, "Statement does not belong to this connection")
            }
            DriverError::LocalInfileNotSupported => {
                write!(f, "LOCAL INFILE requests are not supported")
            }
            DriverError::UnknownAuthPlugin(ref name) => {
                write!(f, "Unknown authentication plugin `{}`", name)
            }
            DriverError::OldMysqlPasswordDisabled => write!(
                f,
                "Old password authentication is insecure and is not supported"
            ),
        }
    }
}
