// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::fmt;
use std::io;
use std::io::Read as StdRead;
use std::io::Write as StdWrite;
use std::net::{self, SocketAddr, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use bufstream::BufStream;
use byteorder::LittleEndian as LE;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use net2::TcpBuilder;

use crate::consts::ColumnType;
use crate::error::DriverError::{CouldNotConnect, PacketOutOfSync};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::value::Value;
use crate::value::Value::{Bytes, Date, Float, Int, Time, UInt, NULL};

pub trait Read: ReadBytesExt + io::BufRead {
    fn read_lenenc_int(&mut self) -> io::Result<u64> {
        let head_byte = self.read_u8()?;
        let length = match head_byte {
            // NULL marker of the text row format, never a valid integer head
            0xfb => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "0xfb is not a length encoded integer prefix",
                ))
            }
            0xfc => 2,
            0xfd => 3,
            0xfe => 8,
            x => return Ok(x as u64),
        };
        self.read_uint::<LE>(length)
    }

    fn read_lenenc_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_lenenc_int()?;
        let mut out = Vec::with_capacity(len as usize);
        let count = if len > 0 {
            self.take(len).read_to_end(&mut out)?
        } else {
            0
        };
        if count as u64 == len {
            Ok(out)
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading length encoded string",
            ))
        }
    }

    fn read_to_null(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let c = self.read_u8()?;
            if c == 0u8 {
                break;
            }
            out.push(c);
        }
        Ok(out)
    }

    /// Reads one binary-protocol cell of the given column type.
    fn read_bin_value(&mut self, col_type: ColumnType, unsigned: bool) -> io::Result<Value> {
        match col_type {
            ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_BIT
            | ColumnType::MYSQL_TYPE_GEOMETRY
            | ColumnType::MYSQL_TYPE_JSON => Ok(Bytes(self.read_lenenc_bytes()?)),
            ColumnType::MYSQL_TYPE_TINY => {
                if unsigned {
                    Ok(Int(self.read_u8()? as i64))
                } else {
                    Ok(Int(self.read_i8()? as i64))
                }
            }
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                if unsigned {
                    Ok(Int(self.read_u16::<LE>()? as i64))
                } else {
                    Ok(Int(self.read_i16::<LE>()? as i64))
                }
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                if unsigned {
                    Ok(Int(self.read_u32::<LE>()? as i64))
                } else {
                    Ok(Int(self.read_i32::<LE>()? as i64))
                }
            }
            ColumnType::MYSQL_TYPE_LONGLONG => {
                if unsigned {
                    Ok(UInt(self.read_u64::<LE>()?))
                } else {
                    Ok(Int(self.read_i64::<LE>()?))
                }
            }
            ColumnType::MYSQL_TYPE_FLOAT => Ok(Float(self.read_f32::<LE>()? as f64)),
            ColumnType::MYSQL_TYPE_DOUBLE => Ok(Float(self.read_f64::<LE>()?)),
            ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_DATETIME => {
                let len = self.read_u8()?;
                let mut year = 0u16;
                let mut month = 0u8;
                let mut day = 0u8;
                let mut hour = 0u8;
                let mut minute = 0u8;
                let mut second = 0u8;
                let mut micro_second = 0u32;
                if len >= 4u8 {
                    year = self.read_u16::<LE>()?;
                    month = self.read_u8()?;
                    day = self.read_u8()?;
                }
                if len >= 7u8 {
                    hour = self.read_u8()?;
                    minute = self.read_u8()?;
                    second = self.read_u8()?;
                }
                if len == 11u8 {
                    micro_second = self.read_u32::<LE>()?;
                }
                Ok(Date(year, month, day, hour, minute, second, micro_second))
            }
            ColumnType::MYSQL_TYPE_TIME => {
                let len = self.read_u8()?;
                let mut is_negative = false;
                let mut days = 0u32;
                let mut hours = 0u8;
                let mut minutes = 0u8;
                let mut seconds = 0u8;
                let mut micro_seconds = 0u32;
                if len >= 8u8 {
                    is_negative = self.read_u8()? == 1u8;
                    days = self.read_u32::<LE>()?;
                    hours = self.read_u8()?;
                    minutes = self.read_u8()?;
                    seconds = self.read_u8()?;
                }
                if len == 12u8 {
                    micro_seconds = self.read_u32::<LE>()?;
                }
                Ok(Time(is_negative, days, hours, minutes, seconds, micro_seconds))
            }
            ColumnType::MYSQL_TYPE_NULL => Ok(NULL),
        }
    }

    /// Reads one packet payload, reassembling fragments whose length equals
    /// `ceiling`. Returns the payload together with the advanced sequence id.
    fn read_packet(&mut self, mut seq_id: u8, ceiling: usize) -> MyResult<(Vec<u8>, u8)> {
        let mut output = Vec::new();
        loop {
            let payload_len = self.read_uint::<LE>(3)? as usize;
            let srv_seq_id = self.read_u8()?;
            if srv_seq_id != seq_id {
                return Err(DriverError(PacketOutOfSync));
            }
            seq_id = seq_id.wrapping_add(1);
            if payload_len == 0 {
                break;
            }
            output.reserve(payload_len);
            let count = self.take(payload_len as u64).read_to_end(&mut output)?;
            if count != payload_len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Unexpected EOF while reading packet",
                )
                .into());
            }
            if payload_len != ceiling {
                break;
            }
        }
        Ok((output, seq_id))
    }
}

impl<T: ReadBytesExt + io::BufRead + ?Sized> Read for T {}

pub trait Write: WriteBytesExt {
    fn write_lenenc_int(&mut self, x: u64) -> io::Result<()> {
        if x < 251 {
            self.write_u8(x as u8)
        } else if x < 65_536 {
            self.write_u8(0xfc)?;
            self.write_uint::<LE>(x, 2)
        } else if x < 16_777_216 {
            self.write_u8(0xfd)?;
            self.write_uint::<LE>(x, 3)
        } else {
            self.write_u8(0xfe)?;
            self.write_uint::<LE>(x, 8)
        }
    }

    fn write_lenenc_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_lenenc_int(bytes.len() as u64)?;
        self.write_all(bytes)
    }

    /// Writes one packet, splitting the payload into `ceiling`-sized
    /// fragments. A payload that is a multiple of the ceiling gets an empty
    /// terminating fragment. Returns the advanced sequence id.
    fn write_packet(&mut self, data: &[u8], mut seq_id: u8, ceiling: usize) -> MyResult<u8> {
        if data.is_empty() {
            self.write_all(&[0, 0, 0, seq_id])?;
            seq_id = seq_id.wrapping_add(1);
        } else {
            let mut last_was_max = false;
            for chunk in data.chunks(ceiling) {
                let chunk_len = chunk.len();
                self.write_uint::<LE>(chunk_len as u64, 3)?;
                self.write_u8(seq_id)?;
                self.write_all(chunk)?;
                last_was_max = chunk_len == ceiling;
                seq_id = seq_id.wrapping_add(1);
            }
            if last_was_max {
                self.write_all(&[0u8, 0u8, 0u8, seq_id])?;
                seq_id = seq_id.wrapping_add(1);
            }
        }
        self.flush()?;
        Ok(seq_id)
    }
}

impl<T: WriteBytesExt + ?Sized> Write for T {}

pub trait IoPack: io::Read + io::Write + io::BufRead {}

impl<T: io::Read + io::Write> IoPack for BufStream<T> {}

/// Buffered duplex transport to the server.
pub enum Stream {
    #[cfg(unix)]
    SocketStream(BufStream<UnixStream>),
    TcpStream(BufStream<net::TcpStream>),
}

impl Stream {
    pub fn as_io(&mut self) -> &mut dyn IoPack {
        match *self {
            #[cfg(unix)]
            Stream::SocketStream(ref mut stream) => stream,
            Stream::TcpStream(ref mut stream) => stream,
        }
    }

    #[cfg(unix)]
    pub fn connect_socket(
        socket: &Path,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> MyResult<Stream> {
        match UnixStream::connect(socket) {
            Ok(stream) => {
                stream.set_read_timeout(read_timeout)?;
                stream.set_write_timeout(write_timeout)?;
                Ok(Stream::SocketStream(BufStream::new(stream)))
            }
            Err(e) => {
                let addr = socket.to_string_lossy().into_owned();
                let desc = e.to_string();
                Err(DriverError(CouldNotConnect(Some((addr, desc, e.kind())))))
            }
        }
    }

    #[cfg(not(unix))]
    pub fn connect_socket(
        _socket: &Path,
        _read_timeout: Option<Duration>,
        _write_timeout: Option<Duration>,
    ) -> MyResult<Stream> {
        Err(DriverError(CouldNotConnect(Some((
            String::from("<socket>"),
            String::from("socket connections are not supported on this platform"),
            io::ErrorKind::Other,
        )))))
    }

    pub fn connect_tcp(
        ip_or_hostname: &str,
        port: u16,
        bind_address: Option<SocketAddr>,
        connect_timeout: Option<Duration>,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> MyResult<Stream> {
        let could_not_connect = |err: &io::Error| {
            let addr = format!("{}:{}", ip_or_hostname, port);
            DriverError(CouldNotConnect(Some((addr, err.to_string(), err.kind()))))
        };
        connect_tcp_stream(
            ip_or_hostname,
            port,
            bind_address,
            connect_timeout,
        )
        .and_then(|stream| {
            stream.set_read_timeout(read_timeout)?;
            stream.set_write_timeout(write_timeout)?;
            Ok(stream)
        })
        .map(|stream| Stream::TcpStream(BufStream::new(stream)))
        .map_err(|err| could_not_connect(&err))
    }
}

fn connect_tcp_stream(
    ip_or_hostname: &str,
    port: u16,
    bind_address: Option<SocketAddr>,
    connect_timeout: Option<Duration>,
) -> io::Result<net::TcpStream> {
    if let Some(bind_address) = bind_address {
        let builder = if bind_address.is_ipv4() {
            TcpBuilder::new_v4()?
        } else {
            TcpBuilder::new_v6()?
        };
        builder.bind(bind_address)?;
        return builder.connect((ip_or_hostname, port));
    }
    if let Some(timeout) = connect_timeout {
        let mut last_err = io::Error::new(
            io::ErrorKind::Other,
            "could not connect to any resolved address",
        );
        for addr in (ip_or_hostname, port).to_socket_addrs()? {
            match net::TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = err,
            }
        }
        return Err(last_err);
    }
    net::TcpStream::connect((ip_or_hostname, port))
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            #[cfg(unix)]
            Stream::SocketStream(_) => write!(f, "Socket stream"),
            Stream::TcpStream(_) => write!(f, "Tcp stream"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Read, Write};
    use crate::error::{DriverError, Error};

    #[test]
    fn should_roundtrip_lenenc_ints() {
        for &x in &[0u64, 250, 251, 65_535, 65_536, 16_777_215, 16_777_216, u64::MAX] {
            let mut buf = Vec::new();
            buf.write_lenenc_int(x).unwrap();
            let mut reader = &buf[..];
            assert_eq!(reader.read_lenenc_int().unwrap(), x);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn should_use_minimal_lenenc_prefix() {
        let mut buf = Vec::new();
        buf.write_lenenc_int(250).unwrap();
        assert_eq!(buf, vec![250]);
        buf.clear();
        buf.write_lenenc_int(251).unwrap();
        assert_eq!(buf, vec![0xfc, 251, 0]);
        buf.clear();
        buf.write_lenenc_int(65_536).unwrap();
        assert_eq!(buf, vec![0xfd, 0, 0, 1]);
        buf.clear();
        buf.write_lenenc_int(16_777_216).unwrap();
        assert_eq!(buf, vec![0xfe, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn should_reject_null_marker_as_lenenc_int() {
        let mut reader = &[0xfb_u8][..];
        assert!(reader.read_lenenc_int().is_err());
    }

    #[test]
    fn should_roundtrip_lenenc_bytes() {
        let mut buf = Vec::new();
        buf.write_lenenc_bytes(b"hello world").unwrap();
        let mut reader = &buf[..];
        assert_eq!(reader.read_lenenc_bytes().unwrap(), b"hello world");
    }

    #[test]
    fn should_fragment_and_reassemble_packets() {
        for ceiling in 4usize..=9 {
            for payload_len in 0usize..=3 * ceiling + 1 {
                let payload: Vec<u8> = (0..payload_len).map(|x| x as u8).collect();
                let mut wire = Vec::new();
                let seq = wire.write_packet(&payload, 0, ceiling).unwrap();
                let mut reader = &wire[..];
                let (out, seq_read) = reader.read_packet(0, ceiling).unwrap();
                assert_eq!(out, payload);
                assert_eq!(seq, seq_read);
                assert!(reader.is_empty());
            }
        }
    }

    #[test]
    fn should_emit_contiguous_sequence_ids() {
        let payload = [0u8; 10];
        let mut wire = Vec::new();
        let seq = wire.write_packet(&payload, 0, 4).unwrap();
        // 4 + 4 + 2 payload bytes -> three fragments
        assert_eq!(seq, 3);
        assert_eq!(wire[3], 0);
        assert_eq!(wire[3 + 4 + 4], 1);
        assert_eq!(wire[3 + 2 * (4 + 4)], 2);
    }

    #[test]
    fn should_pad_exact_multiple_with_empty_fragment() {
        let payload = [7u8; 8];
        let mut wire = Vec::new();
        let seq = wire.write_packet(&payload, 0, 4).unwrap();
        assert_eq!(seq, 3);
        assert_eq!(&wire[wire.len() - 4..], &[0, 0, 0, 2]);
        let mut reader = &wire[..];
        let (out, _) = reader.read_packet(0, 4).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn should_fail_on_out_of_sync_packet() {
        let mut wire = Vec::new();
        wire.write_packet(b"abc", 5, 16).unwrap();
        let mut reader = &wire[..];
        match reader.read_packet(0, 16) {
            Err(Error::DriverError(DriverError::PacketOutOfSync)) => (),
            other => panic!("expected PacketOutOfSync, got {:?}", other),
        }
    }
}
