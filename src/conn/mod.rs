// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::cmp;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use byteorder::LittleEndian as LE;
use byteorder::WriteBytesExt;
use log::{debug, trace};
use parking_lot::Mutex;

use crate::consts::{self, CapabilityFlags, Command, StatusFlags};
use crate::error::DriverError::{
    AlreadyConnected, LocalInfileNotSupported, NotConnected, OldMysqlPasswordDisabled,
    PacketTooSmall, Protocol41NotSet, StmtOnOtherConn, UnexpectedPacket, UnknownAuthPlugin,
    UnreadRows, UnsupportedProtocol, WrongParamIndex,
};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::io::{Read, Stream, Write};
use crate::packet::{
    is_eof_packet, Column, EofPacket, ErrPacket, HandshakePacket, OkPacket, StmtPrepareOk,
};
use crate::scramble::scramble;
use crate::value::{self, Param, Params, Row, Value};

use self::opts::Opts;
use self::query_result::QueryResult;
use self::stmt::{InnerStmt, Statement};

pub mod opts;
pub mod query_result;
pub mod shared;
pub mod stmt;

static CONN_TOKEN: AtomicUsize = AtomicUsize::new(1);

/// Greeting data kept for the lifetime of a connection.
#[derive(Clone, Eq, PartialEq, Debug)]
pub(crate) struct ServerInfo {
    pub protocol_version: u8,
    pub server_version: Vec<u8>,
    pub connection_id: u32,
    pub scramble: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub character_set: u8,
}

impl Default for ServerInfo {
    fn default() -> ServerInfo {
        ServerInfo {
            protocol_version: 0,
            server_version: Vec::new(),
            connection_id: 0,
            scramble: Vec::new(),
            capability_flags: CapabilityFlags::empty(),
            character_set: 0,
        }
    }
}

/// A single connection to the server.
///
/// The protocol engine is strictly sequential: one command is in flight at
/// a time, and a streaming result must be drained before the next command
/// is accepted. See [`SharedConn`](shared/struct.SharedConn.html) for a
/// handle that can be used from several threads.
pub struct Conn {
    opts: Opts,
    stream: Option<Stream>,
    token: usize,
    info: ServerInfo,
    status_flags: StatusFlags,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
    seq_id: u8,
    max_pkt_size: usize,
    rows_pending: bool,
    init_cmds: Vec<String>,
    stmt_map: HashMap<u32, Arc<Mutex<InnerStmt>>>,
}

impl Conn {
    /// Creates a handler. No connection is made until
    /// [`connect`](#method.connect) is called.
    pub fn new<T: Into<Opts>>(opts: T) -> Conn {
        let opts = opts.into();
        Conn {
            init_cmds: opts.get_init().to_vec(),
            opts,
            stream: None,
            token: CONN_TOKEN.fetch_add(1, Ordering::Relaxed),
            info: ServerInfo::default(),
            status_flags: StatusFlags::empty(),
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            seq_id: 0,
            max_pkt_size: consts::DEFAULT_MAX_PKT_SIZE,
            rows_pending: false,
            stmt_map: HashMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Establishes the connection and authenticates, then replays the
    /// registered init commands in order.
    pub fn connect(&mut self) -> MyResult<()> {
        if self.is_connected() {
            return Err(DriverError(AlreadyConnected));
        }
        self.do_connect()
    }

    /// Closes the connection. The transport handle is invalidated even if
    /// COM_QUIT fails.
    pub fn close(&mut self) -> MyResult<()> {
        if !self.is_connected() {
            return Err(DriverError(NotConnected));
        }
        if self.rows_pending {
            return Err(DriverError(UnreadRows));
        }
        self.close_conn()
    }

    /// Closes and reopens the connection, ignoring unread rows, then
    /// re-prepares every known statement so existing [`Statement`] handles
    /// keep working.
    pub fn reconnect(&mut self) -> MyResult<()> {
        if self.is_connected() {
            let _ = self.close_conn();
        }
        self.do_connect()?;
        self.reprepare_statements()
    }

    /// Changes the default database.
    pub fn select_db(&mut self, db_name: &str) -> MyResult<()> {
        self.check_ready()?;
        let result = (|| {
            self.write_command_data(Command::COM_INIT_DB, db_name.as_bytes())?;
            self.read_ok_packet()
        })();
        match result {
            Ok(_) => {
                self.opts.db_name = Some(db_name.to_owned());
                Ok(())
            }
            Err(err) => {
                self.rows_pending = false;
                Err(err)
            }
        }
    }

    /// Sends COM_PING.
    pub fn ping(&mut self) -> MyResult<()> {
        self.check_ready()?;
        let result = (|| {
            self.write_command_data(Command::COM_PING, &[])?;
            self.read_ok_packet()
        })();
        result.map(drop).map_err(|err| {
            self.rows_pending = false;
            err
        })
    }

    /// Runs a text-protocol query. The returned [`QueryResult`] reads rows
    /// directly off the wire and must be drained before the connection
    /// accepts another command.
    pub fn query<'a>(&'a mut self, sql: &str) -> MyResult<QueryResult<'a>> {
        let (columns, ok_packet) = self.query_meta(sql)?;
        Ok(QueryResult::new(self, columns, ok_packet, false))
    }

    /// Prepares a server-side statement.
    pub fn prepare(&mut self, sql: &str) -> MyResult<Statement> {
        self.check_ready()?;
        match self.prepare_inner(sql) {
            Ok(inner) => {
                let stmt = Statement::new(inner);
                self.stmt_map.insert(stmt.id(), stmt.inner.clone());
                Ok(stmt)
            }
            Err(err) => {
                self.rows_pending = false;
                Err(err)
            }
        }
    }

    /// Executes a prepared statement over the binary protocol. Passing
    /// non-empty `params` re-binds them first.
    pub fn execute<'a, P: Into<Params>>(
        &'a mut self,
        stmt: &Statement,
        params: P,
    ) -> MyResult<QueryResult<'a>> {
        let (columns, ok_packet) = self.execute_meta(stmt, params.into())?;
        Ok(QueryResult::new(self, columns, ok_packet, true))
    }

    /// Sends a parameter value (or a piece of it) ahead of execution via
    /// COM_STMT_SEND_LONG_DATA. `data` is read in chunks of `pkt_size - 6`
    /// bytes until exhausted; the command generates no server response.
    pub fn send_long_data<R: io::Read>(
        &mut self,
        stmt: &Statement,
        param_index: u16,
        mut data: R,
        pkt_size: usize,
    ) -> MyResult<()> {
        self.check_ready()?;
        self.check_stmt(stmt)?;
        let (id, num_params) = {
            let inner = stmt.inner.lock();
            (inner.id, inner.num_params)
        };
        if param_index >= num_params {
            return Err(DriverError(WrongParamIndex(param_index)));
        }
        if pkt_size < 7 {
            return Err(DriverError(PacketTooSmall(pkt_size)));
        }
        let chunk_size = pkt_size - 6;
        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = read_fill(&mut data, &mut buf)?;
            if n == 0 {
                break;
            }
            let mut body = Vec::with_capacity(6 + n);
            body.write_u32::<LE>(id)?;
            body.write_u16::<LE>(param_index)?;
            body.extend_from_slice(&buf[..n]);
            self.write_command_data(Command::COM_STMT_SEND_LONG_DATA, &body)?;
            if n < chunk_size {
                break;
            }
        }
        stmt.inner.lock().long_sent[param_index as usize] = true;
        Ok(())
    }

    /// Resets a prepared statement on the server: accumulated long data,
    /// unbuffered result sets and errors. The next execution re-sends the
    /// parameter type block whether or not the command succeeds.
    pub fn reset_stmt(&mut self, stmt: &Statement) -> MyResult<()> {
        self.check_ready()?;
        self.check_stmt(stmt)?;
        let id = {
            let mut inner = stmt.inner.lock();
            inner.rebind = true;
            for sent in inner.long_sent.iter_mut() {
                *sent = false;
            }
            inner.id
        };
        let result = (|| {
            let mut body = Vec::with_capacity(4);
            body.write_u32::<LE>(id)?;
            self.write_command_data(Command::COM_STMT_RESET, &body)?;
            self.read_ok_packet()
        })();
        result.map(drop).map_err(|err| {
            self.rows_pending = false;
            err
        })
    }

    /// Destroys a statement on the server. The client side always forgets
    /// the statement, even if the command could not be sent; further use of
    /// the handle fails cleanly.
    pub fn close_stmt(&mut self, stmt: &Statement) -> MyResult<()> {
        self.check_ready()?;
        self.check_stmt(stmt)?;
        let id = stmt.inner.lock().id;
        let result = (|| {
            let mut body = Vec::with_capacity(4);
            body.write_u32::<LE>(id)?;
            // COM_STMT_CLOSE generates no response
            self.write_command_data(Command::COM_STMT_CLOSE, &body)
        })();
        self.stmt_map.remove(&id);
        stmt.inner.lock().closed = true;
        result
    }

    /// Registers a command to run after every successful handshake,
    /// including the ones performed by `reconnect`.
    pub fn register_init(&mut self, sql: &str) {
        self.init_cmds.push(sql.to_owned());
    }

    /// Thread id of the current connection.
    pub fn thread_id(&self) -> u32 {
        self.info.connection_id
    }

    /// Raw server version string from the greeting.
    pub fn server_version(&self) -> &[u8] {
        &self.info.server_version
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Sets the maximum packet size if `size > 0`. Returns the old value.
    pub fn set_max_pkt_size(&mut self, size: usize) -> usize {
        let old_size = self.max_pkt_size;
        if size > 0 {
            self.max_pkt_size = size;
        }
        old_size
    }

    /// Escapes `text` so it is safe to embed in a query, honouring the
    /// session's `NO_BACKSLASH_ESCAPES` mode.
    pub fn escape_string(&self, text: &str) -> String {
        if self
            .status_flags
            .contains(StatusFlags::SERVER_STATUS_NO_BACKSLASH_ESCAPES)
        {
            value::escape_quotes(text)
        } else {
            value::escape_string(text)
        }
    }

    /// `true` while the current result chain has further result sets.
    pub fn more_results_exists(&self) -> bool {
        self.status_flags
            .contains(StatusFlags::SERVER_MORE_RESULTS_EXISTS)
    }

    /// `true` while a result stream is open and not fully drained.
    pub(crate) fn rows_pending(&self) -> bool {
        self.rows_pending
    }

    fn check_ready(&self) -> MyResult<()> {
        if !self.is_connected() {
            return Err(DriverError(NotConnected));
        }
        if self.rows_pending {
            return Err(DriverError(UnreadRows));
        }
        Ok(())
    }

    fn check_stmt(&self, stmt: &Statement) -> MyResult<()> {
        let inner = stmt.inner.lock();
        if inner.closed {
            return Err(DriverError(NotConnected));
        }
        if inner.conn_token != self.token {
            return Err(DriverError(StmtOnOtherConn));
        }
        Ok(())
    }

    fn do_connect(&mut self) -> MyResult<()> {
        self.seq_id = 0;
        self.rows_pending = false;
        self.status_flags = StatusFlags::empty();
        self.connect_stream()?;
        if let Err(err) = self.handshake() {
            self.stream = None;
            return Err(err);
        }
        debug!(
            "connected to server {} (thread id {})",
            String::from_utf8_lossy(&self.info.server_version),
            self.info.connection_id
        );
        if let Err(err) = self.run_init_commands() {
            self.stream = None;
            return Err(err);
        }
        Ok(())
    }

    fn connect_stream(&mut self) -> MyResult<()> {
        let stream = if let Some(socket) = self.opts.get_socket() {
            Stream::connect_socket(
                socket,
                self.opts.read_timeout,
                self.opts.write_timeout,
            )?
        } else {
            Stream::connect_tcp(
                self.opts.get_ip_or_hostname(),
                self.opts.get_tcp_port(),
                self.opts.bind_address,
                self.opts.tcp_connect_timeout,
                self.opts.read_timeout,
                self.opts.write_timeout,
            )?
        };
        self.stream = Some(stream);
        Ok(())
    }

    fn handshake(&mut self) -> MyResult<()> {
        let pld = self.read_packet()?;
        let handshake = HandshakePacket::from_payload(&pld)?;
        if handshake.protocol_version != 10u8 {
            return Err(DriverError(UnsupportedProtocol(handshake.protocol_version)));
        }
        if !handshake
            .capability_flags
            .contains(CapabilityFlags::CLIENT_PROTOCOL_41)
        {
            return Err(DriverError(Protocol41NotSet));
        }
        self.status_flags = handshake.status_flags;
        self.info = ServerInfo {
            protocol_version: handshake.protocol_version,
            server_version: handshake.server_version,
            connection_id: handshake.connection_id,
            scramble: handshake.scramble,
            capability_flags: handshake.capability_flags,
            character_set: handshake.character_set,
        };
        self.write_login_packet()?;
        let pld = self.read_packet()?;
        match pld.first().copied() {
            Some(0x00) => {
                let ok = OkPacket::from_payload(&pld)?;
                self.handle_ok(&ok);
                Ok(())
            }
            Some(0xff) => Err(ErrPacket::from_payload(&pld)?.into()),
            Some(0xfe) => {
                // auth switch request; only mysql_native_password is spoken
                let mut reader = &pld[1..];
                let plugin = reader.read_to_null().unwrap_or_default();
                if plugin == b"mysql_old_password" {
                    Err(DriverError(OldMysqlPasswordDisabled))
                } else {
                    Err(DriverError(UnknownAuthPlugin(
                        String::from_utf8_lossy(&plugin).into_owned(),
                    )))
                }
            }
            _ => Err(DriverError(UnexpectedPacket)),
        }
    }

    fn write_login_packet(&mut self) -> MyResult<()> {
        let mut client_flags = CapabilityFlags::CLIENT_LONG_PASSWORD
            | CapabilityFlags::CLIENT_FOUND_ROWS
            | CapabilityFlags::CLIENT_LONG_FLAG
            | CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_TRANSACTIONS
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_MULTI_RESULTS;
        let user = self.opts.get_user().to_owned();
        let db_name = self.opts.get_db_name().to_owned();
        if !db_name.is_empty() {
            client_flags |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }
        let scramble_buf = scramble(&self.info.scramble, self.opts.get_pass().as_bytes());
        let mut writer = Vec::with_capacity(4 + 4 + 1 + 23 + user.len() + 1 + 1 + 20 + db_name.len() + 1);
        writer.write_u32::<LE>(client_flags.bits())?;
        writer.write_u32::<LE>(self.max_pkt_size as u32)?;
        writer.write_u8(consts::UTF8_GENERAL_CI)?;
        writer.extend_from_slice(&[0u8; 23]);
        writer.extend_from_slice(user.as_bytes());
        writer.write_u8(0u8)?;
        match scramble_buf {
            Some(buf) => {
                writer.write_u8(buf.len() as u8)?;
                writer.extend_from_slice(&buf);
            }
            None => writer.write_u8(0u8)?,
        }
        if !db_name.is_empty() {
            writer.extend_from_slice(db_name.as_bytes());
            writer.write_u8(0u8)?;
        }
        self.write_packet(&writer)
    }

    fn run_init_commands(&mut self) -> MyResult<()> {
        if self.init_cmds.is_empty() {
            return Ok(());
        }
        debug!("replaying {} init command(s)", self.init_cmds.len());
        let cmds = self.init_cmds.clone();
        for cmd in cmds {
            self.query_drop(&cmd)?;
        }
        Ok(())
    }

    /// Runs a query and discards every row of every result set.
    pub(crate) fn query_drop(&mut self, sql: &str) -> MyResult<()> {
        let (columns, _) = self.query_meta(sql)?;
        let mut col_count = columns.len();
        loop {
            if col_count > 0 {
                while self.next_text(col_count)?.is_some() {}
            }
            if self.more_results_exists() && self.rows_pending {
                let (columns, _) = self.handle_result_set()?;
                col_count = columns.len();
            } else {
                break;
            }
        }
        Ok(())
    }

    fn reprepare_statements(&mut self) -> MyResult<()> {
        if self.stmt_map.is_empty() {
            return Ok(());
        }
        let old: Vec<Arc<Mutex<InnerStmt>>> = self.stmt_map.values().cloned().collect();
        let mut new_map = HashMap::with_capacity(old.len());
        for stmt in old {
            let (old_id, sql) = {
                let inner = stmt.lock();
                (inner.id, inner.sql.clone())
            };
            // metadata of the fresh preparation is authoritative
            let fresh = self.prepare_inner(&sql)?;
            let new_id = fresh.id;
            debug!("re-prepared statement {} as {}", old_id, new_id);
            stmt.lock().adopt(fresh);
            new_map.insert(new_id, stmt);
        }
        self.stmt_map = new_map;
        Ok(())
    }

    pub(crate) fn query_meta(
        &mut self,
        sql: &str,
    ) -> MyResult<(Vec<Column>, Option<OkPacket>)> {
        self.check_ready()?;
        let result = (|| {
            self.write_command_data(Command::COM_QUERY, sql.as_bytes())?;
            self.handle_result_set()
        })();
        if result.is_err() {
            self.rows_pending = false;
        }
        result
    }

    pub(crate) fn execute_meta(
        &mut self,
        stmt: &Statement,
        params: Params,
    ) -> MyResult<(Vec<Column>, Option<OkPacket>)> {
        self.check_ready()?;
        self.check_stmt(stmt)?;
        if params != Params::Empty {
            stmt.inner.lock().bind(params)?;
        }
        let result = self.execute_inner(stmt);
        if result.is_err() {
            self.rows_pending = false;
        }
        result
    }

    fn execute_inner(&mut self, stmt: &Statement) -> MyResult<(Vec<Column>, Option<OkPacket>)> {
        // snapshot the statement so no lock is held across wire I/O
        let (id, num_params, rebind, bound, mut long_sent) = {
            let inner = stmt.inner.lock();
            (
                inner.id,
                inner.num_params,
                inner.rebind,
                inner.bound.clone(),
                inner.long_sent.clone(),
            )
        };
        let mut writer = Vec::with_capacity(4 + 1 + 4);
        writer.write_u32::<LE>(id)?;
        // flags: no cursor
        writer.write_u8(0u8)?;
        // iteration count
        writer.write_u32::<LE>(1u32)?;
        if num_params > 0 {
            let (mut bitmap, mut values, large_ids) =
                Param::to_bin_payload(&bound, &long_sent, self.max_pkt_size)?;
            if !large_ids.is_empty() {
                for &idx in &large_ids {
                    if let Some(Some(param)) = bound.get(idx as usize) {
                        if let Value::Bytes(ref bytes) = param.value {
                            self.send_long_data_chunks(id, idx, bytes)?;
                            long_sent[idx as usize] = true;
                        }
                    }
                }
                let (rest_bitmap, rest_values, _) =
                    Param::to_bin_payload(&bound, &long_sent, self.max_pkt_size)?;
                bitmap = rest_bitmap;
                values = rest_values;
            }
            writer.extend_from_slice(&bitmap);
            writer.write_u8(rebind as u8)?;
            if rebind {
                for (i, slot) in bound.iter().enumerate() {
                    writer.extend_from_slice(&Param::type_pair(slot, long_sent[i]));
                }
            }
            writer.extend_from_slice(&values);
        }
        self.write_command_data(Command::COM_STMT_EXECUTE, &writer)?;
        let meta = self.handle_result_set()?;
        let mut inner = stmt.inner.lock();
        inner.rebind = false;
        for sent in inner.long_sent.iter_mut() {
            *sent = false;
        }
        Ok(meta)
    }

    /// Ships an oversized bound value through SEND_LONG_DATA ahead of the
    /// EXECUTE packet.
    fn send_long_data_chunks(&mut self, id: u32, param_index: u16, data: &[u8]) -> MyResult<()> {
        let chunk_size = self.max_pkt_size - 7;
        for chunk in data.chunks(chunk_size) {
            let mut body = Vec::with_capacity(6 + chunk.len());
            body.write_u32::<LE>(id)?;
            body.write_u16::<LE>(param_index)?;
            body.extend_from_slice(chunk);
            self.write_command_data(Command::COM_STMT_SEND_LONG_DATA, &body)?;
        }
        Ok(())
    }

    fn prepare_inner(&mut self, sql: &str) -> MyResult<InnerStmt> {
        self.write_command_data(Command::COM_STMT_PREPARE, sql.as_bytes())?;
        let pld = self.read_packet()?;
        match pld.first().copied() {
            Some(0x00) => {
                let header = StmtPrepareOk::from_payload(&pld)?;
                let mut params = Vec::with_capacity(header.num_params as usize);
                if header.num_params > 0 {
                    for _ in 0..header.num_params {
                        let pld = self.read_packet()?;
                        params.push(Column::from_payload(&pld)?);
                    }
                    self.read_eof_packet()?;
                }
                let mut columns = Vec::with_capacity(header.num_columns as usize);
                if header.num_columns > 0 {
                    for _ in 0..header.num_columns {
                        let pld = self.read_packet()?;
                        columns.push(Column::from_payload(&pld)?);
                    }
                    self.read_eof_packet()?;
                }
                Ok(InnerStmt::new(
                    header,
                    params,
                    columns,
                    sql.to_owned(),
                    self.token,
                ))
            }
            Some(0xff) => Err(ErrPacket::from_payload(&pld)?.into()),
            _ => Err(DriverError(UnexpectedPacket)),
        }
    }

    /// Classifies the first response packet of a command that may open a
    /// result set.
    pub(crate) fn handle_result_set(&mut self) -> MyResult<(Vec<Column>, Option<OkPacket>)> {
        let pld = self.read_packet()?;
        match pld.first().copied() {
            Some(0x00) => {
                let ok = OkPacket::from_payload(&pld)?;
                self.handle_ok(&ok);
                self.rows_pending = self.more_results_exists();
                Ok((Vec::new(), Some(ok)))
            }
            Some(0xfb) => {
                // refusing the transfer would leave the conversation
                // desynced, so the transport is dropped
                self.stream = None;
                self.rows_pending = false;
                Err(DriverError(LocalInfileNotSupported))
            }
            Some(0xff) => {
                self.rows_pending = false;
                Err(ErrPacket::from_payload(&pld)?.into())
            }
            Some(_) => {
                let mut reader = &pld[..];
                let column_count = reader.read_lenenc_int()?;
                let mut columns = Vec::with_capacity(column_count as usize);
                for _ in 0..column_count {
                    let pld = self.read_packet()?;
                    columns.push(Column::from_payload(&pld)?);
                }
                self.read_eof_packet()?;
                self.rows_pending = true;
                Ok((columns, None))
            }
            None => Err(DriverError(UnexpectedPacket)),
        }
    }

    /// Reads one text-protocol row, or `None` at the end of the stream.
    pub(crate) fn next_text(&mut self, col_count: usize) -> MyResult<Option<Row>> {
        if !self.rows_pending {
            return Ok(None);
        }
        let pld = match self.read_packet() {
            Ok(pld) => pld,
            Err(err) => {
                self.rows_pending = false;
                return Err(err);
            }
        };
        if pld.first() == Some(&0xff) {
            self.rows_pending = false;
            return Err(ErrPacket::from_payload(&pld)?.into());
        }
        if is_eof_packet(&pld) {
            let eof = EofPacket::from_payload(&pld)?;
            self.handle_eof(&eof);
            if !self.more_results_exists() {
                self.rows_pending = false;
            }
            return Ok(None);
        }
        match Value::from_payload(&pld, col_count) {
            Ok(values) => Ok(Some(values)),
            Err(err) => {
                self.rows_pending = false;
                Err(err.into())
            }
        }
    }

    /// Reads one binary-protocol row, or `None` at the end of the stream.
    pub(crate) fn next_bin(&mut self, columns: &[Column]) -> MyResult<Option<Row>> {
        if !self.rows_pending {
            return Ok(None);
        }
        let pld = match self.read_packet() {
            Ok(pld) => pld,
            Err(err) => {
                self.rows_pending = false;
                return Err(err);
            }
        };
        if pld.first() == Some(&0xff) {
            self.rows_pending = false;
            return Err(ErrPacket::from_payload(&pld)?.into());
        }
        if is_eof_packet(&pld) {
            let eof = EofPacket::from_payload(&pld)?;
            self.handle_eof(&eof);
            if !self.more_results_exists() {
                self.rows_pending = false;
            }
            return Ok(None);
        }
        match Value::from_bin_payload(&pld, columns) {
            Ok(values) => Ok(Some(values)),
            Err(err) => {
                self.rows_pending = false;
                Err(err.into())
            }
        }
    }

    fn read_ok_packet(&mut self) -> MyResult<OkPacket> {
        let pld = self.read_packet()?;
        match pld.first().copied() {
            Some(0x00) => {
                let ok = OkPacket::from_payload(&pld)?;
                self.handle_ok(&ok);
                Ok(ok)
            }
            Some(0xff) => Err(ErrPacket::from_payload(&pld)?.into()),
            _ => Err(DriverError(UnexpectedPacket)),
        }
    }

    fn read_eof_packet(&mut self) -> MyResult<()> {
        let pld = self.read_packet()?;
        if is_eof_packet(&pld) {
            let eof = EofPacket::from_payload(&pld)?;
            self.handle_eof(&eof);
        }
        Ok(())
    }

    fn handle_ok(&mut self, ok: &OkPacket) {
        self.affected_rows = ok.affected_rows;
        self.last_insert_id = ok.last_insert_id;
        self.status_flags = ok.status_flags;
        self.warnings = ok.warnings;
    }

    fn handle_eof(&mut self, eof: &EofPacket) {
        self.status_flags = eof.status_flags;
        self.warnings = eof.warnings;
    }

    fn close_conn(&mut self) -> MyResult<()> {
        let quit = self.write_command_data(Command::COM_QUIT, &[]);
        // the transport is invalidated whatever happened to COM_QUIT
        self.stream = None;
        self.rows_pending = false;
        quit
    }

    fn write_command_data(&mut self, cmd: Command, data: &[u8]) -> MyResult<()> {
        self.seq_id = 0;
        trace!("-> {:?}, {} payload byte(s)", cmd, data.len() + 1);
        let mut pld = Vec::with_capacity(1 + data.len());
        pld.push(cmd as u8);
        pld.extend_from_slice(data);
        self.write_packet(&pld)
    }

    fn read_packet(&mut self) -> MyResult<Vec<u8>> {
        let ceiling = cmp::min(self.max_pkt_size, consts::MAX_PAYLOAD_LEN);
        let seq_id = self.seq_id;
        let stream = self.stream.as_mut().ok_or(DriverError(NotConnected))?;
        let (pld, seq_id) = stream.as_io().read_packet(seq_id, ceiling)?;
        self.seq_id = seq_id;
        Ok(pld)
    }

    fn write_packet(&mut self, data: &[u8]) -> MyResult<()> {
        let ceiling = cmp::min(self.max_pkt_size, consts::MAX_PAYLOAD_LEN);
        let seq_id = self.seq_id;
        let stream = self.stream.as_mut().ok_or(DriverError(NotConnected))?;
        self.seq_id = stream.as_io().write_packet(data, seq_id, ceiling)?;
        Ok(())
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.close_conn();
        }
    }
}

fn read_fill<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod test {
    use std::io::Read as StdRead;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use bufstream::BufStream;

    use super::opts::OptsBuilder;
    use super::stmt::{InnerStmt, Statement};
    use super::Conn;
    use crate::error::{DriverError, Error};
    use crate::io::Stream;
    use crate::packet::StmtPrepareOk;

    /// A connection over a loopback socket pair, bypassing the handshake.
    fn fake_conn() -> (Conn, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        let mut conn = Conn::new(OptsBuilder::new());
        conn.stream = Some(Stream::TcpStream(BufStream::new(client)));
        (conn, server)
    }

    #[test]
    fn commands_require_a_connection() {
        let mut conn = Conn::new(OptsBuilder::new());
        match conn.ping() {
            Err(Error::DriverError(DriverError::NotConnected)) => (),
            other => panic!("expected NotConnected, got {:?}", other),
        }
        assert!(conn.query("SELECT 1").is_err());
        assert!(conn.close().is_err());
        assert!(!conn.is_connected());
    }

    #[test]
    fn connections_get_distinct_tokens() {
        let a = Conn::new(OptsBuilder::new());
        let b = Conn::new(OptsBuilder::new());
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn set_max_pkt_size_returns_old_value() {
        let mut conn = Conn::new(OptsBuilder::new());
        let old = conn.set_max_pkt_size(1024);
        assert_eq!(old, crate::consts::DEFAULT_MAX_PKT_SIZE);
        assert_eq!(conn.set_max_pkt_size(0), 1024);
        assert_eq!(conn.set_max_pkt_size(2048), 1024);
    }

    #[test]
    fn open_result_blocks_commands_without_wire_traffic() {
        let (mut conn, server) = fake_conn();
        conn.rows_pending = true;
        match conn.ping() {
            Err(Error::DriverError(DriverError::UnreadRows)) => (),
            other => panic!("expected UnreadRows, got {:?}", other),
        }
        assert!(conn.query("SELECT 1").is_err());
        assert!(conn.close().is_err());
        // nothing reached the wire
        server
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut buf = [0u8; 1];
        match (&server).read(&mut buf) {
            Err(err) => assert!(
                err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut
            ),
            Ok(n) => panic!("{} unexpected byte(s) on the wire", n),
        }
    }

    #[test]
    fn statements_are_tied_to_their_connection() {
        let (mut conn, _server) = fake_conn();
        let foreign = Statement::new(InnerStmt::new(
            StmtPrepareOk {
                statement_id: 1,
                num_columns: 0,
                num_params: 1,
                warning_count: 0,
            },
            Vec::new(),
            Vec::new(),
            "SELECT ?".into(),
            conn.token + 1,
        ));
        match conn.execute(&foreign, (1i64,)) {
            Err(Error::DriverError(DriverError::StmtOnOtherConn)) => (),
            other => panic!("expected StmtOnOtherConn, got {:?}", other.map(|_| ())),
        };
    }

    #[test]
    fn escape_string_follows_session_mode() {
        let mut conn = Conn::new(OptsBuilder::new());
        assert_eq!(conn.escape_string("it's"), "it\\'s");
        conn.status_flags = crate::consts::StatusFlags::SERVER_STATUS_NO_BACKSLASH_ESCAPES;
        assert_eq!(conn.escape_string("it's"), "it''s");
    }
}
