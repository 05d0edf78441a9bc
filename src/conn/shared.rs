// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Thread-safe wrapper over [`Conn`].
//!
//! Every operation serialises on a single fair mutex per connection. For
//! commands with an OK-shaped response the mutex is released before
//! returning; a command that opens a result set keeps the mutex inside the
//! returned [`SharedResult`] until the stream is drained, errored or
//! dropped. [`Transaction`] holds the mutex from `begin` until `commit` or
//! `rollback`, so no other thread can interleave commands with the
//! transaction's own.

use std::io;
use std::sync::Arc;

use parking_lot::{FairMutex, FairMutexGuard};

use crate::conn::opts::Opts;
use crate::conn::query_result::QueryResult;
use crate::conn::stmt::Statement;
use crate::conn::Conn;
use crate::error::DriverError::{NotConnected, StmtOnOtherConn};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::packet::{Column, OkPacket};
use crate::value::{Params, Row};

/// A connection handle that is safe to share across threads.
#[derive(Clone)]
pub struct SharedConn {
    inner: Arc<FairMutex<Conn>>,
}

impl SharedConn {
    /// Creates a handler. No connection is made until
    /// [`connect`](#method.connect) is called.
    pub fn new<T: Into<Opts>>(opts: T) -> SharedConn {
        SharedConn {
            inner: Arc::new(FairMutex::new(Conn::new(opts))),
        }
    }

    pub fn connect(&self) -> MyResult<()> {
        self.inner.lock().connect()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().is_connected()
    }

    pub fn close(&self) -> MyResult<()> {
        self.inner.lock().close()
    }

    pub fn reconnect(&self) -> MyResult<()> {
        self.inner.lock().reconnect()
    }

    pub fn select_db(&self, db_name: &str) -> MyResult<()> {
        self.inner.lock().select_db(db_name)
    }

    pub fn ping(&self) -> MyResult<()> {
        self.inner.lock().ping()
    }

    pub fn thread_id(&self) -> u32 {
        self.inner.lock().thread_id()
    }

    pub fn register_init(&self, sql: &str) {
        self.inner.lock().register_init(sql)
    }

    pub fn set_max_pkt_size(&self, size: usize) -> usize {
        self.inner.lock().set_max_pkt_size(size)
    }

    pub fn escape_string(&self, text: &str) -> String {
        self.inner.lock().escape_string(text)
    }

    /// Runs a text-protocol query. If the response opens a result set the
    /// connection mutex travels inside the returned [`SharedResult`] and is
    /// released when the stream ends.
    pub fn query(&self, sql: &str) -> MyResult<SharedResult<'_>> {
        let mut guard = self.inner.lock();
        let (columns, ok_packet) = guard.query_meta(sql)?;
        Ok(SharedResult::new(guard, columns, ok_packet, false))
    }

    /// Prepares a statement bound to this shared connection.
    pub fn prepare(&self, sql: &str) -> MyResult<SharedStmt> {
        let stmt = self.inner.lock().prepare(sql)?;
        Ok(SharedStmt {
            conn: self.clone(),
            stmt,
        })
    }

    /// Starts a transaction. The connection mutex is held by the returned
    /// handle until `commit` or `rollback`; dropping the handle rolls the
    /// transaction back.
    pub fn begin(&self) -> MyResult<Transaction<'_>> {
        let mut guard = self.inner.lock();
        guard.query_drop("START TRANSACTION")?;
        Ok(Transaction {
            conn: self,
            guard: Some(guard),
        })
    }
}

/// A streaming result that owns the connection lock.
pub struct SharedResult<'a> {
    guard: Option<FairMutexGuard<'a, Conn>>,
    columns: Vec<Column>,
    ok_packet: Option<OkPacket>,
    is_bin: bool,
    affected_rows: u64,
    last_insert_id: u64,
}

impl<'a> std::fmt::Debug for SharedResult<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResult")
            .field("columns", &self.columns)
            .field("ok_packet", &self.ok_packet)
            .field("is_bin", &self.is_bin)
            .field("affected_rows", &self.affected_rows)
            .field("last_insert_id", &self.last_insert_id)
            .finish()
    }
}

impl<'a> SharedResult<'a> {
    fn new(
        guard: FairMutexGuard<'a, Conn>,
        columns: Vec<Column>,
        ok_packet: Option<OkPacket>,
        is_bin: bool,
    ) -> SharedResult<'a> {
        let affected_rows = guard.affected_rows();
        let last_insert_id = guard.last_insert_id();
        // an OK response with nothing pending does not keep the lock
        let guard = if guard.rows_pending() { Some(guard) } else { None };
        SharedResult {
            guard,
            columns,
            ok_packet,
            is_bin,
            affected_rows,
            last_insert_id,
        }
    }

    /// Reads the next row. At the end of the stream the connection lock is
    /// released, unless further result sets are pending.
    pub fn get_row(&mut self) -> MyResult<Option<Row>> {
        let conn = match self.guard.as_mut() {
            Some(guard) => guard,
            None => return Ok(None),
        };
        if self.columns.is_empty() {
            if !conn.rows_pending() {
                self.guard = None;
            }
            return Ok(None);
        }
        let row = if self.is_bin {
            conn.next_bin(&self.columns)
        } else {
            conn.next_text(self.columns.len())
        };
        match row {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                if !conn.rows_pending() {
                    self.guard = None;
                }
                Ok(None)
            }
            Err(err) => {
                self.guard = None;
                Err(err)
            }
        }
    }

    pub fn more_results(&self) -> bool {
        self.guard
            .as_ref()
            .map(|conn| conn.more_results_exists())
            .unwrap_or(false)
    }

    /// Advances to the next result set, keeping the lock. Returns `false`
    /// when the chain is exhausted.
    pub fn next_result(&mut self) -> MyResult<bool> {
        let conn = match self.guard.as_mut() {
            Some(guard) => guard,
            None => return Ok(false),
        };
        if !conn.more_results_exists() {
            return Ok(false);
        }
        match conn.handle_result_set() {
            Ok((columns, ok_packet)) => {
                self.affected_rows = conn.affected_rows();
                self.last_insert_id = conn.last_insert_id();
                self.columns = columns;
                self.ok_packet = ok_packet;
                if !conn.rows_pending() {
                    self.guard = None;
                }
                Ok(true)
            }
            Err(err) => {
                self.guard = None;
                Err(err)
            }
        }
    }

    pub fn fields(&self) -> &[Column] {
        &self.columns
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.ok_packet.as_ref().map(|ok| ok.warnings).unwrap_or(0)
    }
}

impl<'a> Iterator for SharedResult<'a> {
    type Item = MyResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_row().transpose()
    }
}

impl<'a> Drop for SharedResult<'a> {
    fn drop(&mut self) {
        while self.guard.is_some() {
            match self.get_row() {
                Ok(Some(_)) => (),
                Ok(None) => match self.next_result() {
                    Ok(true) => (),
                    _ => break,
                },
                Err(_) => break,
            }
        }
    }
}

/// A prepared statement bound to a [`SharedConn`].
#[derive(Clone)]
pub struct SharedStmt {
    conn: SharedConn,
    stmt: Statement,
}

impl SharedStmt {
    /// Binds values to the parameter markers without touching the wire.
    pub fn bind_params<P: Into<Params>>(&self, params: P) -> MyResult<()> {
        self.stmt.bind_params(params)
    }

    /// Drops the previous parameter binding.
    pub fn reset_params(&self) -> MyResult<()> {
        self.stmt.reset_params()
    }

    /// Executes the statement. Non-empty `params` re-bind first.
    pub fn run<P: Into<Params>>(&self, params: P) -> MyResult<SharedResult<'_>> {
        let mut guard = self.conn.inner.lock();
        let (columns, ok_packet) = guard.execute_meta(&self.stmt, params.into())?;
        Ok(SharedResult::new(guard, columns, ok_packet, true))
    }

    /// Streams a parameter value ahead of execution in `pkt_size - 6` byte
    /// chunks.
    pub fn send_long_data<R: io::Read>(
        &self,
        param_index: u16,
        data: R,
        pkt_size: usize,
    ) -> MyResult<()> {
        self.conn
            .inner
            .lock()
            .send_long_data(&self.stmt, param_index, data, pkt_size)
    }

    /// Sends COM_STMT_RESET and reads the reply.
    pub fn reset(&self) -> MyResult<()> {
        self.conn.inner.lock().reset_stmt(&self.stmt)
    }

    /// Destroys the statement on the server and invalidates the handle.
    pub fn delete(&self) -> MyResult<()> {
        self.conn.inner.lock().close_stmt(&self.stmt)
    }

    pub fn id(&self) -> u32 {
        self.stmt.id()
    }

    pub fn param_count(&self) -> u16 {
        self.stmt.param_count()
    }

    pub fn fields(&self) -> Vec<Column> {
        self.stmt.fields()
    }
}

/// An open transaction holding the connection mutex.
pub struct Transaction<'a> {
    conn: &'a SharedConn,
    guard: Option<FairMutexGuard<'a, Conn>>,
}

impl<'a> Transaction<'a> {
    /// Runs a query inside the transaction.
    pub fn query(&mut self, sql: &str) -> MyResult<QueryResult<'_>> {
        match self.guard.as_mut() {
            Some(guard) => guard.query(sql),
            None => Err(DriverError(NotConnected)),
        }
    }

    /// Binds a prepared statement to this transaction. Fails when the
    /// statement belongs to a different connection.
    pub fn stmt<'t>(&'t mut self, stmt: &SharedStmt) -> MyResult<TxStmt<'a, 't>> {
        if !Arc::ptr_eq(&self.conn.inner, &stmt.conn.inner) {
            return Err(DriverError(StmtOnOtherConn));
        }
        Ok(TxStmt {
            tx: self,
            stmt: stmt.stmt.clone(),
        })
    }

    /// Commits and releases the connection.
    pub fn commit(mut self) -> MyResult<()> {
        self.end("COMMIT")
    }

    /// Rolls back and releases the connection.
    pub fn rollback(mut self) -> MyResult<()> {
        self.end("ROLLBACK")
    }

    fn end(&mut self, sql: &str) -> MyResult<()> {
        match self.guard.take() {
            Some(mut guard) => guard.query_drop(sql),
            None => Err(DriverError(NotConnected)),
        }
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            let _ = guard.query_drop("ROLLBACK");
        }
    }
}

/// A statement executing under a transaction's lock.
pub struct TxStmt<'a, 't> {
    tx: &'t mut Transaction<'a>,
    stmt: Statement,
}

impl<'a, 't> TxStmt<'a, 't> {
    pub fn bind_params<P: Into<Params>>(&self, params: P) -> MyResult<()> {
        self.stmt.bind_params(params)
    }

    pub fn reset_params(&self) -> MyResult<()> {
        self.stmt.reset_params()
    }

    /// Executes the statement inside the transaction.
    pub fn run<P: Into<Params>>(&mut self, params: P) -> MyResult<QueryResult<'_>> {
        match self.tx.guard.as_mut() {
            Some(guard) => guard.execute(&self.stmt, params),
            None => Err(DriverError(NotConnected)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::SharedConn;
    use crate::conn::opts::OptsBuilder;
    use crate::error::{DriverError, Error};

    #[test]
    fn failed_command_releases_the_lock() {
        let conn = SharedConn::new(OptsBuilder::new());
        match conn.query("SELECT 1") {
            Err(Error::DriverError(DriverError::NotConnected)) => (),
            other => panic!("expected NotConnected, got {:?}", other),
        }
        // a leaked guard would deadlock here
        assert!(conn.ping().is_err());
        assert!(!conn.is_connected());
    }

    #[test]
    fn failed_begin_releases_the_lock() {
        let conn = SharedConn::new(OptsBuilder::new());
        assert!(conn.begin().is_err());
        assert!(conn.ping().is_err());
    }

    #[test]
    fn handles_are_clones_of_one_connection() {
        let conn = SharedConn::new(OptsBuilder::new());
        let other = conn.clone();
        let old = conn.set_max_pkt_size(4096);
        assert_eq!(other.set_max_pkt_size(old), 4096);
    }
}
