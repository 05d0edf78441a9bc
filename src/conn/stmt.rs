// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::DriverError::{MismatchedStmtParams, NotConnected};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::packet::{Column, StmtPrepareOk};
use crate::value::{Param, Params};

/// Client-side state of a prepared statement. Shared between the owning
/// connection's statement map and every `Statement` handle, so a reconnect
/// can rewrite the metadata in place.
#[derive(Debug)]
pub(crate) struct InnerStmt {
    pub(crate) id: u32,
    pub(crate) num_columns: u16,
    pub(crate) num_params: u16,
    pub(crate) warning_count: u16,
    pub(crate) params: Vec<Column>,
    pub(crate) columns: Vec<Column>,
    /// Retained for re-preparation after reconnect.
    pub(crate) sql: String,
    pub(crate) bound: Vec<Option<Param>>,
    /// Slots whose data went through SEND_LONG_DATA since the last EXECUTE.
    pub(crate) long_sent: Vec<bool>,
    /// The next EXECUTE must re-send the parameter type block.
    pub(crate) rebind: bool,
    pub(crate) conn_token: usize,
    pub(crate) closed: bool,
}

impl InnerStmt {
    pub(crate) fn new(
        header: StmtPrepareOk,
        params: Vec<Column>,
        columns: Vec<Column>,
        sql: String,
        conn_token: usize,
    ) -> InnerStmt {
        let num_params = header.num_params as usize;
        InnerStmt {
            id: header.statement_id,
            num_columns: header.num_columns,
            num_params: header.num_params,
            warning_count: header.warning_count,
            params,
            columns,
            sql,
            bound: vec![None; num_params],
            long_sent: vec![false; num_params],
            rebind: true,
            conn_token,
            closed: false,
        }
    }

    pub(crate) fn bind(&mut self, params: Params) -> MyResult<()> {
        let values = match params {
            Params::Empty => Vec::new(),
            Params::Positional(values) => values,
        };
        if values.len() != self.num_params as usize {
            return Err(DriverError(MismatchedStmtParams(
                self.num_params,
                values.len(),
            )));
        }
        self.bound = values.into_iter().map(Some).collect();
        self.rebind = true;
        Ok(())
    }

    pub(crate) fn reset_bindings(&mut self) {
        for slot in self.bound.iter_mut() {
            *slot = None;
        }
        self.rebind = true;
    }

    /// Adopts the metadata of a fresh preparation of the same SQL, keeping
    /// existing bindings where the parameter count still matches.
    pub(crate) fn adopt(&mut self, fresh: InnerStmt) {
        self.id = fresh.id;
        self.num_columns = fresh.num_columns;
        self.num_params = fresh.num_params;
        self.warning_count = fresh.warning_count;
        self.params = fresh.params;
        self.columns = fresh.columns;
        if self.bound.len() != self.num_params as usize {
            self.bound = vec![None; self.num_params as usize];
        }
        self.long_sent = vec![false; self.num_params as usize];
        self.rebind = true;
        self.closed = false;
    }
}

/// Handle of a server-side prepared statement.
///
/// Handles survive `reconnect` transparently: the connection re-prepares the
/// SQL and rewrites the shared state, so an existing handle keeps working
/// with the fresh statement id.
#[derive(Clone, Debug)]
pub struct Statement {
    pub(crate) inner: Arc<Mutex<InnerStmt>>,
}

impl Statement {
    pub(crate) fn new(inner: InnerStmt) -> Statement {
        Statement {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Server-assigned statement id.
    pub fn id(&self) -> u32 {
        self.inner.lock().id
    }

    pub fn param_count(&self) -> u16 {
        self.inner.lock().num_params
    }

    pub fn column_count(&self) -> u16 {
        self.inner.lock().num_columns
    }

    pub fn warning_count(&self) -> u16 {
        self.inner.lock().warning_count
    }

    /// Result column descriptors.
    pub fn fields(&self) -> Vec<Column> {
        self.inner.lock().columns.clone()
    }

    /// Index of a result column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let inner = self.inner.lock();
        inner
            .columns
            .iter()
            .position(|col| col.name == name.as_bytes())
    }

    /// Binds values to the parameter markers. The number of values must
    /// match the statement's parameter count.
    pub fn bind_params<P: Into<Params>>(&self, params: P) -> MyResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(DriverError(NotConnected));
        }
        inner.bind(params.into())
    }

    /// Drops the previous parameter binding. Unbound parameters execute
    /// as NULL.
    pub fn reset_params(&self) -> MyResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(DriverError(NotConnected));
        }
        inner.reset_bindings();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{InnerStmt, Statement};
    use crate::error::{DriverError, Error};
    use crate::packet::StmtPrepareOk;
    use crate::value::Params;

    fn stmt_with_params(num_params: u16) -> Statement {
        let header = StmtPrepareOk {
            statement_id: 1,
            num_columns: 0,
            num_params,
            warning_count: 0,
        };
        Statement::new(InnerStmt::new(
            header,
            Vec::new(),
            Vec::new(),
            "DO 1".into(),
            0,
        ))
    }

    #[test]
    fn bind_checks_parameter_count() {
        let stmt = stmt_with_params(2);
        assert!(stmt.bind_params((1i32, 2i32)).is_ok());
        match stmt.bind_params((1i32,)) {
            Err(Error::DriverError(DriverError::MismatchedStmtParams(2, 1))) => (),
            other => panic!("expected MismatchedStmtParams, got {:?}", other),
        }
    }

    #[test]
    fn bind_sets_rebind_flag() {
        let stmt = stmt_with_params(1);
        stmt.inner.lock().rebind = false;
        stmt.bind_params((5i64,)).unwrap();
        assert!(stmt.inner.lock().rebind);
        stmt.inner.lock().rebind = false;
        stmt.reset_params().unwrap();
        let inner = stmt.inner.lock();
        assert!(inner.rebind);
        assert!(inner.bound[0].is_none());
    }

    #[test]
    fn adopt_preserves_bindings_and_forces_rebind() {
        let stmt = stmt_with_params(1);
        stmt.bind_params((5i64,)).unwrap();
        let fresh = InnerStmt::new(
            StmtPrepareOk {
                statement_id: 42,
                num_columns: 1,
                num_params: 1,
                warning_count: 0,
            },
            Vec::new(),
            Vec::new(),
            "DO 1".into(),
            0,
        );
        let mut inner = stmt.inner.lock();
        inner.rebind = false;
        inner.adopt(fresh);
        assert_eq!(inner.id, 42);
        assert!(inner.rebind);
        assert!(inner.bound[0].is_some());
    }

    #[test]
    fn empty_params_on_parameterless_stmt() {
        let stmt = stmt_with_params(0);
        assert!(stmt.bind_params(()).is_ok());
    }

    #[test]
    fn statements_are_shared_handles() {
        let stmt = stmt_with_params(1);
        let other = stmt.clone();
        stmt.inner.lock().id = 7;
        assert_eq!(other.id(), 7);
    }
}
