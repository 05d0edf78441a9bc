// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use crate::conn::Conn;
use crate::error::Result as MyResult;
use crate::packet::{Column, OkPacket};
use crate::value::Row;

/// A streaming result set, text or binary.
///
/// Rows are read directly off the wire, so the borrowed connection stays
/// busy until the stream is drained. Dropping the result drains whatever
/// is left, including any pending further result sets.
pub struct QueryResult<'a> {
    conn: &'a mut Conn,
    columns: Vec<Column>,
    ok_packet: Option<OkPacket>,
    is_bin: bool,
}

impl<'a> QueryResult<'a> {
    pub(crate) fn new(
        conn: &'a mut Conn,
        columns: Vec<Column>,
        ok_packet: Option<OkPacket>,
        is_bin: bool,
    ) -> QueryResult<'a> {
        QueryResult {
            conn,
            columns,
            ok_packet,
            is_bin,
        }
    }

    /// Reads the next row, or `None` at the end of the current result set.
    /// For an OK-shaped result (no fields) this is always `None`.
    pub fn get_row(&mut self) -> MyResult<Option<Row>> {
        if self.columns.is_empty() {
            return Ok(None);
        }
        if self.is_bin {
            self.conn.next_bin(&self.columns)
        } else {
            self.conn.next_text(self.columns.len())
        }
    }

    /// `true` if the server announced another result set after this one.
    pub fn more_results(&self) -> bool {
        self.conn.more_results_exists()
    }

    /// Advances to the next result set of a multi-result response.
    /// Returns `false` when there is none.
    pub fn next_result(&mut self) -> MyResult<bool> {
        if !self.more_results() {
            return Ok(false);
        }
        let (columns, ok_packet) = self.conn.handle_result_set()?;
        self.columns = columns;
        self.ok_packet = ok_packet;
        Ok(true)
    }

    /// Field descriptors of the current result set.
    pub fn fields(&self) -> &[Column] {
        &self.columns
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.name == name.as_bytes())
    }

    pub fn affected_rows(&self) -> u64 {
        self.conn.affected_rows()
    }

    pub fn last_insert_id(&self) -> u64 {
        self.conn.last_insert_id()
    }

    pub fn warnings(&self) -> u16 {
        self.ok_packet
            .as_ref()
            .map(|ok| ok.warnings)
            .unwrap_or(self.conn.warnings())
    }

    pub fn info(&self) -> Vec<u8> {
        self.ok_packet
            .as_ref()
            .map(|ok| ok.info.clone())
            .unwrap_or_default()
    }
}

impl<'a> Iterator for QueryResult<'a> {
    type Item = MyResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_row().transpose()
    }
}

impl<'a> Drop for QueryResult<'a> {
    fn drop(&mut self) {
        loop {
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
