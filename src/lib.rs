// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! ### mysql-native
//!
//! MySQL client library speaking the 4.1+ wire protocol directly over TCP
//! or a local socket. No C library involved.
//!
//! The crate has two layers:
//!
//! *   [`Conn`] is the protocol engine: handshake and authentication, text
//!     queries, prepared statements over the binary protocol, and streaming
//!     result sets read row by row off the wire. It is strictly sequential;
//!     a result must be drained before the next command.
//! *   [`SharedConn`] wraps one `Conn` behind a fair mutex so a single
//!     connection can be used from several threads. The mutex is held
//!     across the streaming part of a result set and across transactions.
//!
//! Prepared statements survive [`Conn::reconnect`]: the SQL is re-prepared
//! and existing [`Statement`] handles transparently pick up the fresh
//! server-side id.
//!
//! ```no_run
//! use mysql_native::{OptsBuilder, SharedConn, Value};
//!
//! fn main() -> mysql_native::Result<()> {
//!     let mut opts = OptsBuilder::new();
//!     opts.user(Some("root")).db_name(Some("test"));
//!     let conn = SharedConn::new(opts);
//!     conn.connect()?;
//!
//!     let stmt = conn.prepare("SELECT ? + ?")?;
//!     let mut result = stmt.run((3i64, 4i64))?;
//!     while let Some(row) = result.get_row()? {
//!         assert_eq!(row[0], Value::Int(7));
//!     }
//!     Ok(())
//! }
//! ```

pub mod consts;
pub mod error;
mod conn;
mod io;
mod packet;
mod scramble;
mod value;

#[doc(inline)]
pub use crate::conn::opts::{Opts, OptsBuilder};
#[doc(inline)]
pub use crate::conn::query_result::QueryResult;
#[doc(inline)]
pub use crate::conn::shared::{SharedConn, SharedResult, SharedStmt, Transaction, TxStmt};
#[doc(inline)]
pub use crate::conn::stmt::Statement;
#[doc(inline)]
pub use crate::conn::Conn;
#[doc(inline)]
pub use crate::error::{DriverError, Error, MySqlError, Result};
#[doc(inline)]
pub use crate::packet::Column;
#[doc(inline)]
pub use crate::value::{escape_quotes, escape_string, Param, Params, Row, ToParam, Value};
