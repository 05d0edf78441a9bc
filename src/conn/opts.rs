// Copyright (c) 2021 mysql-native contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Connection options.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Opts {
    /// TCP address of the server (defaults to `127.0.0.1`).
    pub(crate) ip_or_hostname: Option<String>,
    /// TCP port of the server (defaults to `3306`).
    pub(crate) tcp_port: u16,
    /// Path of the local socket (takes precedence over TCP when set).
    pub(crate) socket: Option<PathBuf>,
    /// Local address to bind the TCP socket to.
    pub(crate) bind_address: Option<SocketAddr>,
    pub(crate) user: Option<String>,
    pub(crate) pass: Option<String>,
    pub(crate) db_name: Option<String>,
    /// Commands replayed after every successful handshake, in order.
    pub(crate) init: Vec<String>,
    pub(crate) tcp_connect_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
}

impl Opts {
    pub fn get_ip_or_hostname(&self) -> &str {
        self.ip_or_hostname.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn get_tcp_port(&self) -> u16 {
        self.tcp_port
    }

    pub fn get_socket(&self) -> Option<&PathBuf> {
        self.socket.as_ref()
    }

    pub fn get_user(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    pub fn get_pass(&self) -> &str {
        self.pass.as_deref().unwrap_or("")
    }

    pub fn get_db_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or("")
    }

    pub fn get_init(&self) -> &[String] {
        &self.init
    }
}

impl Default for Opts {
    fn default() -> Opts {
        Opts {
            ip_or_hostname: Some("127.0.0.1".to_string()),
            tcp_port: 3306,
            socket: None,
            bind_address: None,
            user: None,
            pass: None,
            db_name: None,
            init: Vec::new(),
            tcp_connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Builder for [`Opts`](struct.Opts.html).
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct OptsBuilder {
    opts: Opts,
}

impl OptsBuilder {
    pub fn new() -> Self {
        OptsBuilder::default()
    }

    /// Address of the server (defaults to `127.0.0.1`).
    pub fn ip_or_hostname<T: Into<String>>(&mut self, ip_or_hostname: Option<T>) -> &mut Self {
        self.opts.ip_or_hostname = ip_or_hostname.map(Into::into);
        self
    }

    /// TCP port of the server (defaults to `3306`).
    pub fn tcp_port(&mut self, tcp_port: u16) -> &mut Self {
        self.opts.tcp_port = tcp_port;
        self
    }

    /// Path of the server's local socket. When set it is preferred over TCP.
    pub fn socket<T: Into<PathBuf>>(&mut self, socket: Option<T>) -> &mut Self {
        self.opts.socket = socket.map(Into::into);
        self
    }

    /// Local address to bind the TCP socket to before connecting.
    pub fn bind_address<T: Into<SocketAddr>>(&mut self, bind_address: Option<T>) -> &mut Self {
        self.opts.bind_address = bind_address.map(Into::into);
        self
    }

    pub fn user<T: Into<String>>(&mut self, user: Option<T>) -> &mut Self {
        self.opts.user = user.map(Into::into);
        self
    }

    pub fn pass<T: Into<String>>(&mut self, pass: Option<T>) -> &mut Self {
        self.opts.pass = pass.map(Into::into);
        self
    }

    pub fn db_name<T: Into<String>>(&mut self, db_name: Option<T>) -> &mut Self {
        self.opts.db_name = db_name.map(Into::into);
        self
    }

    /// Commands to execute after every successful handshake, including the
    /// ones performed by `reconnect`. Returned rows are discarded.
    pub fn init<T: Into<String>>(&mut self, init: Vec<T>) -> &mut Self {
        self.opts.init = init.into_iter().map(Into::into).collect();
        self
    }

    pub fn tcp_connect_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.opts.tcp_connect_timeout = timeout;
        self
    }

    /// Read deadline applied to the underlying transport.
    pub fn read_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.opts.read_timeout = timeout;
        self
    }

    /// Write deadline applied to the underlying transport.
    pub fn write_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.opts.write_timeout = timeout;
        self
    }
}

impl From<OptsBuilder> for Opts {
    fn from(builder: OptsBuilder) -> Opts {
        builder.opts
    }
}

impl From<&'_ mut OptsBuilder> for Opts {
    fn from(builder: &'_ mut OptsBuilder) -> Opts {
        builder.opts.clone()
    }
}
