mod dispatch;
mod pipeline;
mod runtime;
mod server;

use anyhow::{Result, anyhow};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::UnixStream,
};

pub use runtime::socket_path;
pub use server::run_daemon;

/// A connection to the daemon that can carry many requests.
pub struct Client {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Client {
    pub fn connect() -> Result<Self> {
        let sock = socket_path()?;
        if !sock.exists() {
            return Err(anyhow!(
                "signctl daemon is not running (socket missing at {})",
                sock.display()
            ));
        }
        let writer = UnixStream::connect(&sock)?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Self { reader, writer })
    }

    pub fn request(&mut self, req: &serde_json::Value) -> Result<serde_json::Value> {
        let line = serde_json::to_string(req)? + "\n";
        self.writer.write_all(line.as_bytes())?;
        let mut resp = String::new();
        if self.reader.read_line(&mut resp)? == 0 {
            return Err(anyhow!("daemon closed the connection"));
        }
        Ok(serde_json::from_str(&resp)?)
    }
}

pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    Client::connect()?.request(&req)
}
