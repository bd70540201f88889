/*!
Framed TCP transport to a Motion Service port.

Every message on the wire is a big-endian `u32` length followed by that many
payload bytes:

```text
[length: u32 BE][payload: length bytes]      1 <= length <= 65535
```

A payload that starts with `<?xml` is a control message (service description
or acknowledgment). Control messages are stored on the connection and are
never handed back as application data.

All calls block, bounded by a per call timeout in seconds. A timeout returns
`None` or `false` and leaves the connection usable. Any other I/O failure or
protocol violation closes the connection before the error is returned.
*/

use crate::error::{MotionError, Result};
use crate::protocol::{
    DEFAULT_ADDRESS, HEADER_SIZE_BYTES, MAX_MESSAGE_LENGTH, RECEIVE_BUFFER_SIZE,
    SOCKET_BUFFER_SIZE, TIMEOUT_READ_DATA, TIMEOUT_WAIT_FOR_DATA, TIMEOUT_WRITE_DATA, XML_MAGIC,
};
use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// True if `payload` is an in-band XML control message
pub fn is_control_message(payload: &[u8]) -> bool {
    payload.starts_with(XML_MAGIC)
}

/// Outcome of a single socket receive call
enum Received {
    Data,
    TimedOut,
    Closed,
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Zero seconds means block without a timeout
fn to_duration(seconds: u64) -> Option<Duration> {
    if seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}

/// One client connection to a Motion Service stream.
///
/// Not intended for concurrent use. Closing from another thread while a read
/// is blocked is unsupported, stop the driving thread between bounded reads
/// instead.
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    host: String,
    port: u16,
    description: Option<String>,
    control_message: Option<String>,
    intercept_control: bool,
    /// Bytes received past the end of the last complete message
    pending: BytesMut,
    /// Data message picked up by `wait_for_data`, returned by the next `read_data`
    ready: Option<Vec<u8>>,
    receive_buffer: Vec<u8>,
    read_timeout: Option<u64>,
    write_timeout: Option<u64>,
}

impl Connection {
    /// Open a connection and read the service greeting.
    ///
    /// An empty `host` connects to the local machine. Returns
    /// [`MotionError::ConnectionRefused`] if no service is listening.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let address = if host.is_empty() { DEFAULT_ADDRESS } else { host };

        let addrs: Vec<_> = (address, port)
            .to_socket_addrs()
            .map_err(|e| {
                MotionError::connection(format!("failed to parse host string {}: {}", address, e))
            })?
            .collect();

        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let stream = match (stream, last_error) {
            (Some(s), _) => s,
            (None, Some(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                return Err(MotionError::ConnectionRefused(format!("{}:{}", address, port)));
            }
            (None, Some(e)) => {
                return Err(MotionError::connection(format!(
                    "failed to connect to remote host {}:{}: {}",
                    address, port, e
                )));
            }
            (None, None) => {
                return Err(MotionError::connection(format!(
                    "no addresses found for host {}",
                    address
                )));
            }
        };

        stream
            .set_nodelay(true)
            .map_err(|e| MotionError::connection(format!("failed to disable Nagle: {}", e)))?;

        // Larger than default kernel buffers, not fatal if refused
        let sock_ref = socket2::SockRef::from(&stream);
        if let Err(e) = sock_ref.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
            debug!("Failed to set socket receive buffer size: {}", e);
        }
        if let Err(e) = sock_ref.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
            debug!("Failed to set socket send buffer size: {}", e);
        }

        let mut connection = Self {
            stream: Some(stream),
            host: address.to_string(),
            port,
            description: None,
            control_message: None,
            intercept_control: true,
            pending: BytesMut::new(),
            ready: None,
            receive_buffer: vec![0u8; RECEIVE_BUFFER_SIZE],
            read_timeout: None,
            write_timeout: None,
        };

        // First message from the service is a string description of itself
        connection.set_receive_timeout(TIMEOUT_WAIT_FOR_DATA)?;
        let greeting = connection.receive_message().map_err(|e| match e {
            MotionError::Connection(_) => e,
            other => MotionError::connection(format!(
                "failed to read greeting from {}:{}: {}",
                address, port, other
            )),
        })?;
        match greeting {
            Some(greeting) => {
                let text = String::from_utf8_lossy(&greeting).into_owned();
                if is_control_message(&greeting) {
                    connection.control_message = Some(text.clone());
                }
                info!("Connected to {}:{} ({})", address, port, text.trim());
                connection.description = Some(text);
            }
            None if connection.is_connected() => {
                warn!("Connected to {}:{} but no greeting arrived", address, port);
            }
            None => {
                return Err(MotionError::connection(format!(
                    "remote host {}:{} closed the connection during greeting",
                    address, port
                )));
            }
        }

        Ok(connection)
    }

    /// Shut down both directions and release the socket
    pub fn close(&mut self) -> Result<()> {
        let stream = self.stream.take().ok_or(MotionError::NotConnected)?;
        self.pending.clear();
        self.ready = None;
        self.read_timeout = None;
        self.write_timeout = None;

        let result = stream.shutdown(Shutdown::Both);
        drop(stream);
        debug!("Closed connection to {}:{}", self.host, self.port);

        match result {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(MotionError::connection(
                format!("failed to shutdown socket communication: {}", e),
            )),
            _ => Ok(()),
        }
    }

    /// True while the socket is open.
    ///
    /// This does not touch the socket, a broken peer is only noticed by the next
    /// read or write.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Block until the next message arrives.
    ///
    /// Returns true if a message arrived. A control message is stored and
    /// still counts as data being available. A data message is held and
    /// returned by the next `read_data`. Default timeout is 5 seconds, zero
    /// blocks indefinitely.
    pub fn wait_for_data(&mut self, timeout_seconds: Option<u64>) -> Result<bool> {
        if !self.is_connected() {
            return Err(MotionError::NotConnected);
        }
        if self.ready.is_some() {
            return Ok(true);
        }
        self.set_receive_timeout(timeout_seconds.unwrap_or(TIMEOUT_WAIT_FOR_DATA))?;

        match self.receive_message()? {
            Some(message) => {
                let control = is_control_message(&message);
                if control {
                    self.store_control_message(&message);
                }
                if !control || !self.intercept_control {
                    self.ready = Some(message);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read the next data message.
    ///
    /// A leading control message is stored and one more message is read in
    /// its place. Returns `None` on timeout or when the service closed the
    /// connection. Default timeout is 1 second.
    pub fn read_data(&mut self, timeout_seconds: Option<u64>) -> Result<Option<Vec<u8>>> {
        if !self.is_connected() {
            return Err(MotionError::NotConnected);
        }
        if let Some(message) = self.ready.take() {
            return Ok(Some(message));
        }
        self.set_receive_timeout(timeout_seconds.unwrap_or(TIMEOUT_READ_DATA))?;

        let mut message = self.receive_message()?;
        if self.intercept_control {
            if let Some(control) = message.as_deref().filter(|m| is_control_message(m)) {
                self.store_control_message(control);
                message = self.receive_message()?;
            }
        }

        Ok(message)
    }

    /// Send one message.
    ///
    /// Returns false if not connected, `data` is empty, or the send timed out
    /// before any byte was written. Default timeout is 1 second.
    pub fn write_data(&mut self, data: &[u8], timeout_seconds: Option<u64>) -> Result<bool> {
        if data.is_empty() || !self.is_connected() {
            return Ok(false);
        }

        if data.len() > MAX_MESSAGE_LENGTH {
            warn!(
                "Refusing to send {} byte message, limit is {}",
                data.len(),
                MAX_MESSAGE_LENGTH
            );
            return Err(MotionError::protocol(format!(
                "message too long to send ({} bytes)",
                data.len()
            )));
        }

        self.set_send_timeout(timeout_seconds.unwrap_or(TIMEOUT_WRITE_DATA))?;

        let mut frame = BytesMut::with_capacity(HEADER_SIZE_BYTES + data.len());
        frame.put_u32(data.len() as u32);
        frame.put_slice(data);

        let mut written = 0;
        while written < frame.len() {
            let Some(stream) = self.stream.as_mut() else {
                return Err(MotionError::NotConnected);
            };

            match stream.write(&frame[written..]) {
                Ok(0) => {
                    self.disconnect();
                    return Err(MotionError::protocol("failed to write message"));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) && written == 0 => {
                    debug!("Send timed out, nothing written");
                    return Ok(false);
                }
                Err(e) if is_timeout(&e) => {
                    self.disconnect();
                    return Err(MotionError::protocol(format!(
                        "message interrupted after {} of {} bytes",
                        written,
                        frame.len()
                    )));
                }
                Err(e) => {
                    self.disconnect();
                    return Err(MotionError::connection(format!(
                        "failed to write to socket: {}",
                        e
                    )));
                }
            }
        }

        Ok(true)
    }

    /// Most recent XML control message, kept after the connection closes
    pub fn last_control_message(&self) -> Option<&str> {
        self.control_message.as_deref()
    }

    /// Greeting sent by the service when the connection opened
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn remote_address(&self) -> &str {
        &self.host
    }

    pub fn remote_port(&self) -> u16 {
        self.port
    }

    /// When disabled, `read_data` returns control messages as data
    pub fn set_intercept_control(&mut self, intercept: bool) {
        self.intercept_control = intercept;
    }

    fn store_control_message(&mut self, message: &[u8]) {
        debug!("Received control message ({} bytes)", message.len());
        self.control_message = Some(String::from_utf8_lossy(message).into_owned());
    }

    fn set_receive_timeout(&mut self, seconds: u64) -> Result<()> {
        if self.read_timeout == Some(seconds) {
            return Ok(());
        }

        let stream = self.stream.as_ref().ok_or(MotionError::NotConnected)?;
        stream.set_read_timeout(to_duration(seconds)).map_err(|e| {
            MotionError::connection(format!("failed to set client receive time out: {}", e))
        })?;
        self.read_timeout = Some(seconds);
        Ok(())
    }

    fn set_send_timeout(&mut self, seconds: u64) -> Result<()> {
        if self.write_timeout == Some(seconds) {
            return Ok(());
        }

        let stream = self.stream.as_ref().ok_or(MotionError::NotConnected)?;
        stream.set_write_timeout(to_duration(seconds)).map_err(|e| {
            MotionError::connection(format!("failed to set client send time out: {}", e))
        })?;
        self.write_timeout = Some(seconds);
        Ok(())
    }

    /// Close without reporting errors, used on the failure paths
    fn disconnect(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error while closing connection: {}", e);
        }
    }

    /// Assemble the next complete message from pending bytes and the socket.
    ///
    /// Partial headers or payloads stay in the pending buffer across a
    /// timeout, nothing received is discarded.
    fn receive_message(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(message) = self.take_message()? {
                return Ok(Some(message));
            }
            if !self.is_connected() {
                return Ok(None);
            }

            match self.receive_chunk()? {
                Received::Data => continue,
                Received::TimedOut => return Ok(None),
                Received::Closed if self.pending.is_empty() => {
                    info!("Remote host {}:{} closed the connection", self.host, self.port);
                    self.disconnect();
                    return Ok(None);
                }
                Received::Closed => {
                    let partial = self.pending.len();
                    self.disconnect();
                    return Err(MotionError::protocol(format!(
                        "message interrupted, {} bytes of an incomplete message",
                        partial
                    )));
                }
            }
        }
    }

    /// Split one message off the front of the pending buffer if it is complete
    fn take_message(&mut self) -> Result<Option<Vec<u8>>> {
        if self.pending.len() < HEADER_SIZE_BYTES {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE_BYTES];
        header.copy_from_slice(&self.pending[..HEADER_SIZE_BYTES]);
        let length = u32::from_be_bytes(header) as usize;

        if length == 0 {
            info!("Received zero length header, remote host is shutting down");
            self.disconnect();
            return Ok(None);
        }
        if length > MAX_MESSAGE_LENGTH {
            warn!("Message header specifies invalid length {}", length);
            self.disconnect();
            return Err(MotionError::protocol(format!(
                "message header specifies invalid length {}",
                length
            )));
        }

        if self.pending.len() < HEADER_SIZE_BYTES + length {
            return Ok(None);
        }

        self.pending.advance(HEADER_SIZE_BYTES);
        let message = self.pending.split_to(length);
        Ok(Some(message.to_vec()))
    }

    /// One system receive call into the pending buffer
    fn receive_chunk(&mut self) -> Result<Received> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Err(MotionError::NotConnected);
            };

            match stream.read(&mut self.receive_buffer) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) => {
                    self.pending.extend_from_slice(&self.receive_buffer[..n]);
                    return Ok(Received::Data);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Ok(Received::TimedOut),
                Err(e) => {
                    self.disconnect();
                    return Err(MotionError::connection(format!(
                        "failed to read data from socket: {}",
                        e
                    )));
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).ok()?;
        let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
        stream.read_exact(&mut payload).ok()?;
        Some(payload)
    }

    /// Accept one client on an ephemeral port and run `serve` on it
    fn spawn_server<F>(serve: F) -> (u16, thread::JoinHandle<()>)
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve(stream);
        });
        (port, handle)
    }

    fn sensor_payload(id: i32, values: &[f32]) -> Vec<u8> {
        let mut bytes = id.to_le_bytes().to_vec();
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_end_to_end_sensor_stream() {
        let values = [0.1f32, 0.2, 9.8, 10.0, 20.0, 30.0, -1.0, -2.0, -3.0];
        let payload = sensor_payload(2, &values);
        let expected = payload.clone();

        let (port, handle) = spawn_server(move |mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            stream.write_all(&frame(&payload)).unwrap();
            // Hold the connection until the client is done
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("127.0.0.1", port).unwrap();
        assert!(client.is_connected());
        assert_eq!(client.description(), Some("MotionService v1"));
        assert_eq!(client.last_control_message(), None);

        assert!(client.wait_for_data(None).unwrap());
        let data = client.read_data(None).unwrap().unwrap();
        assert_eq!(data, expected);

        let map = format::sensor(&data);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(map[&2].accelerometer(), [0.1, 0.2, 9.8]);
        assert_eq!(map[&2].magnetometer(), [10.0, 20.0, 30.0]);
        assert_eq!(map[&2].gyroscope(), [-1.0, -2.0, -3.0]);

        // The only data message was delivered exactly once
        assert_eq!(client.read_data(Some(1)).unwrap(), None);

        assert!(client.write_data(b"done", None).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_framing_round_trip() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"echo")).unwrap();
            while let Some(payload) = read_frame(&mut stream) {
                stream.write_all(&frame(&payload)).unwrap();
            }
        });

        let mut client = Connection::connect("", port).unwrap();
        for size in [1usize, 3, 1023, 1024, 1025, 4096, MAX_MESSAGE_LENGTH] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            assert!(client.write_data(&payload, None).unwrap());
            let echoed = client.read_data(Some(5)).unwrap().unwrap();
            assert_eq!(echoed, payload, "size {}", size);
        }

        client.close().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_oversized_write_rejected() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"echo")).unwrap();
            while let Some(payload) = read_frame(&mut stream) {
                stream.write_all(&frame(&payload)).unwrap();
            }
        });

        let mut client = Connection::connect("", port).unwrap();
        let oversized = vec![0u8; MAX_MESSAGE_LENGTH + 1];
        assert!(matches!(
            client.write_data(&oversized, None),
            Err(MotionError::Protocol(_))
        ));
        assert!(client.is_connected());

        // Nothing was sent, the next message is the first one echoed back
        assert!(client.write_data(b"after", None).unwrap());
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"after");

        assert!(!client.write_data(&[], None).unwrap());

        client.close().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_control_message_is_not_data() {
        let xml = b"<?xml version=\"1.0\"?><node key=\"1\"/>".to_vec();
        let xml_copy = xml.clone();

        let (port, handle) = spawn_server(move |mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            stream.write_all(&frame(&xml)).unwrap();
            stream.write_all(&frame(b"data")).unwrap();
            stream.write_all(&frame(&xml)).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"data");
        assert_eq!(
            client.last_control_message().map(str::as_bytes),
            Some(xml_copy.as_slice())
        );

        // A control message still signals readiness but is never returned as data
        assert!(client.wait_for_data(Some(5)).unwrap());
        assert_eq!(client.read_data(Some(1)).unwrap(), None);

        client.write_data(b"done", None).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_split_and_coalesced_frames() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();

            // One frame trickled out a byte at a time
            for byte in frame(b"slow") {
                stream.write_all(&[byte]).unwrap();
                stream.flush().unwrap();
                thread::sleep(Duration::from_millis(5));
            }

            // Two frames plus the start of a third in one write
            let mut batch = frame(b"first");
            batch.extend(frame(b"second"));
            let third = frame(b"third");
            batch.extend_from_slice(&third[..3]);
            stream.write_all(&batch).unwrap();
            thread::sleep(Duration::from_millis(50));
            stream.write_all(&third[3..]).unwrap();

            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"slow");
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"first");
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"second");
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"third");

        client.write_data(b"done", None).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_read_timeout_keeps_connection() {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let (port, handle) = spawn_server(move |mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            let _ = done_rx.recv();
        });

        let mut client = Connection::connect("", port).unwrap();
        let start = Instant::now();
        assert_eq!(client.read_data(Some(1)).unwrap(), None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "{:?}", elapsed);
        assert!(client.is_connected());

        done_tx.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_data_keeps_message() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            stream.write_all(&frame(b"first")).unwrap();
            stream.write_all(&frame(b"second")).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert!(client.wait_for_data(Some(5)).unwrap());
        // Already holding a message, nothing more is read
        assert!(client.wait_for_data(Some(5)).unwrap());
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"first");
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"second");

        client.write_data(b"done", None).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_data_keeps_control_without_intercept() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            stream.write_all(&frame(b"<?xml version=\"1.0\"?><ack/>")).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        client.set_intercept_control(false);
        assert!(client.wait_for_data(Some(5)).unwrap());
        assert_eq!(
            client.read_data(Some(5)).unwrap().unwrap(),
            b"<?xml version=\"1.0\"?><ack/>"
        );
        assert_eq!(
            client.last_control_message(),
            Some("<?xml version=\"1.0\"?><ack/>")
        );

        client.write_data(b"done", None).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_data_timeout_keeps_connection() {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let (port, handle) = spawn_server(move |mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            let _ = done_rx.recv();
        });

        let mut client = Connection::connect("", port).unwrap();
        let start = Instant::now();
        assert!(!client.wait_for_data(Some(1)).unwrap());
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(client.is_connected());

        done_tx.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_partial_frame_survives_timeout() {
        let (rest_tx, rest_rx) = mpsc::channel::<()>();
        let (port, handle) = spawn_server(move |mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            let message = frame(b"payload");
            stream.write_all(&message[..6]).unwrap();
            let _ = rest_rx.recv();
            stream.write_all(&message[6..]).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert_eq!(client.read_data(Some(1)).unwrap(), None);
        assert!(client.is_connected());

        rest_tx.send(()).unwrap();
        assert_eq!(client.read_data(Some(5)).unwrap().unwrap(), b"payload");

        client.write_data(b"done", None).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_oversized_greeting_is_connection_error() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&(70000u32).to_be_bytes()).unwrap();
            let _ = read_frame(&mut stream);
        });

        let error = Connection::connect("", port).unwrap_err();
        assert!(matches!(error, MotionError::Connection(_)), "{}", error);
        handle.join().unwrap();
    }

    #[test]
    fn test_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let error = Connection::connect("127.0.0.1", port).unwrap_err();
        assert!(error.is_refused(), "{}", error);
    }

    #[test]
    fn test_invalid_host() {
        let error = Connection::connect("not a host name", 32078).unwrap_err();
        assert!(matches!(error, MotionError::Connection(_)), "{}", error);
    }

    #[test]
    fn test_oversized_header_closes_connection() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            stream.write_all(&(70000u32).to_be_bytes()).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert!(matches!(
            client.read_data(Some(5)),
            Err(MotionError::Protocol(_))
        ));
        assert!(!client.is_connected());
        handle.join().unwrap();
    }

    #[test]
    fn test_graceful_shutdown() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
        });

        let mut client = Connection::connect("", port).unwrap();
        handle.join().unwrap();

        assert_eq!(client.read_data(Some(5)).unwrap(), None);
        assert!(!client.is_connected());
        assert!(matches!(client.read_data(None), Err(MotionError::NotConnected)));
        assert!(!client.write_data(b"late", None).unwrap());
    }

    #[test]
    fn test_zero_length_header_is_shutdown() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            stream.write_all(&0u32.to_be_bytes()).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert!(!client.wait_for_data(Some(5)).unwrap());
        assert!(!client.is_connected());
        handle.join().unwrap();
    }

    #[test]
    fn test_interrupted_message() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            let partial = frame(b"truncated payload");
            stream.write_all(&partial[..8]).unwrap();
        });

        let mut client = Connection::connect("", port).unwrap();
        handle.join().unwrap();

        assert!(matches!(
            client.read_data(Some(5)),
            Err(MotionError::Protocol(_))
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_close_twice() {
        let (port, handle) = spawn_server(|mut stream| {
            stream.write_all(&frame(b"MotionService v1")).unwrap();
            let _ = read_frame(&mut stream);
        });

        let mut client = Connection::connect("", port).unwrap();
        assert_eq!(client.remote_address(), "127.0.0.1");
        assert_eq!(client.remote_port(), port);

        client.close().unwrap();
        assert!(!client.is_connected());
        assert!(matches!(client.close(), Err(MotionError::NotConnected)));
        assert_eq!(client.description(), Some("MotionService v1"));
        handle.join().unwrap();
    }
}
