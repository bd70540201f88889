/*!
# Motion SDK

Client side access to Motion Service real-time data streams.

## Core Types

- [`Connection`] - Framed TCP transport to one Motion Service port
- [`Service`] - Preview, Sensor, Raw and Configurable element layouts
- [`PreviewElement`], [`SensorElement`], [`RawElement`], [`ConfigurableElement`] - Per sensor records

## Modules

- [`client`] - Length prefixed message protocol and connection lifecycle
- [`format`] - Binary message decoding into `id => element` maps
- [`rotation`] - Quaternion to rotation matrix conversion
- [`codec`] - Little-endian value decoding
- [`console`] - Scripting console request/response exchange
- [`file`] - Take file playback
- [`channels`] - Configurable service channel definitions
- [`error`] - Common error types

## Usage

```no_run
use motion_sdk::{format, Connection};

let mut client = Connection::connect("", motion_sdk::protocol::PORT_SENSOR)?;
if client.wait_for_data(None)? {
    // The first read returns the message that wait_for_data saw
    while let Some(data) = client.read_data(None)? {
        for (id, element) in format::sensor(&data) {
            println!("{} => {:?}", id, element.accelerometer());
        }
    }
}
# Ok::<(), motion_sdk::MotionError>(())
```
*/

pub mod channels;
pub mod client;
pub mod codec;
pub mod console;
pub mod error;
pub mod file;
pub mod format;
pub mod rotation;

// Re-export commonly used types
pub use client::Connection;
pub use error::{MotionError, Result};
pub use format::{
    ConfigurableElement, DecodedFrame, PreviewElement, RawElement, SensorElement, Service,
};

/// Version information for the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Largest payload accepted in either direction
    pub const MAX_MESSAGE_LENGTH: usize = 65535;

    /// Size of the big-endian message length header in bytes
    pub const HEADER_SIZE_BYTES: usize = 4;

    /// Size of the little-endian sensor id that prefixes each element
    pub const ID_SIZE_BYTES: usize = 4;

    /// Payload prefix that marks an in-band control message
    pub const XML_MAGIC: &[u8] = b"<?xml";

    /// Used when the caller passes an empty host string
    pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

    /// Size of a single socket receive call
    pub const RECEIVE_BUFFER_SIZE: usize = 1024;

    /// Requested kernel send and receive buffer size
    pub const SOCKET_BUFFER_SIZE: usize = 65536;

    /// Default timeout in seconds for `wait_for_data` and the connect greeting
    pub const TIMEOUT_WAIT_FOR_DATA: u64 = 5;

    /// Default timeout in seconds for `read_data`
    pub const TIMEOUT_READ_DATA: u64 = 1;

    /// Default timeout in seconds for `write_data`
    pub const TIMEOUT_WRITE_DATA: u64 = 1;

    pub const PORT_PREVIEW: u16 = 32079;
    pub const PORT_SENSOR: u16 = 32078;
    pub const PORT_RAW: u16 = 32077;
    pub const PORT_CONFIGURABLE: u16 = 32076;
    pub const PORT_CONSOLE: u16 = 32075;
}
