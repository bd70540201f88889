/*!
Service specific binary message formats.

A data message from a Motion Service stream is a packed list of elements.
Every element starts with a little-endian `i32` sensor id followed by the
channel values for that sensor:

```text
fixed width:    [id: i32][N values]                     N = 14, 9, 9
variable width: [id: i32][M: i32][M values: f32]
```

Decoding is all-or-nothing. A buffer that does not split exactly into whole
elements decodes to an empty map, it never reports partial results or errors.
*/

use crate::codec::{LeReader, LeValue};
use crate::protocol;
use crate::rotation::rotation_matrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Data services that stream sensor elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Preview,
    Sensor,
    Raw,
    Configurable,
}

/// Primitive type of the channel values in an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Float32,
    Int16,
}

impl ValueType {
    /// Size of one value in bytes
    pub fn width(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Int16 => 2,
        }
    }
}

/// Static description of one service's element layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub service: Service,
    pub name: &'static str,
    /// Number of values per element, zero for variable length elements
    pub length: usize,
    pub value_type: ValueType,
    pub default_port: u16,
}

impl Layout {
    /// True if each element declares its own length in the stream
    pub fn is_variable(&self) -> bool {
        self.length == 0
    }

    /// Size in bytes of one fixed width element including the id
    pub fn element_size(&self) -> Option<usize> {
        if self.is_variable() {
            None
        } else {
            Some(protocol::ID_SIZE_BYTES + self.length * self.value_type.width())
        }
    }
}

/// Layout table, indexed by `Service as usize`
pub const LAYOUTS: [Layout; 4] = [
    Layout {
        service: Service::Preview,
        name: "Preview",
        length: 14,
        value_type: ValueType::Float32,
        default_port: protocol::PORT_PREVIEW,
    },
    Layout {
        service: Service::Sensor,
        name: "Sensor",
        length: 9,
        value_type: ValueType::Float32,
        default_port: protocol::PORT_SENSOR,
    },
    Layout {
        service: Service::Raw,
        name: "Raw",
        length: 9,
        value_type: ValueType::Int16,
        default_port: protocol::PORT_RAW,
    },
    Layout {
        service: Service::Configurable,
        name: "Configurable",
        length: 0,
        value_type: ValueType::Float32,
        default_port: protocol::PORT_CONFIGURABLE,
    },
];

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Preview,
        Service::Sensor,
        Service::Raw,
        Service::Configurable,
    ];

    pub fn layout(self) -> &'static Layout {
        &LAYOUTS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.layout().name
    }

    /// Parse a service name (case-insensitive)
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|service| service.name().eq_ignore_ascii_case(s.trim()))
    }

    /// Look up the service that listens on a default port
    pub fn from_port(port: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|service| service.layout().default_port == port)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Packed channel values for one sensor.
///
/// A fixed layout element only keeps its data if the length matches the
/// layout. All accessors zero-fill when the data is absent or too short.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<T> {
    data: Option<Vec<T>>,
}

impl<T: LeValue> Element<T> {
    /// Wrap `data`, `length` of zero accepts any size
    pub fn new(data: Vec<T>, length: usize) -> Self {
        if length == 0 || data.len() == length {
            Self { data: Some(data) }
        } else {
            Self { data: None }
        }
    }

    /// An element with no backing data
    pub fn absent() -> Self {
        Self { data: None }
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    /// All values, empty if there is no backing data
    pub fn access(&self) -> &[T] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Copy `length` values starting at `base`, or zeros if out of range
    pub fn get_data(&self, base: usize, length: usize) -> Vec<T> {
        let values = self.access();
        match base.checked_add(length) {
            Some(end) if end <= values.len() => values[base..end].to_vec(),
            _ => vec![T::zero(); length],
        }
    }

    fn get_array<const N: usize>(&self, base: usize) -> [T; N] {
        let mut result = [T::zero(); N];
        if let Some(values) = self.access().get(base..base + N) {
            result.copy_from_slice(values);
        }
        result
    }
}

/// A service specific element that can be built from decoded values
pub trait FormatElement: Sized {
    type Value: LeValue;

    const SERVICE: Service;

    fn from_values(values: Vec<Self::Value>) -> Self;
}

/// Preview element: filtered orientation output.
///
/// `{Gqw, Gqx, Gqy, Gqz, Lqw, Lqx, Lqy, Lqz, rx, ry, rz, ax, ay, az}`
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewElement(Element<f32>);

impl PreviewElement {
    pub const LENGTH: usize = 14;

    pub fn new(data: Vec<f32>) -> Self {
        Self(Element::new(data, Self::LENGTH))
    }

    /// Global or local orientation `[w, x, y, z]`
    pub fn quaternion(&self, local: bool) -> [f32; 4] {
        if local {
            self.0.get_array(4)
        } else {
            self.0.get_array(0)
        }
    }

    /// Local Euler angles `[x, y, z]` in radians, x-y-z rotation order
    pub fn euler(&self) -> [f32; 3] {
        self.0.get_array(8)
    }

    /// Row-major 4-by-4 rotation matrix of the global or local orientation
    pub fn matrix(&self, local: bool) -> [f32; 16] {
        rotation_matrix(self.quaternion(local))
    }

    /// Trailing three channels, reported as linear acceleration in g
    pub fn acceleration(&self) -> [f32; 3] {
        self.0.get_array(11)
    }

    pub fn access(&self) -> &[f32] {
        self.0.access()
    }
}

impl Default for PreviewElement {
    fn default() -> Self {
        Self(Element::absent())
    }
}

impl FormatElement for PreviewElement {
    type Value = f32;
    const SERVICE: Service = Service::Preview;

    fn from_values(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Sensor element: calibrated signals in real units.
///
/// `{ax, ay, az, mx, my, mz, gx, gy, gz}`
#[derive(Debug, Clone, PartialEq)]
pub struct SensorElement(Element<f32>);

impl SensorElement {
    pub const LENGTH: usize = 9;

    pub fn new(data: Vec<f32>) -> Self {
        Self(Element::new(data, Self::LENGTH))
    }

    /// Accelerometer in g
    pub fn accelerometer(&self) -> [f32; 3] {
        self.0.get_array(0)
    }

    /// Magnetometer in microtesla
    pub fn magnetometer(&self) -> [f32; 3] {
        self.0.get_array(3)
    }

    /// Gyroscope in degrees/second
    pub fn gyroscope(&self) -> [f32; 3] {
        self.0.get_array(6)
    }

    pub fn access(&self) -> &[f32] {
        self.0.access()
    }
}

impl Default for SensorElement {
    fn default() -> Self {
        Self(Element::absent())
    }
}

impl FormatElement for SensorElement {
    type Value = f32;
    const SERVICE: Service = Service::Sensor;

    fn from_values(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Raw element: unprocessed integer sensor counts, same order as [`SensorElement`]
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement(Element<i16>);

impl RawElement {
    pub const LENGTH: usize = 9;

    pub fn new(data: Vec<i16>) -> Self {
        Self(Element::new(data, Self::LENGTH))
    }

    pub fn accelerometer(&self) -> [i16; 3] {
        self.0.get_array(0)
    }

    pub fn magnetometer(&self) -> [i16; 3] {
        self.0.get_array(3)
    }

    pub fn gyroscope(&self) -> [i16; 3] {
        self.0.get_array(6)
    }

    pub fn access(&self) -> &[i16] {
        self.0.access()
    }
}

impl Default for RawElement {
    fn default() -> Self {
        Self(Element::absent())
    }
}

impl FormatElement for RawElement {
    type Value = i16;
    const SERVICE: Service = Service::Raw;

    fn from_values(values: Vec<i16>) -> Self {
        Self::new(values)
    }
}

/// Configurable element: the channel set selected by the client at connect time
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurableElement(Element<f32>);

impl ConfigurableElement {
    pub fn new(data: Vec<f32>) -> Self {
        Self(Element::new(data, 0))
    }

    /// Single channel value, zero if `index` is out of range
    pub fn value(&self, index: usize) -> f32 {
        self.0.access().get(index).copied().unwrap_or(0.0)
    }

    pub fn size(&self) -> usize {
        self.0.access().len()
    }

    pub fn range(&self, start: usize, length: usize) -> Vec<f32> {
        self.0.get_data(start, length)
    }

    pub fn access(&self) -> &[f32] {
        self.0.access()
    }
}

impl Default for ConfigurableElement {
    fn default() -> Self {
        Self(Element::absent())
    }
}

impl FormatElement for ConfigurableElement {
    type Value = f32;
    const SERVICE: Service = Service::Configurable;

    fn from_values(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Split a packed message into `id => values` using the given element length
fn id_to_values<T: LeValue>(buffer: &[u8], length: usize) -> BTreeMap<i32, Vec<T>> {
    let mut result = BTreeMap::new();
    let mut reader = LeReader::new(buffer);

    while reader.remaining() >= protocol::ID_SIZE_BYTES {
        let Some(id) = reader.read_i32() else {
            return BTreeMap::new();
        };

        let element_length = if length == 0 {
            match reader.read_i32() {
                Some(declared) if declared > 0 => declared as usize,
                _ => return BTreeMap::new(),
            }
        } else {
            length
        };

        match reader.read_values::<T>(element_length) {
            Some(values) => {
                result.insert(id, values);
            }
            None => return BTreeMap::new(),
        }
    }

    // Unused trailing bytes invalidate the whole message
    if reader.remaining() > 0 {
        return BTreeMap::new();
    }

    result
}

/// Decode a message into a map of service specific elements
pub fn decode_elements<E: FormatElement>(buffer: &[u8]) -> BTreeMap<i32, E> {
    id_to_values::<E::Value>(buffer, E::SERVICE.layout().length)
        .into_iter()
        .map(|(id, values)| (id, E::from_values(values)))
        .collect()
}

pub fn preview(buffer: &[u8]) -> BTreeMap<i32, PreviewElement> {
    decode_elements(buffer)
}

pub fn sensor(buffer: &[u8]) -> BTreeMap<i32, SensorElement> {
    decode_elements(buffer)
}

pub fn raw(buffer: &[u8]) -> BTreeMap<i32, RawElement> {
    decode_elements(buffer)
}

pub fn configurable(buffer: &[u8]) -> BTreeMap<i32, ConfigurableElement> {
    decode_elements(buffer)
}

/// One decoded message, tagged with the service it came from
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Preview(BTreeMap<i32, PreviewElement>),
    Sensor(BTreeMap<i32, SensorElement>),
    Raw(BTreeMap<i32, RawElement>),
    Configurable(BTreeMap<i32, ConfigurableElement>),
}

impl DecodedFrame {
    pub fn service(&self) -> Service {
        match self {
            Self::Preview(_) => Service::Preview,
            Self::Sensor(_) => Service::Sensor,
            Self::Raw(_) => Service::Raw,
            Self::Configurable(_) => Service::Configurable,
        }
    }

    /// Number of sensors in the message
    pub fn len(&self) -> usize {
        match self {
            Self::Preview(map) => map.len(),
            Self::Sensor(map) => map.len(),
            Self::Raw(map) => map.len(),
            Self::Configurable(map) => map.len(),
        }
    }

    /// Nothing to render for this message
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sensor ids in ascending order
    pub fn ids(&self) -> Vec<i32> {
        match self {
            Self::Preview(map) => map.keys().copied().collect(),
            Self::Sensor(map) => map.keys().copied().collect(),
            Self::Raw(map) => map.keys().copied().collect(),
            Self::Configurable(map) => map.keys().copied().collect(),
        }
    }
}

/// Decode a message from any data service
pub fn decode(service: Service, buffer: &[u8]) -> DecodedFrame {
    match service {
        Service::Preview => DecodedFrame::Preview(preview(buffer)),
        Service::Sensor => DecodedFrame::Sensor(sensor(buffer)),
        Service::Raw => DecodedFrame::Raw(raw(buffer)),
        Service::Configurable => DecodedFrame::Configurable(configurable(buffer)),
    }
}
