/*!
Take file playback.

A take file is a plain concatenation of little-endian records with no ids or
length prefixes. The caller knows the record layout, usually one of the fixed
width service layouts.
*/

use crate::codec::LeValue;
use crate::error::{MotionError, Result};
use crate::format::FormatElement;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
pub struct TakeFile {
    input: Option<BufReader<File>>,
}

impl TakeFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("Opened take file {}", path.display());
        Ok(Self {
            input: Some(BufReader::new(file)),
        })
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some()
    }

    /// Close the input, an error if it is already closed
    pub fn close(&mut self) -> Result<()> {
        match self.input.take() {
            Some(_) => Ok(()),
            None => Err(MotionError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "take file is not open",
            ))),
        }
    }

    /// Read exactly `count` values.
    ///
    /// Returns `None` once the file is exhausted, including a partial record
    /// at the end. The file is closed at that point and every later read also
    /// returns `None`.
    pub fn read_values<T: LeValue>(&mut self, count: usize) -> Result<Option<Vec<T>>> {
        let Some(input) = self.input.as_mut() else {
            return Ok(None);
        };
        if count == 0 {
            return Ok(None);
        }

        let mut bytes = vec![0u8; count * T::WIDTH];
        match input.read_exact(&mut bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("End of take file");
                self.input = None;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let values = bytes
            .chunks_exact(T::WIDTH)
            .filter_map(T::read_le)
            .collect();
        Ok(Some(values))
    }

    pub fn read_f32(&mut self, count: usize) -> Result<Option<Vec<f32>>> {
        self.read_values(count)
    }

    pub fn read_i16(&mut self, count: usize) -> Result<Option<Vec<i16>>> {
        self.read_values(count)
    }

    /// Read one record of a fixed width service layout
    pub fn read_element<E: FormatElement>(&mut self) -> Result<Option<E>> {
        let layout = E::SERVICE.layout();
        if layout.is_variable() {
            return Err(MotionError::protocol(format!(
                "{} records have no fixed width",
                layout.name
            )));
        }

        Ok(self
            .read_values::<E::Value>(layout.length)?
            .map(E::from_values))
    }

    /// Iterate over the remaining records of a fixed width layout
    pub fn elements<E: FormatElement>(&mut self) -> Elements<'_, E> {
        Elements {
            file: self,
            done: false,
            _element: PhantomData,
        }
    }
}

/// Iterator returned by [`TakeFile::elements`]. Stops after the first error.
#[derive(Debug)]
pub struct Elements<'a, E> {
    file: &'a mut TakeFile,
    done: bool,
    _element: PhantomData<E>,
}

impl<E: FormatElement> Iterator for Elements<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.read_element::<E>() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ConfigurableElement, RawElement, SensorElement};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn take_file<T: LeValue>(values: &[T]) -> NamedTempFile {
        let mut bytes = Vec::new();
        for value in values {
            value.write_le(&mut bytes);
        }
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_f32_records() {
        let values: Vec<f32> = (0..18).map(|i| i as f32 * 0.5).collect();
        let file = take_file(&values);

        let mut take = TakeFile::open(file.path()).unwrap();
        assert_eq!(take.read_f32(9).unwrap().unwrap(), values[..9]);
        assert_eq!(take.read_f32(9).unwrap().unwrap(), values[9..]);
        assert_eq!(take.read_f32(9).unwrap(), None);
        assert!(!take.is_open());
        assert_eq!(take.read_f32(9).unwrap(), None);
    }

    #[test]
    fn test_partial_record_is_end_of_file() {
        let values: Vec<i16> = (0..13).collect();
        let file = take_file(&values);

        let mut take = TakeFile::open(file.path()).unwrap();
        assert_eq!(take.read_i16(9).unwrap().unwrap(), values[..9]);
        assert_eq!(take.read_i16(9).unwrap(), None);
        assert!(!take.is_open());
    }

    #[test]
    fn test_elements() {
        let mut values = Vec::new();
        for record in 0..3 {
            values.extend((0..9).map(|i| (record * 100 + i) as i16));
        }
        let file = take_file(&values);

        let mut take = TakeFile::open(file.path()).unwrap();
        let records: Vec<RawElement> = take
            .elements::<RawElement>()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].accelerometer(), [200, 201, 202]);
        assert_eq!(records[2].gyroscope(), [206, 207, 208]);
    }

    #[test]
    fn test_sensor_element() {
        let values = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let file = take_file(&values);

        let mut take = TakeFile::open(file.path()).unwrap();
        let element = take.read_element::<SensorElement>().unwrap().unwrap();
        assert_eq!(element.magnetometer(), [4.0, 5.0, 6.0]);
        assert!(take.read_element::<SensorElement>().unwrap().is_none());
    }

    #[test]
    fn test_variable_layout_rejected() {
        let file = take_file(&[1.0f32]);
        let mut take = TakeFile::open(file.path()).unwrap();
        assert!(take.read_element::<ConfigurableElement>().is_err());

        let mut elements = take.elements::<ConfigurableElement>();
        assert!(matches!(elements.next(), Some(Err(_))));
        assert!(elements.next().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = TakeFile::open(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(error, MotionError::Io(_)));
    }

    #[test]
    fn test_close_twice() {
        let file = take_file(&[0i16]);
        let mut take = TakeFile::open(file.path()).unwrap();
        take.close().unwrap();
        assert!(take.close().is_err());
        assert_eq!(take.read_i16(1).unwrap(), None);
    }
}
