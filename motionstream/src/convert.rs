/*!
Take file to delimited text conversion.

Reads Sensor (`f32`) or Raw (`i16`) take files and writes one row per record,
suitable for spreadsheet import. When every non-accelerometer channel of the
first record is zero the file is treated as accelerometer only and those
columns are left out.
*/

use anyhow::{Context, Result};
use motion_sdk::codec::LeValue;
use motion_sdk::file::TakeFile;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Column names, temperature only present in some take files
pub const CHANNEL_NAMES: [&str; 10] = [
    "ax", "ay", "az", "mx", "my", "mz", "gx", "gy", "gz", "temp",
];

/// Channels in a record without temperature
const BASE_CHANNELS: usize = 9;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Input is Raw `i16` records instead of Sensor `f32` records
    pub raw: bool,
    /// Write a header row of channel names
    pub show_names: bool,
    pub separator: String,
    /// Records carry a tenth temperature channel
    pub temperature: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            raw: false,
            show_names: true,
            separator: ",".to_string(),
            temperature: false,
        }
    }
}

impl ConvertOptions {
    fn width(&self) -> usize {
        if self.temperature {
            BASE_CHANNELS + 1
        } else {
            BASE_CHANNELS
        }
    }
}

/// Where converted text goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    /// All inputs appended to one file
    File(PathBuf),
    /// One `<input>.csv` file next to each input
    AutoName,
}

impl OutputTarget {
    /// `-` selects standard output
    pub fn from_arg(arg: Option<&Path>) -> Self {
        match arg {
            Some(path) if path.as_os_str() == "-" => Self::Stdout,
            Some(path) => Self::File(path.to_path_buf()),
            None => Self::AutoName,
        }
    }
}

pub fn auto_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".csv");
    PathBuf::from(name)
}

/// Convert every input, returns the total number of rows written
pub fn run(inputs: &[PathBuf], target: &OutputTarget, options: &ConvertOptions) -> Result<u64> {
    let mut total = 0;

    match target {
        OutputTarget::Stdout => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for input in inputs {
                total += binary_to_text(input, &mut out, options)?;
            }
        }
        OutputTarget::File(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut out = BufWriter::new(file);
            for input in inputs {
                total += binary_to_text(input, &mut out, options)?;
            }
            out.flush()?;
            info!("Wrote {} rows to {}", total, path.display());
        }
        OutputTarget::AutoName => {
            for input in inputs {
                let path = auto_output_path(input);
                let file = File::create(&path).with_context(|| {
                    format!("Failed to create output file: {}", path.display())
                })?;
                let mut out = BufWriter::new(file);
                let rows = binary_to_text(input, &mut out, options)?;
                out.flush()?;
                info!("Wrote {} rows to {}", rows, path.display());
                total += rows;
            }
        }
    }

    Ok(total)
}

/// Convert one take file, returns the number of data rows written
pub fn binary_to_text<W: Write>(input: &Path, out: &mut W, options: &ConvertOptions) -> Result<u64> {
    let mut file = TakeFile::open(input)
        .with_context(|| format!("Failed to open take file: {}", input.display()))?;

    let rows = if options.raw {
        write_records::<i16, W>(&mut file, out, options)
    } else {
        write_records::<f32, W>(&mut file, out, options)
    }
    .with_context(|| format!("Failed to convert {}", input.display()))?;

    if rows == 0 {
        warn!("No complete records in {}", input.display());
    }
    Ok(rows)
}

fn write_records<T, W>(file: &mut TakeFile, out: &mut W, options: &ConvertOptions) -> Result<u64>
where
    T: LeValue + Display + PartialEq,
    W: Write,
{
    let width = options.width();
    let Some(first) = file.read_values::<T>(width)? else {
        return Ok(0);
    };

    let columns = select_columns(&first, width);

    if options.show_names {
        write_row(out, &CHANNEL_NAMES, &columns, &options.separator)?;
    }
    write_row(out, &first, &columns, &options.separator)?;
    let mut rows = 1;

    while let Some(record) = file.read_values::<T>(width)? {
        write_row(out, &record, &columns, &options.separator)?;
        rows += 1;
    }

    Ok(rows)
}

/// Column indices to print, accelerometer only files drop mx..gz
fn select_columns<T: LeValue + PartialEq>(first: &[T], width: usize) -> Vec<usize> {
    let accel_only = first[3..BASE_CHANNELS].iter().all(|v| *v == T::zero());
    (0..width)
        .filter(|&i| !accel_only || i < 3 || i >= BASE_CHANNELS)
        .collect()
}

fn write_row<T: Display, W: Write>(
    out: &mut W,
    values: &[T],
    columns: &[usize],
    separator: &str,
) -> io::Result<()> {
    for (n, &i) in columns.iter().enumerate() {
        if n > 0 {
            out.write_all(separator.as_bytes())?;
        }
        write!(out, "{}", values[i])?;
    }
    writeln!(out)
}
