//! Timestamped camera pose tables.
//!
//! Two file formats are supported, chosen by extension:
//!
//! * `.csv` text: a header row followed by one row per pose.
//!   ```txt
//!   ,timestamp,northing,easting,down,roll,pitch,yaw
//!   0,1418381798087224,5735.1,-1022.4,0.21,0.002,-0.013,1.571
//!   ...
//!   ```
//!   The leading unnamed index column is optional when reading. Columns are found by name, extra
//!   columns are ignored.
//! * `.bposes` binary, big endian:
//!   ```txt
//!   <num_poses: u64>
//!   <index: u64> <timestamp: i64> <x> <y> <z> <qx> <qy> <qz> <qw>   (f64)
//!   ...
//!   ```

use byteorder::*;
use nom::error::VerboseError;
use nom::multi::count;
use nom::number::complete::{be_f64, be_i64, be_u64};
use nom::sequence::tuple;
use nom::IResult;

use std::fs::File;
use std::io::prelude::*;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use crate::error::{require, Error};
use crate::se3::{Pose, PoseSet};

/// Opaque timestamp label attached to a pose. RobotCar uses microseconds since the epoch.
pub type Timestamp = i64;

/// Names of the pose columns, in `[x, y, z, roll, pitch, yaw]` order.
pub const POSE_COLUMNS: [&str; 6] = ["northing", "easting", "down", "roll", "pitch", "yaw"];

/// Comma separated table with a header row, every row as long as the header.
#[derive(Debug)]
pub(crate) struct Csv {
    pub header: csv::StringRecord,
    pub rows: Vec<csv::StringRecord>,
}

impl Csv {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let header = rdr.headers()?.clone();
        if header.is_empty() {
            return Err(Error::ParseError("empty table".to_string()));
        }
        let rows = rdr
            .records()
            .collect::<Result<Vec<_>, csv::Error>>()?;
        Ok(Csv {
            header: header,
            rows: rows,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        require(path)?;
        Csv::from_reader(File::open(path)?)
    }

    /// Position of the column called `name`.
    pub fn column(&self, name: &str) -> Result<usize, Error> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::ParseError(format!("missing column {}", name)))
    }

    /// Parse every value of column `col`.
    pub fn values<T: FromStr>(&self, col: usize) -> Result<Vec<T>, Error> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                T::from_str(&row[col]).map_err(|_| {
                    Error::ParseError(format!(
                        "row {}, column {}: could not parse {:?}",
                        i + 1,
                        &self.header[col],
                        &row[col]
                    ))
                })
            })
            .collect()
    }

    /// Rows of the named columns parsed as floats.
    pub fn float_rows(&self, names: &[&str]) -> Result<Vec<Vec<f64>>, Error> {
        let cols = names
            .iter()
            .map(|n| self.column(n))
            .collect::<Result<Vec<_>, Error>>()?;
        let values = cols
            .iter()
            .map(|c| self.values::<f64>(*c))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((0..self.rows.len())
            .map(|r| values.iter().map(|v| v[r]).collect())
            .collect())
    }
}

/// Poses of one camera over one traverse, with their timestamps.
///
/// `index` is the row of each pose in the table it was originally taken from, so subsets can be
/// traced back to the full traverse.
#[derive(Debug, Clone)]
pub struct PoseTable {
    pub index: Vec<usize>,
    pub timestamps: Vec<Timestamp>,
    pub poses: PoseSet,
}

impl PoseTable {
    pub fn new(timestamps: Vec<Timestamp>, poses: PoseSet) -> Result<Self, Error> {
        let index = (0..timestamps.len()).collect();
        PoseTable::with_index(index, timestamps, poses)
    }

    pub fn with_index(
        index: Vec<usize>,
        timestamps: Vec<Timestamp>,
        poses: PoseSet,
    ) -> Result<Self, Error> {
        if timestamps.len() != poses.len() || index.len() != poses.len() {
            return Err(Error::InvalidShape(format!(
                "{} index entries and {} timestamps for {} poses",
                index.len(),
                timestamps.len(),
                poses.len()
            )));
        }
        Ok(PoseTable {
            index: index,
            timestamps: timestamps,
            poses: poses,
        })
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Rows at `indices`, keeping their original index.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, Error> {
        let poses = self.poses.select(indices)?;
        Ok(PoseTable {
            index: indices.iter().map(|i| self.index[*i]).collect(),
            timestamps: indices.iter().map(|i| self.timestamps[*i]).collect(),
            poses: poses,
        })
    }

    /// Parse a table from the text format.
    pub fn parse_text(contents: &str) -> Result<Self, Error> {
        PoseTable::from_csv(Csv::from_reader(contents.as_bytes())?)
    }

    fn from_csv(csv: Csv) -> Result<Self, Error> {
        let timestamps = csv.values::<Timestamp>(csv.column("timestamp")?)?;
        let index = match csv.header.get(0) {
            Some("") => csv.values::<usize>(0)?,
            _ => (0..csv.rows.len()).collect(),
        };
        let poses = PoseSet::from_xyzrpy(&csv.float_rows(&POSE_COLUMNS)?)?;
        PoseTable::with_index(index, timestamps, poses)
    }

    pub fn from_file_text(path: &Path) -> Result<Self, Error> {
        PoseTable::from_csv(Csv::from_path(path)?)
    }

    /// Parse a table from the binary format.
    pub fn parse_binary(contents: &[u8]) -> Result<Self, Error> {
        fn parse_internal(
            input: &[u8],
        ) -> IResult<&[u8], Vec<(u64, i64, Vec<f64>)>, VerboseError<&[u8]>> {
            let (input, num_poses) = be_u64(input)?;
            count(tuple((be_u64, be_i64, count(be_f64, 7))), num_poses as usize)(input)
        }

        let (_, rows) = parse_internal(contents).map_err(|x| match x {
            nom::Err::Error(_) | nom::Err::Failure(_) => {
                Error::ParseError("Binary parse error".to_string())
            }
            nom::Err::Incomplete(x) => Error::ParseError(format!("{:?}", x)),
        })?;
        let poses = rows
            .iter()
            .map(|(_, _, p)| Pose::from_xyzquat([p[0], p[1], p[2]], [p[3], p[4], p[5], p[6]]))
            .collect::<Result<Vec<_>, Error>>()?;
        PoseTable::with_index(
            rows.iter().map(|r| r.0 as usize).collect(),
            rows.iter().map(|r| r.1).collect(),
            PoseSet::from_poses(poses)?,
        )
    }

    pub fn from_file_binary(path: &Path) -> Result<Self, Error> {
        require(path)?;
        let mut contents = Vec::new();
        File::open(path)?.read_to_end(&mut contents)?;
        PoseTable::parse_binary(&contents)
    }

    /// Read a table, choosing the format from the extension. `.csv` -> text, `.bposes` -> binary.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        match path.extension().and_then(|x| x.to_str()) {
            Some("csv") => Self::from_file_text(path),
            Some("bposes") => Self::from_file_binary(path),
            ext => Err(Error::IOError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unknown file extension {:?}", ext),
            ))),
        }
    }

    pub fn write_text_to<W: Write>(&self, w: W) -> Result<(), std::io::Error> {
        let mut wtr = csv::Writer::from_writer(w);
        wtr.write_record(["", "timestamp"].iter().chain(POSE_COLUMNS.iter()))?;
        for ((i, t), pose) in self.index.iter().zip(&self.timestamps).zip(&self.poses) {
            let mut record = vec![i.to_string(), t.to_string()];
            record.extend(pose.to_xyzrpy().iter().map(|x| x.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()
    }

    /// Write the table in the text format.
    pub fn write_text(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_text_to(&mut file)?;
        file.flush()
    }

    /// Write the table in the binary format.
    pub fn write_binary(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = BufWriter::new(File::create(path)?);
        file.write_u64::<BigEndian>(self.len() as u64)?;
        for ((i, t), pose) in self.index.iter().zip(&self.timestamps).zip(&self.poses) {
            file.write_u64::<BigEndian>(*i as u64)?;
            file.write_i64::<BigEndian>(*t)?;
            let (tr, q) = (pose.translation(), pose.rotation());
            for x in &[tr.x, tr.y, tr.z, q.v.x, q.v.y, q.v.z, q.s] {
                file.write_f64::<BigEndian>(*x)?;
            }
        }
        file.flush()
    }

    /// Write the table, choosing the format from the extension. `.csv` -> text, `.bposes` ->
    /// binary.
    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        match path.extension().and_then(|x| x.to_str()) {
            Some("csv") => self.write_text(path),
            Some("bposes") => self.write_binary(path),
            ext => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unknown file extension {:?}", ext),
            )),
        }
    }
}

impl std::fmt::Display for PoseTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => write!(
                f,
                "Pose table with {} poses from {} to {}",
                self.len(),
                first,
                last
            ),
            _ => write!(f, "Empty pose table"),
        }
    }
}
