use super::DumpError;
use crate::Frame;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

pub const SAVVYCAN_HEADER: &str =
    "Time Stamp,ID,Extended,Bus,LEN,D1,D2,D3,D4,D5,D6,D7,D8";

/// On-disk serialization of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpFormat {
    /// can-utils `candump -l` style text log
    Candump,
    /// SavvyCAN CSV
    SavvyCan,
}

impl DumpFormat {
    pub const ALL: [DumpFormat; 2] =
        [DumpFormat::Candump, DumpFormat::SavvyCan];

    pub fn name(&self) -> &'static str {
        match self {
            DumpFormat::Candump => "candump",
            DumpFormat::SavvyCan => "savvycan",
        }
    }

    /// Appended to the bucket stem to form the file name
    pub fn suffix(&self) -> &'static str {
        match self {
            DumpFormat::Candump => "candump.txt",
            DumpFormat::SavvyCan => "savvycan.csv",
        }
    }

    /// Written once at the top of a new file
    pub fn header(&self) -> Option<&'static str> {
        match self {
            DumpFormat::Candump => None,
            DumpFormat::SavvyCan => Some(SAVVYCAN_HEADER),
        }
    }

    pub fn line(&self, frame: &Frame) -> String {
        match self {
            DumpFormat::Candump => format!(
                "({}) can{:x} {}#{}",
                frame.unix_string(),
                frame.bus,
                frame.id_string(),
                frame.data_string()
            ),
            DumpFormat::SavvyCan => {
                let mut line = format!(
                    "{},{},false,{:x},{}",
                    frame.timestamp_micros(),
                    frame.id_string(),
                    frame.bus,
                    frame.bytes.len()
                );
                for byte in frame.bytes.iter() {
                    line.push_str(&format!(",{byte:02X}"));
                }
                line
            }
        }
    }

    pub fn write_frame<W: Write>(
        &self,
        out: &mut W,
        frame: &Frame,
    ) -> io::Result<()> {
        writeln!(out, "{}", self.line(frame))
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DumpFormat {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DumpFormat::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DumpError::UnknownFormat(s.to_string()))
    }
}
