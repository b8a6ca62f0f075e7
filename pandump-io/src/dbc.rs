use crate::{IdSource, IdSourceError};
use can_dbc::{DBC, MessageId};
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

/// Message ids declared in a DBC file
#[derive(Debug, Clone)]
pub struct DbcFile {
    name: String,
    ids: Vec<u32>,
}

impl DbcFile {
    pub fn open(filename: &str) -> Result<Self, IdSourceError> {
        let read_err = |e| IdSourceError::Read {
            path: filename.to_string(),
            source: e,
        };
        let mut f = File::open(filename).map_err(read_err)?;
        let mut buffer = Vec::new();
        f.read_to_end(&mut buffer).map_err(read_err)?;
        Self::from_slice(filename, &buffer)
    }

    pub fn from_slice(
        name: &str,
        buffer: &[u8],
    ) -> Result<Self, IdSourceError> {
        let dbc = DBC::from_slice(buffer).map_err(|e| IdSourceError::Dbc {
            path: name.to_string(),
            reason: format!("{:?}", e),
        })?;

        let ids = dbc
            .messages()
            .iter()
            .map(|m| match *m.message_id() {
                MessageId::Standard(id) => id as u32,
                MessageId::Extended(id) => id,
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            ids,
        })
    }
}

impl IdSource for DbcFile {
    fn name(&self) -> String {
        let path = Path::new(&self.name);
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name)
            .to_owned()
    }

    fn ids(&self) -> Vec<u32> {
        self.ids.clone()
    }
}
