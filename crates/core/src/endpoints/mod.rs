pub mod elastic;
pub mod file;

pub use elastic::{ElasticCursor, ElasticIndex};
pub use file::{FileSink, FileSource};

use crate::error::EndpointError;
use crate::models::TransferRecord;
use serde::{Deserialize, Serialize};

/// `{"create":{"_id":"<id>","_type":"<type>"}}`, the action line shared by the
/// bulk API and the export file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHeader {
    pub create: CreateTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTarget {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type")]
    pub collection: String,
}

/// Appends the action line and the document line for `record`, each
/// terminated by a newline.
pub fn write_create_pair(record: &TransferRecord, out: &mut Vec<u8>) -> Result<(), EndpointError> {
    if record.payload.contains(&b'\n') {
        return Err(EndpointError::MalformedRecord(format!(
            "payload of `{}` spans several lines",
            record.id
        )));
    }

    let header = CreateHeader {
        create: CreateTarget {
            id: record.id.clone(),
            collection: record.collection.clone(),
        },
    };
    serde_json::to_writer(&mut *out, &header)?;
    out.push(b'\n');
    out.extend_from_slice(&record.payload);
    out.push(b'\n');
    Ok(())
}

pub fn parse_create_header(line: &str) -> Result<CreateTarget, EndpointError> {
    let header: CreateHeader = serde_json::from_str(line)
        .map_err(|error| EndpointError::MalformedRecord(format!("bad create header: {error}")))?;
    Ok(header.create)
}
