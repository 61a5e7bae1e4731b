//! Reader for diagnosis-key export bundles.
//!
//! A bundle is a ZIP archive holding a single `export.bin` entry. The entry
//! starts with a fixed 16-byte tag followed by a protobuf-encoded
//! [`TemporaryExposureKeyExport`]. Each stage is a separate pure function so
//! fixtures can be fed in at any level.

use std::io::{Cursor, Read};

use prost::Message;
use tracing::{debug, warn};

use crate::export::{TemporaryExposureKey, TemporaryExposureKeyExport};

/// Name of the payload entry inside a bundle archive.
pub const EXPORT_ENTRY_NAME: &str = "export.bin";

/// Tag written in front of every export payload.
pub const EXPORT_HEADER: &[u8; 16] = b"EK Export v1    ";

pub const EXPORT_HEADER_LEN: usize = EXPORT_HEADER.len();

/// Errors for a bundle that cannot be turned into an [`ExportBundle`].
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("export payload is {len} bytes, shorter than the 16-byte header")]
    TruncatedHeader { len: usize },

    #[error("invalid bundle archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to read export.bin: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable export payload: {0}")]
    Payload(#[from] prost::DecodeError),
}

/// One published key, as carried in `keys` or `revised_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub key_data: Vec<u8>,
    pub rolling_start_interval_number: i32,
    pub rolling_period: i32,
    pub transmission_risk_level: i32,
    pub report_type: Option<i32>,
    pub days_since_onset_of_symptoms: Option<i32>,
}

impl From<TemporaryExposureKey> for KeyRecord {
    fn from(key: TemporaryExposureKey) -> Self {
        KeyRecord {
            rolling_start_interval_number: key.rolling_start_interval_number(),
            rolling_period: key.rolling_period(),
            transmission_risk_level: key.transmission_risk_level(),
            report_type: key.report_type,
            days_since_onset_of_symptoms: key.days_since_onset_of_symptoms,
            key_data: key.key_data.unwrap_or_default(),
        }
    }
}

/// Decoded contents of one export payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBundle {
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub region: String,
    pub batch_num: i32,
    pub batch_size: i32,
    pub keys: Vec<KeyRecord>,
    pub revised_keys: Vec<KeyRecord>,
}

impl From<TemporaryExposureKeyExport> for ExportBundle {
    fn from(export: TemporaryExposureKeyExport) -> Self {
        ExportBundle {
            start_timestamp: export.start_timestamp(),
            end_timestamp: export.end_timestamp(),
            region: export.region().to_string(),
            batch_num: export.batch_num(),
            batch_size: export.batch_size(),
            keys: export.keys.into_iter().map(KeyRecord::from).collect(),
            revised_keys: export.revised_keys.into_iter().map(KeyRecord::from).collect(),
        }
    }
}

/// Reads the `export.bin` entry out of a bundle archive.
///
/// # Errors
///
/// Returns [`BundleError::Archive`] if the bytes are not a ZIP archive or the
/// archive has no `export.bin` entry.
pub fn extract_payload(archive: &[u8]) -> Result<Vec<u8>, BundleError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut entry = archive.by_name(EXPORT_ENTRY_NAME)?;

    let mut payload = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut payload)?;
    Ok(payload)
}

/// Drops the fixed-length tag from the front of an export payload.
///
/// The tag bytes themselves are not compared; a damaged tag only shows up as
/// a decode failure afterwards.
pub fn strip_header(blob: &[u8]) -> Result<&[u8], BundleError> {
    if blob.len() < EXPORT_HEADER_LEN {
        return Err(BundleError::TruncatedHeader { len: blob.len() });
    }
    Ok(&blob[EXPORT_HEADER_LEN..])
}

/// Decodes the protobuf body that follows the tag.
pub fn decode_payload(bytes: &[u8]) -> Result<ExportBundle, BundleError> {
    let export = TemporaryExposureKeyExport::decode(bytes)?;
    let bundle = ExportBundle::from(export);

    if bundle.batch_num < 1 || bundle.batch_num > bundle.batch_size {
        warn!(
            batch_num = bundle.batch_num,
            batch_size = bundle.batch_size,
            "Bundle batch position out of range"
        );
    }

    debug!(
        region = %bundle.region,
        keys = bundle.keys.len(),
        revised_keys = bundle.revised_keys.len(),
        "Export payload decoded"
    );
    Ok(bundle)
}

/// Decodes a full export payload, tag included.
pub fn decode(blob: &[u8]) -> Result<ExportBundle, BundleError> {
    decode_payload(strip_header(blob)?)
}

/// Decodes a downloaded bundle archive end to end.
pub fn read_archive(archive: &[u8]) -> Result<ExportBundle, BundleError> {
    decode(&extract_payload(archive)?)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::export::temporary_exposure_key::ReportType;

    #[test]
    fn test_strip_header_rejects_short_blob() {
        let result = strip_header(b"EK Export v1");
        assert!(matches!(
            result,
            Err(BundleError::TruncatedHeader { len: 12 })
        ));
    }

    #[test]
    fn test_strip_header_ignores_tag_contents() {
        let mut blob = b"XXXXXXXXXXXXXXXX".to_vec();
        blob.extend_from_slice(&[1, 2, 3]);
        assert_eq!(strip_header(&blob).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_decode_header_only_is_empty_bundle() {
        // An empty protobuf body is a valid message with default fields
        let bundle = decode(EXPORT_HEADER).unwrap();
        assert_eq!(bundle.region, "");
        assert!(bundle.keys.is_empty());
        assert!(bundle.revised_keys.is_empty());
    }

    #[test]
    fn test_decode_invalid_payload() {
        let mut blob = EXPORT_HEADER.to_vec();
        blob.extend_from_slice(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(decode(&blob), Err(BundleError::Payload(_))));
    }

    #[test]
    fn test_decode_full_export() {
        let mut revised = key(&[9; 16], 20);
        revised.report_type = Some(ReportType::Revoked as i32);
        revised.days_since_onset_of_symptoms = None;

        let export = TemporaryExposureKeyExport {
            start_timestamp: Some(1_600_000_000),
            end_timestamp: Some(1_600_086_400),
            region: Some("440".to_string()),
            batch_num: Some(1),
            batch_size: Some(2),
            keys: vec![key(&[7; 16], 10), key(&[8; 15], 11)],
            revised_keys: vec![revised],
            ..Default::default()
        };

        let bundle = decode(&payload(&export)).unwrap();

        assert_eq!(bundle.start_timestamp, 1_600_000_000);
        assert_eq!(bundle.end_timestamp, 1_600_086_400);
        assert_eq!(bundle.region, "440");
        assert_eq!((bundle.batch_num, bundle.batch_size), (1, 2));
        assert_eq!(bundle.keys.len(), 2);
        assert_eq!(bundle.keys[1].key_data.len(), 15);
        assert_eq!(bundle.keys[0].rolling_start_interval_number, 10);
        assert_eq!(bundle.revised_keys[0].report_type, Some(5));
        assert_eq!(bundle.revised_keys[0].days_since_onset_of_symptoms, None);
    }

    #[test]
    fn test_absent_key_fields_use_wire_defaults() {
        let export = TemporaryExposureKeyExport {
            keys: vec![TemporaryExposureKey::default()],
            ..Default::default()
        };

        let bundle = decode(&payload(&export)).unwrap();
        let key = &bundle.keys[0];

        assert!(key.key_data.is_empty());
        assert_eq!(key.rolling_period, 144);
        assert_eq!(key.transmission_risk_level, 0);
        assert_eq!(key.report_type, None);
        assert_eq!(key.days_since_onset_of_symptoms, None);
    }

    #[test]
    fn test_read_archive() {
        let export = TemporaryExposureKeyExport {
            region: Some("440".to_string()),
            keys: vec![key(&[1; 16], 2)],
            ..Default::default()
        };

        let bundle = read_archive(&archive(&export)).unwrap();
        assert_eq!(bundle.region, "440");
        assert_eq!(bundle.keys.len(), 1);
    }

    #[test]
    fn test_read_archive_rejects_non_zip() {
        let result = read_archive(b"definitely not a zip archive");
        assert!(matches!(result, Err(BundleError::Archive(_))));
    }

    #[test]
    fn test_read_archive_requires_export_entry() {
        let bytes = archive_with("export.sig", b"signature");
        assert!(matches!(
            read_archive(&bytes),
            Err(BundleError::Archive(_))
        ));
    }
}
