use sha1::{Digest, Sha1};

use crate::error::TorrentParserError;

pub struct InfoFile {
    pub length: i64,
    pub md5sum: Option<String>,
    pub path: Vec<String>,
}

pub struct Info {
    pub piece_length: i64,
    pub pieces: Vec<Vec<u8>>,
    pub private: Option<bool>,
    pub name: String,
    pub files: Option<Vec<InfoFile>>,
    pub length: Option<i64>,
    pub md5sum: Option<String>,
}

pub struct TorrentMetadata {
    pub announce: String,
    pub announce_list: Option<Vec<Vec<String>>>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<i64>,
    pub encoding: Option<String>,
    pub info: Info,
    /// The `info` dictionary exactly as it appeared in the torrent file.
    pub raw_info: Vec<u8>,
}

impl TorrentMetadata {
    pub fn is_single_file(&self) -> bool {
        self.info.files.is_none()
    }

    /// Total number of content bytes: the sum of all file lengths for a
    /// multi-file torrent, otherwise the single `length` field.
    pub fn total_length(&self) -> Result<u64, TorrentParserError> {
        match &self.info.files {
            Some(files) => files.iter().try_fold(0u64, |total, file| {
                total
                    .checked_add(non_negative(file.length)?)
                    .ok_or(TorrentParserError::ContentTooLarge)
            }),
            None => {
                let length = self.info.length.ok_or_else(|| {
                    TorrentParserError::MissingRequiredField("length".to_string())
                })?;
                non_negative(length)
            }
        }
    }

    /// `total_length` as the 8 big-endian bytes carried in the announce `left` field.
    pub fn size(&self) -> Result<[u8; 8], TorrentParserError> {
        Ok(self.total_length()?.to_be_bytes())
    }

    /// SHA-1 over the raw `info` bytes.
    pub fn info_hash(&self) -> [u8; 20] {
        let digest = Sha1::digest(&self.raw_info);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        hash
    }
}

fn non_negative(length: i64) -> Result<u64, TorrentParserError> {
    u64::try_from(length).map_err(|_| {
        TorrentParserError::InvalidStructure(format!("Negative length {}", length))
    })
}
