use std::collections::HashMap;

use error::TorrentParserError;
use field::{Field, FieldReader};
use model::{Info, InfoFile, TorrentMetadata};

pub mod error;
mod field;
pub mod model;
pub mod udp;

type Dict = HashMap<String, Field>;

pub fn parse_torrent_metadata(bencoded: &[u8]) -> Result<TorrentMetadata, TorrentParserError> {
    let mut reader = FieldReader::new(bencoded);
    let parsed_structure = reader.next_field()?.ok_or(
        TorrentParserError::InvalidStructure("Expected field".to_string()),
    )?;
    if !reader.is_exhausted() {
        return Err(TorrentParserError::InvalidStructure(
            "Trailing data after root dictionary".to_string(),
        ));
    }

    // the root element should be a dictionary
    let dict = expect_dict(&parsed_structure)?;

    let announce = required_string(dict, "announce")?;

    // read optional announce-list
    let announce_list = match dict.get("announce-list") {
        Some(field) => {
            let mut announce_list = expect_list(field)?
                .iter()
                .map(|tier| {
                    expect_list(tier)?
                        .iter()
                        .map(string_value)
                        .collect::<Result<Vec<String>, TorrentParserError>>()
                })
                .collect::<Result<Vec<Vec<String>>, TorrentParserError>>()?;
            announce_list.sort();
            announce_list.dedup();
            Some(announce_list)
        }
        None => None,
    };

    let comment = optional_string(dict, "comment")?;
    let created_by = optional_string(dict, "created by")?;
    let creation_date = optional_integer(dict, "creation date")?;
    let encoding = optional_string(dict, "encoding")?;

    let info = expect_dict(required(dict, "info")?)?;
    let raw_info = reader
        .info_bytes()
        .ok_or_else(|| TorrentParserError::MissingRequiredField("info".to_string()))?
        .to_vec();

    let piece_length = required_integer(info, "piece length")?;

    // divide pieces into 20-byte SHA1 hashes
    let pieces: Vec<Vec<u8>> = match required(info, "pieces")? {
        Field::String(pieces) => {
            if pieces.len() % 20 != 0 {
                return Err(TorrentParserError::InvalidStructure(
                    "Invalid length for pieces string".to_string(),
                ));
            }
            pieces.chunks(20).map(|chunk| chunk.to_vec()).collect()
        }
        other => return Err(type_error("String", other)),
    };

    let private = optional_integer(info, "private")?.map(|private| private != 0);
    let name = required_string(info, "name")?;

    let files = match info.get("files") {
        Some(field) => Some(
            expect_list(field)?
                .iter()
                .map(parse_info_file)
                .collect::<Result<Vec<InfoFile>, TorrentParserError>>()?,
        ),
        None => None,
    };

    let length = optional_integer(info, "length")?;
    let md5sum = optional_string(info, "md5sum")?;

    Ok(TorrentMetadata {
        announce,
        announce_list,
        comment,
        created_by,
        creation_date,
        encoding,
        info: Info {
            piece_length,
            pieces,
            private,
            name,
            files,
            length,
            md5sum,
        },
        raw_info,
    })
}

pub fn parse_torrent_file(file_path: &str) -> Result<TorrentMetadata, TorrentParserError> {
    let bencoded = std::fs::read(file_path)?;
    parse_torrent_metadata(&bencoded)
}

fn parse_info_file(field: &Field) -> Result<InfoFile, TorrentParserError> {
    let file = expect_dict(field)?;
    let length = required_integer(file, "length")?;
    let md5sum = optional_string(file, "md5sum")?;
    let path = expect_list(required(file, "path")?)?
        .iter()
        .map(string_value)
        .collect::<Result<Vec<String>, TorrentParserError>>()?;

    Ok(InfoFile {
        length,
        md5sum,
        path,
    })
}

fn required<'a>(dict: &'a Dict, key: &str) -> Result<&'a Field, TorrentParserError> {
    dict.get(key)
        .ok_or_else(|| TorrentParserError::MissingRequiredField(key.to_string()))
}

fn required_string(dict: &Dict, key: &str) -> Result<String, TorrentParserError> {
    string_value(required(dict, key)?)
}

fn optional_string(dict: &Dict, key: &str) -> Result<Option<String>, TorrentParserError> {
    dict.get(key).map(string_value).transpose()
}

fn required_integer(dict: &Dict, key: &str) -> Result<i64, TorrentParserError> {
    integer_value(required(dict, key)?)
}

fn optional_integer(dict: &Dict, key: &str) -> Result<Option<i64>, TorrentParserError> {
    dict.get(key).map(integer_value).transpose()
}

fn string_value(field: &Field) -> Result<String, TorrentParserError> {
    match field {
        Field::String(value) => Ok(String::from_utf8(value.clone())?),
        other => Err(type_error("String", other)),
    }
}

fn integer_value(field: &Field) -> Result<i64, TorrentParserError> {
    match field {
        Field::Integer(value) => Ok(*value),
        other => Err(type_error("Integer", other)),
    }
}

fn expect_list(field: &Field) -> Result<&Vec<Field>, TorrentParserError> {
    match field {
        Field::List(list) => Ok(list),
        other => Err(type_error("List", other)),
    }
}

fn expect_dict(field: &Field) -> Result<&Dict, TorrentParserError> {
    match field {
        Field::Dict(dict) => Ok(dict),
        other => Err(type_error("Dict", other)),
    }
}

fn type_error(expected: &str, found: &Field) -> TorrentParserError {
    TorrentParserError::FieldTypeError {
        expected: expected.to_string(),
        found: found.field_type(),
    }
}
