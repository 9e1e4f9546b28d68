use bytes::Bytes;

use crate::bencode_record;
use crate::decode::decode;
use crate::error::{BencodeError, MappingError, MetainfoError};
use crate::mapping::{to_bytes, Fields, FromBencode};
use crate::{BencodeType, InfoHash, SHA1_LEN};

const ANNOUNCE_KEY: &str = "announce";
const INFO_KEY: &str = "info";
const NAME_KEY: &str = "name";
const LENGTH_KEY: &str = "length";
const PIECE_LENGTH_KEY: &str = "piece length";
const PIECES_KEY: &str = "pieces";

/// Metainfo (`.torrent`) file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metainfo {
    /// URL of the tracker
    pub announce: String,
    /// Tiers of backup tracker URLs
    pub announce_list: Option<Vec<Vec<String>>>,
    /// Creation time in seconds since the UNIX epoch
    pub creation_date: Option<i64>,
    pub comment: Option<Bytes>,
    pub created_by: Option<Bytes>,
    /// Character encoding of the string fields
    pub encoding: Option<Bytes>,
    pub info: Info,
}

bencode_record!(Metainfo {
    announce => "announce",
    announce_list => "announce-list",
    creation_date => "creation date",
    comment => "comment",
    created_by => "created by",
    encoding => "encoding",
    info => "info",
});

/// Info dict within metainfo file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    /// Name of the file, in whatever encoding the creator used
    pub name: Bytes,
    /// Length of the file in bytes
    pub length: u64,
    /// Length of a piece of the file in bytes
    pub piece_length: u64,
    /// Concatenated SHA1 hashes of all pieces
    pub pieces: Bytes,
}

bencode_record!(Info {
    name => "name",
    length => "length",
    piece_length => "piece length",
    pieces => "pieces",
});

/// Check the required keys exist in the given dict
fn check_required_keys_exist(
    fields: &Fields<'_>,
    keys: &[&'static str],
) -> Result<(), MetainfoError> {
    match keys.iter().find(|key| !fields.contains(key)) {
        Some(key) => Err(MetainfoError::MissingKey(*key)),
        None => Ok(()),
    }
}

fn mapping_error(e: MappingError) -> MetainfoError {
    MetainfoError::Bencode(BencodeError::Mapping(e))
}

impl Metainfo {
    /// Parse the contents of a metainfo file
    pub fn new(data: &[u8]) -> Result<Metainfo, MetainfoError> {
        let value = decode(data).map_err(BencodeError::from)?;
        Metainfo::from_value(&value)
    }

    /// Build from an already decoded metainfo dict
    pub fn from_value(value: &BencodeType) -> Result<Metainfo, MetainfoError> {
        let fields = Fields::new(value).map_err(mapping_error)?;
        check_required_keys_exist(&fields, &[ANNOUNCE_KEY, INFO_KEY])?;
        let metainfo = Metainfo::from_bencode(value).map_err(mapping_error)?;

        if let BencodeType::Dict(dict) = value {
            if let Some(info) = dict.get(INFO_KEY.as_bytes()) {
                let info_fields = Fields::new(info).map_err(mapping_error)?;
                check_required_keys_exist(
                    &info_fields,
                    &[NAME_KEY, LENGTH_KEY, PIECE_LENGTH_KEY, PIECES_KEY],
                )?;
            }
        }
        Ok(metainfo)
    }
}

impl Info {
    /// Iterate over the SHA1 hashes of the pieces
    pub fn pieces(&self) -> impl Iterator<Item = &[u8]> {
        self.pieces.chunks(SHA1_LEN)
    }

    /// SHA1 of the canonical encoding of this dict
    pub fn hash(&self) -> Result<InfoHash, MappingError> {
        let bencoded_info = to_bytes(self)?;
        Ok(sha1_smol::Sha1::from(bencoded_info).digest().bytes())
    }
}
