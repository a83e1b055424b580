//! AS ranking dumps.
//!
//! A ranking dump is a JSON array of arrays. The first element of every
//! inner array describes one autonomous system:
//!
//! ```json
//! [[{"asn": "AS1", "name": "Foo", "rank": 1}], ...]
//! ```

use std::{error, fmt, fs, io};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};


//------------ AsRanking -----------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AsRanking {
    pub asn: String,
    pub name: String,
    pub rank: i64,
}


//------------ AsRankings ----------------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AsRankings {
    rankings: Vec<AsRanking>,
}

impl AsRankings {
    /// Decodes a ranking dump.
    ///
    /// Either all entries decode or none: any problem, including missing
    /// input, is an error.
    pub fn decode<R: io::Read>(input: Option<R>) -> Result<Self, RankingError> {
        let input = input.ok_or(RankingError::NoInput)?;
        let outer: Vec<Vec<serde_json::Value>> = serde_json::from_reader(
            input
        ).map_err(RankingError::Json)?;

        let mut rankings = Vec::with_capacity(outer.len());
        for (idx, inner) in outer.into_iter().enumerate() {
            let first = inner.into_iter().next().ok_or(
                RankingError::EmptyEntry(idx)
            )?;
            rankings.push(
                serde_json::from_value(first).map_err(RankingError::Json)?
            );
        }
        Ok(AsRankings { rankings })
    }

    pub fn load(path: &Path) -> Result<Self, RankingError> {
        let file = fs::File::open(path).map_err(|err| {
            RankingError::Io(path.into(), err)
        })?;
        Self::decode(Some(io::BufReader::new(file)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AsRanking> {
        self.rankings.iter()
    }

    pub fn len(&self) -> usize {
        self.rankings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }
}


//------------ RankingError --------------------------------------------------

#[derive(Debug)]
pub enum RankingError {
    NoInput,
    Io(PathBuf, io::Error),
    Json(serde_json::Error),
    EmptyEntry(usize),
}

impl fmt::Display for RankingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RankingError::NoInput => f.write_str("no ranking input"),
            RankingError::Io(path, err) => {
                write!(f, "cannot read rankings '{}': {}", path.display(), err)
            }
            RankingError::Json(err) => write!(f, "invalid rankings: {err}"),
            RankingError::EmptyEntry(idx) => {
                write!(f, "invalid rankings: entry {idx} is empty")
            }
        }
    }
}

impl error::Error for RankingError { }


//------------ Tests --------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Result<AsRankings, RankingError> {
        AsRankings::decode(Some(json.as_bytes()))
    }

    #[test]
    fn decode_single_entry() {
        let rankings = decode(
            r#"[[{"asn":"AS1","name":"Foo","rank":1}]]"#
        ).unwrap();
        assert_eq!(
            rankings.iter().collect::<Vec<_>>(),
            vec![&AsRanking { asn: "AS1".into(), name: "Foo".into(), rank: 1 }]
        );
    }

    #[test]
    fn only_first_element_counts() {
        let rankings = decode(
            r#"[[{"asn":"AS1","name":"Foo","rank":1}, "ignored"],
                [{"asn":"AS2","name":"Bar","rank":2}]]"#
        ).unwrap();
        assert_eq!(rankings.len(), 2);
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(matches!(
            AsRankings::decode(None::<&[u8]>),
            Err(RankingError::NoInput)
        ));
    }

    #[test]
    fn any_bad_entry_fails_everything() {
        assert!(decode(
            r#"[[{"asn":"AS1","name":"Foo","rank":1}], [{"asn":"AS2"}]]"#
        ).is_err());
        assert!(matches!(
            decode(r#"[[{"asn":"AS1","name":"Foo","rank":1}], []]"#),
            Err(RankingError::EmptyEntry(1))
        ));
        assert!(decode("null").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rankings.json");
        fs::write(&path, r#"[[{"asn":"AS3","name":"Baz","rank":3}]]"#).unwrap();
        assert_eq!(AsRankings::load(&path).unwrap().len(), 1);
        assert!(AsRankings::load(&dir.path().join("missing.json")).is_err());
    }
}
