use crate::score::ScoredRecord;
use pbr::ProgressBar;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, Error, ErrorKind, Result};

mod broadcast;
pub use self::broadcast::Broadcast;

/// Identifier of a random-effect entity, e.g. a user or an item.
pub type REId = String;

/// Identifier of a physical sample, shared by every coordinate that scores it.
pub type UniqueSampleId = u64;

/// Value of a named record attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub uid: UniqueSampleId,
    pub response: f64,
    pub weight: f64,
    pub attributes: HashMap<String, Value>,
}

impl Record {
    pub fn new(uid: UniqueSampleId, response: f64) -> Self {
        Self {
            uid,
            response,
            weight: 1.,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Bundle a prediction for this record with its label, weight and tags.
    pub fn to_scored_record(&self, score: f64) -> ScoredRecord {
        ScoredRecord {
            score,
            label: Some(self.response),
            weight: self.weight,
            id_tags: self.id_tags(),
        }
    }

    /// String-valued attributes, i.e. the tags identifying this record downstream.
    pub fn id_tags(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.to_owned(), s.to_owned())))
            .collect()
    }
}

pub struct DataSet {
    pub records: Vec<Record>,
}

impl DataSet {
    /// Parse a line of a records file.
    ///
    /// The line should be in the following format:
    /// uid response weight name1:value1 name2:value2 ... namek:valuek
    ///
    /// Attribute values are kept as strings since they name entities.
    fn parse_record_line(line: &str) -> Result<Record> {
        let mut token_iter = line.split_whitespace();
        let uid = token_iter
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(ErrorKind::InvalidData)?;
        let response = token_iter
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or(ErrorKind::InvalidData)?;
        let weight = token_iter
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or(ErrorKind::InvalidData)?;

        let mut record = Record::new(uid, response);
        record.weight = weight;
        for name_value_pair_str in token_iter {
            let mut name_value_pair_iter = name_value_pair_str.splitn(2, ':');
            let name = name_value_pair_iter
                .next()
                .filter(|s| !s.is_empty())
                .ok_or(ErrorKind::InvalidData)?;
            let value = name_value_pair_iter
                .next()
                .filter(|s| !s.is_empty())
                .ok_or(ErrorKind::InvalidData)?;
            record = record.with_attribute(name, value);
        }

        Ok(record)
    }

    /// Load a records file whose first line holds the number of records.
    pub fn load_records_file(path: &str) -> Result<Self> {
        info!("Loading records from {}", path);
        let start_t = time::precise_time_s();

        let mut lines = BufReader::new(File::open(path)?).lines();

        let n_records = {
            let header_line = lines.next().ok_or(ErrorKind::InvalidData)??;
            header_line
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::new(ErrorKind::InvalidData, "Malformed header line"))?
        };

        let mut records = Vec::new();
        let mut pb = ProgressBar::on(::std::io::stderr(), n_records);
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(Self::parse_record_line(&line)?);
            pb.inc();
        }
        pb.finish();
        if n_records as usize != records.len() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Expected {} records, only read {} lines",
                    n_records,
                    records.len()
                ),
            ));
        }

        info!(
            "Loaded {} records; it took {:.2}s",
            n_records,
            time::precise_time_s() - start_t
        );
        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::{Record, Value};

    #[test]
    fn test_parse_record_line() {
        let record = super::DataSet::parse_record_line("42 1 0.5 userId:u1 itemId:i7").unwrap();
        assert_eq!(42, record.uid);
        assert_eq!(1., record.response);
        assert_eq!(0.5, record.weight);
        assert_eq!(
            hashmap! {
                "userId".to_owned() => Value::from("u1"),
                "itemId".to_owned() => Value::from("i7"),
            },
            record.attributes
        );
    }

    #[test]
    fn test_parse_record_line_malformed() {
        assert!(super::DataSet::parse_record_line("x 1 1").is_err());
        assert!(super::DataSet::parse_record_line("1 1").is_err());
        assert!(super::DataSet::parse_record_line("1 1 1 userId").is_err());
        assert!(super::DataSet::parse_record_line("1 1 1 :u1").is_err());
    }

    #[test]
    fn test_id_tags_skip_non_strings() {
        let record = Record::new(1, 0.)
            .with_attribute("userId", "u1")
            .with_attribute("age", Value::Int(30));
        assert_eq!(
            btreemap! {"userId".to_owned() => "u1".to_owned()},
            record.id_tags()
        );
    }
}
