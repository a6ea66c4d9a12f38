//! Serialize paths as text, replacing bytes that are not valid UTF-8.
//!
//! File names come from whatever the filesystem holds; the ledger must still
//! be able to record them. Deserialization reads plain strings back.

use std::path::{Path, PathBuf};

use serde::Serializer;

pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        path: &Option<PathBuf>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match path {
            Some(path) => serializer.serialize_some(&*path.to_string_lossy()),
            None => serializer.serialize_none(),
        }
    }
}

pub mod many {
    use super::*;

    pub fn serialize<S: Serializer>(paths: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(paths.iter().map(|path| path.to_string_lossy()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Record {
        #[serde(serialize_with = "crate::lossy_path::serialize")]
        file: PathBuf,
        #[serde(serialize_with = "crate::lossy_path::option::serialize")]
        moved: Option<PathBuf>,
        #[serde(serialize_with = "crate::lossy_path::many::serialize")]
        others: Vec<PathBuf>,
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let odd = PathBuf::from(OsStr::from_bytes(b"/u/a\xff.dcm"));
        let record = Record {
            file: odd.clone(),
            moved: Some(odd.clone()),
            others: vec![odd, PathBuf::from("/u/b.dcm")],
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"file\":\"/u/a\u{fffd}.dcm\""));
        assert!(json.contains("\"/u/b.dcm\""));
    }

    #[test]
    fn test_none_stays_null() {
        let record = Record {
            file: PathBuf::from("a.dcm"),
            moved: None,
            others: Vec::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"file":"a.dcm","moved":null,"others":[]}"#);
    }
}
