//! Environment descriptors

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dock_config::EnvironmentRecord;
use serde::{Deserialize, Serialize};

/// A managed virtual environment as seen by the rest of the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub interpreter_path: PathBuf,
    pub python_version: String,
    pub packages_count: usize,
    pub size_bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl EnvironmentDescriptor {
    /// Persisted form for the config store.
    pub fn to_record(&self) -> EnvironmentRecord {
        EnvironmentRecord {
            name: self.name.clone(),
            path: self.path.to_string_lossy().into_owned(),
            python_version: self.python_version.clone(),
            packages_count: self.packages_count,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            is_active: self.is_active,
        }
    }

    /// Rehydrate from a persisted record, re-deriving the interpreter path.
    pub fn from_record(record: &EnvironmentRecord) -> Self {
        let path = PathBuf::from(&record.path);
        let interpreter_path = crate::layout::interpreter_path(&path);
        Self {
            name: record.name.clone(),
            path,
            interpreter_path,
            python_version: record.python_version.clone(),
            packages_count: record.packages_count,
            size_bytes: record.size_bytes,
            created_at: record.created_at,
            is_active: record.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_round_trip_preserves_fields() {
        let descriptor = EnvironmentDescriptor {
            name: "main".into(),
            path: PathBuf::from("/srv/envs/main"),
            interpreter_path: PathBuf::from("/srv/envs/main/bin/python"),
            python_version: "Python 3.12.4".into(),
            packages_count: 7,
            size_bytes: 123_456,
            created_at: None,
            is_active: true,
        };

        let back = EnvironmentDescriptor::from_record(&descriptor.to_record());
        assert_eq!(back.name, descriptor.name);
        assert_eq!(back.path, descriptor.path);
        assert_eq!(back.packages_count, 7);
        assert!(back.is_active);
    }
}
