//! Persistence port and adapters.
//!
//! The booking component sees storage as named collections of JSON records
//! keyed by ID. The only guarantee is an atomic upsert of a single record;
//! there are no transactions and no schema versions.

use crate::error::StorageError;
use crate::types::Booking;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

/// Collection holding booking records
pub const BOOKINGS: &str = "bookings";

/// Collection holding item records
pub const ITEMS: &str = "items";

/// Record storage keyed by collection and ID
pub trait RecordStore: Send + Sync {
    /// All records of a collection; empty if the collection doesn't exist
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the collection can't be read.
    fn get(&self, collection: &str) -> Result<Vec<Value>, StorageError>;

    /// Insert or replace the record with this ID
    ///
    /// On error nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails or exceeds capacity.
    fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StorageError>;
}

fn validate_collection(collection: &str) -> Result<(), StorageError> {
    let valid = !collection.is_empty()
        && collection
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidCollection(collection.to_string()))
    }
}

fn encoded_len(record: &Value) -> Result<usize, StorageError> {
    Ok(serde_json::to_vec(record)?.len())
}

// ============================================================================
// In-memory
// ============================================================================

type Collections = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
struct Memory {
    collections: Collections,
    used_bytes: usize,
}

/// Record store held in process memory
///
/// With a capacity set, the sum of encoded record sizes may not exceed it,
/// the way a browser storage quota behaves.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    memory: RwLock<Memory>,
    capacity: Option<usize>,
}

impl InMemoryRecordStore {
    /// Creates an unbounded store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store limited to `capacity` bytes of encoded records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            memory: RwLock::default(),
            capacity: Some(capacity),
        }
    }

    /// Bytes currently used by encoded records
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Poisoned`] if the lock is poisoned.
    pub fn used_bytes(&self) -> Result<usize, StorageError> {
        let memory = self.memory.read().map_err(|_| StorageError::Poisoned)?;
        Ok(memory.used_bytes)
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, collection: &str) -> Result<Vec<Value>, StorageError> {
        validate_collection(collection)?;
        let memory = self.memory.read().map_err(|_| StorageError::Poisoned)?;
        Ok(memory
            .collections
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StorageError> {
        validate_collection(collection)?;
        let size = encoded_len(&record)?;
        let mut memory = self.memory.write().map_err(|_| StorageError::Poisoned)?;

        let previous = match memory.collections.get(collection).and_then(|c| c.get(id)) {
            Some(existing) => encoded_len(existing)?,
            None => 0,
        };
        let needed = memory.used_bytes - previous + size;
        if let Some(capacity) = self.capacity {
            if needed > capacity {
                return Err(StorageError::CapacityExceeded { needed, capacity });
            }
        }

        memory
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
        memory.used_bytes = needed;
        Ok(())
    }
}

// ============================================================================
// JSON files
// ============================================================================

/// Record store keeping one JSON file per collection in a directory
///
/// Each file holds an object mapping record ID to record. Writes go to a
/// temporary file that is then renamed over the original, so a failed write
/// leaves the previous file in place. A capacity, if set, limits the size of
/// each collection file.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    dir: PathBuf,
    capacity: Option<usize>,
    write_lock: Mutex<()>,
}

impl JsonFileRecordStore {
    /// Opens (and creates if needed) a store rooted at `dir`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory can't be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            capacity: None,
            write_lock: Mutex::new(()),
        })
    }

    /// Limits each collection file to `capacity` bytes
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    fn read_collection(&self, collection: &str) -> Result<BTreeMap<String, Value>, StorageError> {
        let path = self.path_for(collection);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == IoErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(StorageError::Corrupt {
                collection: collection.to_string(),
                reason: format!("expected an object of records, found {}", json_type(&other)),
            }),
        }
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl RecordStore for JsonFileRecordStore {
    fn get(&self, collection: &str) -> Result<Vec<Value>, StorageError> {
        validate_collection(collection)?;
        Ok(self.read_collection(collection)?.into_values().collect())
    }

    fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StorageError> {
        validate_collection(collection)?;
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;

        let mut records = self.read_collection(collection)?;
        records.insert(id.to_string(), record);
        let bytes = serde_json::to_vec_pretty(&records)?;
        if let Some(capacity) = self.capacity {
            if bytes.len() > capacity {
                return Err(StorageError::CapacityExceeded {
                    needed: bytes.len(),
                    capacity,
                });
            }
        }

        let path = self.path_for(collection);
        let tmp = self.dir.join(format!(".{collection}.json.tmp"));
        fs::write(&tmp, &bytes).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })?;
        Ok(())
    }
}

// ============================================================================
// Typed repository
// ============================================================================

/// Typed access to the `bookings` collection
#[derive(Clone)]
pub struct BookingRepository {
    store: Arc<dyn RecordStore>,
}

impl BookingRepository {
    /// Wraps a record store
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Every stored booking
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the collection can't be read or a record
    /// doesn't decode as a booking.
    pub fn load_all(&self) -> Result<Vec<Booking>, StorageError> {
        self.store
            .get(BOOKINGS)?
            .into_iter()
            .map(|record| {
                serde_json::from_value(record).map_err(|e| StorageError::Corrupt {
                    collection: BOOKINGS.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Insert or replace one booking
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if encoding or the write fails.
    pub fn save(&self, booking: &Booking) -> Result<(), StorageError> {
        let record = serde_json::to_value(booking)?;
        self.store.put(BOOKINGS, &booking.id().to_string(), record)
    }
}
