use crate::store::{Store, StoreError};

const SCHEMA_VERSION_KEY: &[u8] = b"__schema_version__";
const CURRENT_VERSION: u32 = 1;

/// Bring the store up to the current schema version. Each migration step
/// must be idempotent; the recorded version only advances on success.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let mut version = read_version(store)?;

    while version < CURRENT_VERSION {
        let next = version + 1;
        apply(store, next)?;
        write_version(store, next)?;
        tracing::info!(from = version, to = next, "Store migration applied");
        version = next;
    }

    Ok(())
}

fn apply(_store: &Store, version: u32) -> Result<(), StoreError> {
    match version {
        // v1: initial schema, trees are created lazily on open
        1 => Ok(()),
        other => Err(StoreError::Migration {
            version: other,
            message: "unknown schema version".to_string(),
        }),
    }
}

fn read_version(store: &Store) -> Result<u32, StoreError> {
    match store.raw_db().get(SCHEMA_VERSION_KEY)? {
        Some(raw) => {
            let text = String::from_utf8_lossy(&raw);
            text.parse::<u32>().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("unreadable schema version: {text}"),
            })
        }
        None => Ok(0),
    }
}

fn write_version(store: &Store, version: u32) -> Result<(), StoreError> {
    store
        .raw_db()
        .insert(SCHEMA_VERSION_KEY, version.to_string().as_bytes())?;
    Ok(())
}
