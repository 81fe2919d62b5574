use crate::store::{legacy, Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

/// Migrations receive the configured heart cap so clamping matches runtime.
type MigrationFn = fn(&Store, u32) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_fold_legacy_keys", m002_fold_legacy_keys),
        ("003_normalize_profile", m003_normalize_profile),
    ]
}

/// 执行所有未应用的迁移。
///
/// 每个迁移必须幂等：进程可能在迁移完成后、版本号写入前崩溃。
/// 版本号只能前进，set_version 拒绝降级。
pub fn run(store: &Store, max_hearts: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let pending = migrations()
        .into_iter()
        .zip(1_u32..)
        .filter(|(_, version)| *version > current);

    for ((name, func), version) in pending {
        tracing::info!(version, name, "Running migration");
        func(store, max_hearts)?;
        set_version(store, version)?;
    }

    tracing::debug!(version = get_current_version(store)?, "Schema up to date");
    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.config_versions.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("schema version has {} bytes, expected 4", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .config_versions
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store, _max_hearts: u32) -> Result<(), StoreError> {
    Ok(())
}

/// Stores written by the browser bridge may hold legacy keys that no load
/// has folded yet.
fn m002_fold_legacy_keys(store: &Store, max_hearts: u32) -> Result<(), StoreError> {
    legacy::fold_if_present(store, max_hearts)?;
    Ok(())
}

/// Rewrites the profile record through the coercing loader so that
/// hand-edited or older records carry a derived level and bounded hearts.
fn m003_normalize_profile(store: &Store, max_hearts: u32) -> Result<(), StoreError> {
    if store.read_profile_value()?.is_none() {
        return Ok(());
    }
    let profile = store.load_profile(max_hearts)?;
    store.save_profile(&profile)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::constants::DEFAULT_MAX_HEARTS;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store, DEFAULT_MAX_HEARTS).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store, DEFAULT_MAX_HEARTS).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }

    #[test]
    fn legacy_fold_migration_retires_keys() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-legacy").to_str().unwrap()).unwrap();
        store
            .legacy_kv
            .insert("nivel2_completado".as_bytes(), "true".as_bytes())
            .unwrap();
        store
            .legacy_kv
            .insert("completedLessons".as_bytes(), "[1]".as_bytes())
            .unwrap();

        run(&store, DEFAULT_MAX_HEARTS).unwrap();

        assert!(store.legacy_kv.is_empty());
        let profile = store.load_profile(DEFAULT_MAX_HEARTS).unwrap();
        assert_eq!(profile.completed_lessons.len(), 2);
    }

    #[test]
    fn normalize_rewrites_derived_fields() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-norm").to_str().unwrap()).unwrap();
        store
            .profile
            .insert(
                crate::store::keys::PROFILE_KEY.as_bytes(),
                br#"{"xp":340,"level":1,"hearts":12}"#.to_vec(),
            )
            .unwrap();

        run(&store, DEFAULT_MAX_HEARTS).unwrap();

        let raw = store.read_profile_value().unwrap().unwrap();
        assert_eq!(raw["level"], 4);
        assert_eq!(raw["hearts"], DEFAULT_MAX_HEARTS);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 3).unwrap();
        let err = set_version(&store, 2).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn normalize_respects_configured_cap() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db-cap").to_str().unwrap()).unwrap();
        store
            .profile
            .insert(
                crate::store::keys::PROFILE_KEY.as_bytes(),
                br#"{"xp":0,"hearts":7}"#.to_vec(),
            )
            .unwrap();
        store
            .legacy_kv
            .insert("hearts".as_bytes(), "7".as_bytes())
            .unwrap();

        run(&store, 8).unwrap();

        let raw = store.read_profile_value().unwrap().unwrap();
        assert_eq!(raw["hearts"], 7);
    }
}
