//! # Almacén de Usuarios
//! src/users/store.rs
//!
//! Tabla `usuario -> SHA-256(password)` cacheada en memoria y persistida en
//! un archivo JSON. La escritura es atómica: archivo temporal + rename.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Formato del archivo en disco
#[derive(Debug, Default, Serialize, Deserialize)]
struct UserTable {
    users: HashMap<String, String>,
}

/// Almacén de credenciales
pub struct UserStore {
    /// Ruta al archivo de persistencia (`None` = solo memoria)
    path: Option<PathBuf>,

    /// Cache en memoria de los usuarios
    users: Mutex<HashMap<String, String>>,
}

impl UserStore {
    /// Abre el almacén y carga los usuarios existentes
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let users = if path.exists() {
            Self::load_from_file(path)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            users: Mutex::new(users),
        })
    }

    /// Almacén sin archivo, para tests
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: Mutex::new(HashMap::new()),
        }
    }

    fn load_from_file(path: &Path) -> io::Result<HashMap<String, String>> {
        let reader = BufReader::new(File::open(path)?);

        match serde_json::from_reader::<_, UserTable>(reader) {
            Ok(table) => Ok(table.users),
            Err(e) => {
                // Si el archivo está corrupto, empezar limpio
                warn!(path = %path.display(), error = %e, "corrupt user store, starting empty");
                Ok(HashMap::new())
            }
        }
    }

    fn save_to_file(&self, users: &HashMap<String, String>) -> io::Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let temp_path = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        let table = UserTable {
            users: users.clone(),
        };

        serde_json::to_writer_pretty(&mut writer, &table).map_err(io::Error::other)?;
        writer.flush()?;

        // Renombrar (atómico en sistemas Unix)
        fs::rename(&temp_path, path)
    }

    /// Digest hexadecimal que se guarda en lugar del password
    pub fn hash_password(password: &str) -> String {
        format!("{:x}", Sha256::digest(password.as_bytes()))
    }

    /// Digest guardado para `user`
    pub fn lookup(&self, user: &str) -> Option<String> {
        let users = self.users.lock().unwrap();
        users.get(user).cloned()
    }

    /// Coincidencia exacta de usuario y password
    pub fn verify(&self, user: &str, password: &str) -> bool {
        self.lookup(user)
            .map(|digest| digest == Self::hash_password(password))
            .unwrap_or(false)
    }

    /// Registra un usuario nuevo
    ///
    /// Retorna `Ok(false)` si el usuario ya existe. La comprobación y la
    /// inserción ocurren bajo el mismo lock.
    pub fn register(&self, user: &str, password: &str) -> io::Result<bool> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(user) {
            return Ok(false);
        }

        users.insert(user.to_string(), Self::hash_password(password));
        if let Err(e) = self.save_to_file(&users) {
            users.remove(user);
            return Err(e);
        }

        Ok(true)
    }

    /// Número de usuarios registrados
    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_verify() {
        let store = UserStore::in_memory();
        assert!(store.register("bob", "hi").unwrap());

        assert!(store.verify("bob", "hi"));
        assert!(!store.verify("bob", "HI"));
        assert!(!store.verify("alice", "hi"));
    }

    #[test]
    fn test_register_existing_user() {
        let store = UserStore::in_memory();
        assert!(store.register("bob", "hi").unwrap());
        assert!(!store.register("bob", "other").unwrap());
        assert!(store.verify("bob", "hi"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_passwords_are_not_stored_in_clear() {
        let store = UserStore::in_memory();
        store.register("bob", "hi").unwrap();

        let digest = store.lookup("bob").unwrap();
        assert_ne!(digest, "hi");
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_store_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        {
            let store = UserStore::open(&path).unwrap();
            store.register("persist", "secret").unwrap();
        }

        let store = UserStore::open(&path).unwrap();
        assert!(store.verify("persist", "secret"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = UserStore::open(&path).unwrap();
        assert_eq!(store.count(), 0);
    }
}
