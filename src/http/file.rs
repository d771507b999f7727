//! # Archivos Mapeados en Memoria
//! src/http/file.rs
//!
//! El archivo pedido se mapea de solo lectura y se envía directamente desde
//! el mapeo con un write vectorizado, sin copiarlo al buffer de escritura.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::ptr;

/// Región de solo lectura mapeada desde un archivo (no vacío)
pub struct MappedFile {
    addr: *mut libc::c_void,
    len: usize,
}

// El mapeo es de solo lectura y nadie lo modifica mientras existe.
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Mapea `len` bytes de `file`
    ///
    /// `len` debe ser > 0: mmap no acepta regiones vacías.
    pub fn map(file: &File, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { addr, len })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr as *const u8, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_file_contents() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"<html>hola</html>").unwrap();

        let mapped = MappedFile::map(&file, 17).unwrap();
        assert_eq!(mapped.len(), 17);
        assert_eq!(mapped.as_slice(), b"<html>hola</html>");
    }

    #[test]
    fn test_map_empty_file_fails() {
        let file = tempfile::tempfile().unwrap();
        assert!(MappedFile::map(&file, 0).is_err());
    }
}
