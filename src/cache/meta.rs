//! Disk image validity metadata
//!
//! A built disk carries a small JSON record in the `user.bootc.meta`
//! extended attribute naming the image digest it was installed from. The
//! record is the only thing that decides whether a cached disk is reused.

use crate::error::{BootdiskError, BootdiskResult};
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::fs::File;
use std::io;

/// Extended attribute holding the serialized [`DiskMeta`]
pub const IMAGE_META_XATTR: &CStr = c"user.bootc.meta";

/// Upper bound on the attribute size we are willing to read
const META_BUF_SIZE: usize = 4096;

/// Record stored on every published disk image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMeta {
    /// Digest of the container image this disk was installed from
    #[serde(rename = "imageDigest")]
    pub image_digest: String,
}

/// Serialize the validity record for `digest`
pub fn encode(digest: &str) -> BootdiskResult<Vec<u8>> {
    let meta = DiskMeta {
        image_digest: digest.to_string(),
    };
    Ok(serde_json::to_vec(&meta)?)
}

/// Parse a validity record, returning the image digest it names
pub fn decode(buf: &[u8]) -> BootdiskResult<String> {
    serde_json::from_slice::<DiskMeta>(buf)
        .map(|meta| meta.image_digest)
        .map_err(|e| BootdiskError::CorruptMetadata(e.to_string()))
}

/// Read the digest recorded on `file`.
///
/// `Ok(None)` means the attribute is absent. Unparsable or unreadable
/// attributes are reported as [`BootdiskError::CorruptMetadata`].
pub fn read_digest(file: &File) -> BootdiskResult<Option<String>> {
    match get_xattr(file) {
        Ok(Some(buf)) => decode(&buf).map(Some),
        Ok(None) => Ok(None),
        Err(e) => Err(BootdiskError::CorruptMetadata(format!(
            "reading {}: {}",
            IMAGE_META_XATTR.to_string_lossy(),
            e
        ))),
    }
}

/// Stamp `file` with the validity record for `digest`
pub fn write_digest(file: &File, digest: &str) -> BootdiskResult<()> {
    let buf = encode(digest)?;
    set_xattr(file, &buf).map_err(|e| {
        BootdiskError::io(
            format!("setting {} xattr", IMAGE_META_XATTR.to_string_lossy()),
            e,
        )
    })
}

#[cfg(target_os = "linux")]
fn get_xattr(file: &File) -> io::Result<Option<Vec<u8>>> {
    use std::os::unix::io::AsRawFd;

    let mut buf = vec![0u8; META_BUF_SIZE];
    let len = unsafe {
        libc::fgetxattr(
            file.as_raw_fd(),
            IMAGE_META_XATTR.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
        )
    };
    if len < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENODATA) {
            return Ok(None);
        }
        return Err(err);
    }
    buf.truncate(len as usize);
    Ok(Some(buf))
}

#[cfg(target_os = "linux")]
fn set_xattr(file: &File, value: &[u8]) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let ret = unsafe {
        libc::fsetxattr(
            file.as_raw_fd(),
            IMAGE_META_XATTR.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn get_xattr(_file: &File) -> io::Result<Option<Vec<u8>>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "extended attributes require Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
fn set_xattr(_file: &File, _value: &[u8]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "extended attributes require Linux",
    ))
}

/// Whether the filesystem holding `dir` accepts `user.` extended attributes
#[cfg(test)]
pub(crate) fn xattrs_supported(dir: &std::path::Path) -> bool {
    let probe = dir.join(".xattr-probe");
    let supported = File::create(&probe)
        .ok()
        .map(|f| set_xattr(&f, b"{}").is_ok())
        .unwrap_or(false);
    let _ = std::fs::remove_file(&probe);
    supported
}

/// Set a raw attribute value, bypassing the codec
#[cfg(test)]
pub(crate) fn write_raw(file: &File, value: &[u8]) -> io::Result<()> {
    set_xattr(file, value)
}
