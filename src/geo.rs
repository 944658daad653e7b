//! IP geolocation over an ip2region (v2 `xdb`) database.
//!
//! [`IpLocator::lookup`] never fails. Every failure path (bad address, unknown
//! range, malformed region text, corrupt buffer, no database loaded) yields an
//! [`IpAddress`] whose fields are [`UNKNOWN`].
//!
//! # Buffer layout
//!
//! ```text
//! [0, 256)              header
//! [256, 256 + 524288)   vector index: 256 x 256 entries of (start_ptr u32, end_ptr u32)
//! ...                   segment index: 14-byte entries
//!                       (start_ip u32, end_ip u32, data_len u16, data_ptr u32)
//! ...                   region strings "country|region|province|city|isp"
//! ```
//!
//! All integers are little-endian.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::errors::{LicenseError, LicenseResult};

/// Value substituted for any field that cannot be resolved.
pub const UNKNOWN: &str = "unknown";

const HEADER_LEN: usize = 256;
const VECTOR_INDEX_COLS: usize = 256;
const VECTOR_INDEX_ENTRY_LEN: usize = 8;
const VECTOR_INDEX_LEN: usize = 256 * VECTOR_INDEX_COLS * VECTOR_INDEX_ENTRY_LEN;
const SEGMENT_INDEX_LEN: usize = 14;
const REGION_FIELDS: usize = 5;

/// Resolved location of an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpAddress {
    pub ip: String,
    pub country: String,
    pub province: String,
    pub city: String,
}

impl IpAddress {
    /// A result with every location field set to [`UNKNOWN`].
    pub fn unknown(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            country: UNKNOWN.to_string(),
            province: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
        }
    }
}

/// Internal lookup failures. Never leaves this module.
#[derive(Debug, Error)]
enum GeoError {
    #[error("invalid IPv4 address")]
    InvalidAddress,
    #[error("no region for address")]
    NotFound,
    #[error("read out of bounds at offset {0}")]
    OutOfBounds(usize),
    #[error("region text is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed region '{0}'")]
    MalformedRegion(String),
}

impl GeoError {
    /// Misses that happen with a healthy database, such as IPv6 peers.
    fn is_expected(&self) -> bool {
        matches!(self, GeoError::InvalidAddress | GeoError::NotFound)
    }
}

/// Searcher over an in-memory xdb buffer.
#[derive(Debug, Clone)]
pub struct Xdb {
    buf: Vec<u8>,
}

impl Xdb {
    /// Wrap a buffer, checking that the header and vector index are present.
    pub fn from_bytes(buf: Vec<u8>) -> LicenseResult<Self> {
        if buf.len() < HEADER_LEN + VECTOR_INDEX_LEN {
            return Err(LicenseError::ConfigError(format!(
                "xdb buffer too short: {} bytes",
                buf.len()
            )));
        }
        Ok(Self { buf })
    }

    /// Load an xdb file fully into memory.
    pub fn from_file(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let path = path.as_ref();
        let buf = std::fs::read(path).map_err(|e| {
            LicenseError::ConfigError(format!("failed to read xdb '{}': {e}", path.display()))
        })?;
        Self::from_bytes(buf)
    }

    fn read_u32(&self, offset: usize) -> Result<u32, GeoError> {
        let bytes = self
            .buf
            .get(offset..offset.checked_add(4).ok_or(GeoError::OutOfBounds(offset))?)
            .ok_or(GeoError::OutOfBounds(offset))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u16(&self, offset: usize) -> Result<u16, GeoError> {
        let bytes = self
            .buf
            .get(offset..offset.checked_add(2).ok_or(GeoError::OutOfBounds(offset))?)
            .ok_or(GeoError::OutOfBounds(offset))?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Find the raw region string for an IPv4 address.
    fn search(&self, ip: Ipv4Addr) -> Result<&str, GeoError> {
        let ip = u32::from(ip);
        let il0 = ((ip >> 24) & 0xFF) as usize;
        let il1 = ((ip >> 16) & 0xFF) as usize;
        let vector_offset = HEADER_LEN
            + il0 * VECTOR_INDEX_COLS * VECTOR_INDEX_ENTRY_LEN
            + il1 * VECTOR_INDEX_ENTRY_LEN;

        let start_ptr = self.read_u32(vector_offset)? as usize;
        let end_ptr = self.read_u32(vector_offset + 4)? as usize;
        if end_ptr < start_ptr {
            return Err(GeoError::NotFound);
        }

        let mut low: i64 = 0;
        let mut high: i64 = ((end_ptr - start_ptr) / SEGMENT_INDEX_LEN) as i64;
        let mut found = None;

        while low <= high {
            let mid = (low + high) >> 1;
            let p = (mid as usize)
                .checked_mul(SEGMENT_INDEX_LEN)
                .and_then(|o| o.checked_add(start_ptr))
                .ok_or(GeoError::OutOfBounds(start_ptr))?;
            let start_ip = self.read_u32(p)?;
            if ip < start_ip {
                high = mid - 1;
                continue;
            }
            let end_ip = self.read_u32(p.saturating_add(4))?;
            if ip > end_ip {
                low = mid + 1;
                continue;
            }
            let data_len = self.read_u16(p.saturating_add(8))? as usize;
            let data_ptr = self.read_u32(p.saturating_add(10))? as usize;
            found = Some((data_ptr, data_len));
            break;
        }

        let (data_ptr, data_len) = match found {
            Some((_, 0)) | None => return Err(GeoError::NotFound),
            Some(hit) => hit,
        };

        let bytes = self
            .buf
            .get(data_ptr..data_ptr.saturating_add(data_len))
            .ok_or(GeoError::OutOfBounds(data_ptr))?;
        std::str::from_utf8(bytes).map_err(|_| GeoError::InvalidUtf8)
    }
}

/// Total IP geolocation lookup.
#[derive(Debug, Clone, Default)]
pub struct IpLocator {
    db: Option<Xdb>,
}

impl IpLocator {
    pub fn new(db: Xdb) -> Self {
        Self { db: Some(db) }
    }

    /// A locator with no database; every lookup resolves to [`UNKNOWN`].
    pub fn disabled() -> Self {
        Self { db: None }
    }

    /// Build from an optional xdb path, as found in configuration.
    pub fn from_path(path: Option<&str>) -> LicenseResult<Self> {
        match path {
            Some(path) => {
                let db = Xdb::from_file(path)?;
                info!(path = %path, "Loaded IP geolocation database");
                Ok(Self::new(db))
            }
            None => Ok(Self::disabled()),
        }
    }

    /// Resolve `ip` to a location. Never fails.
    pub fn lookup(&self, ip: &str) -> IpAddress {
        let Some(db) = self.db.as_ref() else {
            return IpAddress::unknown(ip);
        };
        match Self::resolve(db, ip) {
            Ok(address) => address,
            Err(e) if e.is_expected() => {
                debug!(ip = %ip, reason = %e, "IP not resolved");
                IpAddress::unknown(ip)
            }
            Err(e) => {
                error!(ip = %ip, error = %e, "IP lookup failed");
                IpAddress::unknown(ip)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    fn resolve(db: &Xdb, ip: &str) -> Result<IpAddress, GeoError> {
        let addr: Ipv4Addr = ip.trim().parse().map_err(|_| GeoError::InvalidAddress)?;
        let region = db.search(addr)?;

        let fields: Vec<&str> = region.split('|').collect();
        if fields.len() != REGION_FIELDS {
            return Err(GeoError::MalformedRegion(region.to_string()));
        }

        Ok(IpAddress {
            ip: ip.to_string(),
            country: known_or_unknown(fields[0]),
            province: known_or_unknown(fields[2]),
            city: known_or_unknown(fields[3]),
        })
    }
}

fn known_or_unknown(field: &str) -> String {
    if field == "0" || field.is_empty() {
        UNKNOWN.to_string()
    } else {
        field.to_string()
    }
}
