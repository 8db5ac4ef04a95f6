//! Offline IP to country attribution
//!
//! Backed by a MaxMind country database. A missing or unreadable database is
//! not an error: attribution simply stays at `NA`.

use maxminddb::{geoip2, Reader};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, warn};

/// Maps an IP address to an ISO country code
pub trait CountryResolver: Send + Sync {
    fn country(&self, ip: IpAddr) -> Option<String>;
}

/// Read-only handle on a MaxMind country database
pub struct GeoLookup {
    reader: Reader<Vec<u8>>,
}

impl GeoLookup {
    /// Open the database at `path`; `None` when it is absent or unusable
    pub fn open(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "GeoIP database {} not found, countries will be reported as NA",
                path.display()
            );
            return None;
        }

        match Reader::open_readfile(path) {
            Ok(reader) => {
                debug!("Opened GeoIP database {}", path.display());
                Some(Self { reader })
            }
            Err(e) => {
                warn!("GeoIP database {} is unusable: {}", path.display(), e);
                None
            }
        }
    }
}

impl CountryResolver for GeoLookup {
    fn country(&self, ip: IpAddr) -> Option<String> {
        let record: geoip2::Country = self.reader.lookup(ip).ok()?;
        record.country?.iso_code.map(str::to_string)
    }
}

/// Fixed address to country table
#[derive(Debug, Clone, Default)]
pub struct StaticCountries {
    table: HashMap<IpAddr, String>,
}

impl StaticCountries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: IpAddr, country: &str) -> Self {
        self.table.insert(ip, country.to_string());
        self
    }
}

impl CountryResolver for StaticCountries {
    fn country(&self, ip: IpAddr) -> Option<String> {
        self.table.get(&ip).cloned()
    }
}
