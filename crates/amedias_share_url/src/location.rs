//! The application's current address.

use parking_lot::RwLock;
use url::Url;

/// Read and rewrite the address the application is running at.
///
/// `replace` swaps the address in place, the way a browser history replace
/// does: no navigation, no reload.
pub trait Location: Send + Sync {
    /// The current address.
    fn current(&self) -> Url;

    /// Replaces the current address.
    fn replace(&self, url: Url);
}

/// A [`Location`] held in memory.
///
/// Used by the CLI and in tests.
#[derive(Debug)]
pub struct MemoryLocation {
    current: RwLock<Url>,
    replacements: RwLock<usize>,
}

impl MemoryLocation {
    /// Creates a location at `url`.
    pub fn new(url: Url) -> Self {
        Self {
            current: RwLock::new(url),
            replacements: RwLock::new(0),
        }
    }

    /// Parses `url` and creates a location at it.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `url` is not an absolute URL.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// How many times the address has been replaced.
    pub fn replacements(&self) -> usize {
        *self.replacements.read()
    }
}

impl Location for MemoryLocation {
    fn current(&self) -> Url {
        self.current.read().clone()
    }

    fn replace(&self, url: Url) {
        *self.current.write() = url;
        *self.replacements.write() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_swaps_address() {
        let location = MemoryLocation::parse("https://amedias.app/").unwrap();
        assert_eq!(location.replacements(), 0);

        location.replace(Url::parse("https://amedias.app/?d=abc").unwrap());
        assert_eq!(location.current().as_str(), "https://amedias.app/?d=abc");
        assert_eq!(location.replacements(), 1);
    }

    #[test]
    fn parse_rejects_relative() {
        assert!(MemoryLocation::parse("/relative").is_err());
    }
}
